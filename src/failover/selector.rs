//! Candidate ordering among hosts of equal standing.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::topology::HostSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderSelection {
    #[default]
    RoundRobin,
    Random,
}

/// Orders hosts for one failover pass.
/// Round-robin keeps an internal counter so successive passes start at
/// successive hosts.
#[derive(Debug)]
pub struct HostSelector {
    strategy: ReaderSelection,
    counter: AtomicUsize,
}

impl HostSelector {
    pub fn new(strategy: ReaderSelection) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> ReaderSelection {
        self.strategy
    }

    pub fn order(&self, mut hosts: Vec<HostSpec>) -> Vec<HostSpec> {
        if hosts.len() < 2 {
            return hosts;
        }
        match self.strategy {
            ReaderSelection::RoundRobin => {
                let start = self.counter.fetch_add(1, Ordering::Relaxed) % hosts.len();
                hosts.rotate_left(start);
            }
            ReaderSelection::Random => hosts.shuffle(&mut rand::thread_rng()),
        }
        hosts
    }
}
