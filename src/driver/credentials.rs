//! Credential sources.
//!
//! Federated identity exchanges live outside this crate; they plug in by
//! implementing [`CredentialsProvider`].

use async_trait::async_trait;
use std::fmt;

use crate::config::schema::CredentialsConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::topology::HostSpec;

/// Username plus secret handed to the driver.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, password: String },
    Token { username: String, token: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::Password { username, .. } | Credentials::Token { username, .. } => username,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Credentials::Password { .. } => "Password",
            Credentials::Token { .. } => "Token",
        };
        f.debug_struct(kind)
            .field("username", &self.username())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials whenever a connection is (re)established.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials(&self, host: &HostSpec) -> ProxyResult<Credentials>;
}

/// Fixed credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }

    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(Credentials::Password {
            username: username.into(),
            password: password.into(),
        })
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(&self, _host: &HostSpec) -> ProxyResult<Credentials> {
        Ok(self.0.clone())
    }
}

/// Reads the password from an environment variable at every call, so
/// rotated secrets are picked up on failover.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    username: String,
    variable: String,
}

impl EnvCredentials {
    pub fn new(username: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn credentials(&self, _host: &HostSpec) -> ProxyResult<Credentials> {
        let password = std::env::var(&self.variable).map_err(|_| {
            ProxyError::Configuration(format!("environment variable {} is not set", self.variable))
        })?;
        Ok(Credentials::Password {
            username: self.username.clone(),
            password,
        })
    }
}

/// Build the provider described by configuration.
pub fn provider_from_config(config: &CredentialsConfig) -> Box<dyn CredentialsProvider> {
    match (&config.password_env, &config.password) {
        (Some(var), _) => Box::new(EnvCredentials::new(config.username.clone(), var.clone())),
        (None, password) => Box::new(StaticCredentials::password(
            config.username.clone(),
            password.clone().unwrap_or_default(),
        )),
    }
}
