//! Where the Notion integration token comes from.
//!
//! The token is only ever held in memory; nothing here writes it anywhere.

use std::process::Command;

use crate::error::NotionError;

pub const TOKEN_ENV: &str = "NOTION_TOKEN";
pub const KEYCHAIN_SERVICE: &str = "notion-api";

/// Source of an API token.
pub trait TokenProvider {
    fn token(&self) -> Result<String, NotionError>;
}

/// Token from an environment variable (`NOTION_TOKEN` by default).
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV)
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Result<String, NotionError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(NotionError::TokenUnavailable(format!("{} is not set", self.var))),
        }
    }
}

/// Token stored as a generic password in the macOS keychain.
#[derive(Debug, Clone)]
pub struct KeychainToken {
    service: String,
}

impl KeychainToken {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Default for KeychainToken {
    fn default() -> Self {
        Self::new(KEYCHAIN_SERVICE)
    }
}

impl TokenProvider for KeychainToken {
    fn token(&self) -> Result<String, NotionError> {
        let output = Command::new("security")
            .args(["find-generic-password", "-s", &self.service, "-w"])
            .output()
            .map_err(|e| {
                NotionError::TokenUnavailable(format!("keychain not available: {e}"))
            })?;
        if !output.status.success() {
            return Err(NotionError::TokenUnavailable(format!(
                "no keychain entry for service '{}'",
                self.service
            )));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(NotionError::TokenUnavailable(format!(
                "keychain entry for '{}' is empty",
                self.service
            )));
        }
        Ok(token)
    }
}

/// A fixed token, e.g. passed on the command line.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<String, NotionError> {
        Ok(self.0.clone())
    }
}

/// Tries each provider in order; the first token found wins.
pub struct TokenChain {
    providers: Vec<Box<dyn TokenProvider>>,
}

impl TokenChain {
    pub fn new(providers: Vec<Box<dyn TokenProvider>>) -> Self {
        Self { providers }
    }
}

impl Default for TokenChain {
    /// Environment first, then the keychain.
    fn default() -> Self {
        Self::new(vec![
            Box::new(EnvToken::default()),
            Box::new(KeychainToken::default()),
        ])
    }
}

impl TokenProvider for TokenChain {
    fn token(&self) -> Result<String, NotionError> {
        let mut reasons = Vec::new();
        for provider in &self.providers {
            match provider.token() {
                Ok(token) => return Ok(token),
                Err(err) => {
                    tracing::debug!(reason = %err, "token provider had nothing");
                    reasons.push(err.to_string());
                }
            }
        }
        Err(NotionError::TokenUnavailable(format!(
            "no Notion token found ({}); set {TOKEN_ENV} or add a keychain entry for '{KEYCHAIN_SERVICE}'",
            reasons.join("; ")
        )))
    }
}
