use crate::shared::config::{ConfigError, EngineConfig, EngineConfigBuilder};

/// Per-login session passed to the engine.
///
/// Owned by the application controller; the reconciler and the merger only
/// ever see it by reference.
#[derive(Debug, Clone)]
pub struct Session {
    config: EngineConfig,
    token: Option<String>,
    account_email: String,
}

impl Session {
    pub fn new(config: EngineConfig, account_email: String) -> Self {
        Self {
            config,
            token: None,
            account_email,
        }
    }

    pub fn with_builder(builder: EngineConfigBuilder, account_email: String) -> Result<Self, ConfigError> {
        Ok(Self::new(builder.build()?, account_email))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Email of the signed-in account
    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url, path)
    }
}
