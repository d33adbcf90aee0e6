// src/providers/identity.rs
// Resolve user emails to user ids

use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<Option<String>, IdentityError>;
}

/// Fixed email -> id table. Emails compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    users: HashMap<String, String>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, email: &str, user_id: &str) -> Self {
        self.users.insert(email.trim().to_lowercase(), user_id.to_string());
        self
    }

    /// Parse `email=id` pairs separated by commas. Malformed pairs are skipped.
    pub fn from_pairs(raw: &str) -> Self {
        raw.split(',')
            .filter_map(|pair| pair.split_once('='))
            .filter(|(email, id)| !email.trim().is_empty() && !id.trim().is_empty())
            .fold(Self::new(), |acc, (email, id)| acc.with_user(email, id.trim()))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn lookup(&self, email: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.users.get(&email.trim().to_lowercase()).cloned())
    }
}
