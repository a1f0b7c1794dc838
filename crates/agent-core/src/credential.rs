//! Credential Loading
//!
//! The provider key is read once at startup and held for the life of the
//! process. It is never logged.

use crate::error::{AgentError, Result};

/// Environment variable holding the model-provider key
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Opaque, non-empty secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Read `name` from the process environment
pub fn load_credential(name: &str) -> Result<Credential> {
    load_credential_with(name, |key| std::env::var(key).ok())
}

/// Read `name` through an explicit lookup; absent or blank values fail
pub fn load_credential_with<F>(name: &str, lookup: F) -> Result<Credential>
where
    F: FnOnce(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(Credential(value.trim().to_string())),
        _ => Err(AgentError::MissingCredential(name.to_string())),
    }
}
