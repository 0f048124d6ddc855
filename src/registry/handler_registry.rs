//! # Handler Registry
//!
//! Closed routing table mapping an action-type string to a
//! handler-constructing function. Unknown keys are rejected at registration
//! and validated against the configured action set at startup, so routing
//! misses at runtime only happen for envelopes from foreign publishers —
//! and those dead-letter without ever constructing a handler.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::messaging::JobMeta;
use crate::processing::response::ProcessingError;
use crate::registry::handler::JobHandler;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Action type cannot be empty")]
    EmptyAction,

    #[error("Action type already registered: {action}")]
    DuplicateAction { action: String },

    #[error("No handler registered for action type: {action}")]
    UnknownAction { action: String },
}

/// Constructs a handler for one parsed envelope. Construction failures
/// (e.g. a business payload that does not deserialize) dead-letter the
/// message.
pub type HandlerFactory = Arc<
    dyn Fn(&JobMeta, serde_json::Value) -> Result<Box<dyn JobHandler>, ProcessingError>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an action type. Empty and duplicate keys are
    /// rejected here rather than surfacing at runtime.
    pub fn register(
        &mut self,
        action: impl Into<String>,
        factory: HandlerFactory,
    ) -> Result<(), RegistryError> {
        let action = action.into();
        if action.is_empty() {
            return Err(RegistryError::EmptyAction);
        }
        if self.handlers.contains_key(&action) {
            return Err(RegistryError::DuplicateAction { action });
        }
        self.handlers.insert(action, factory);
        Ok(())
    }

    pub fn resolve(&self, action: &str) -> Result<&HandlerFactory, RegistryError> {
        self.handlers
            .get(action)
            .ok_or_else(|| RegistryError::UnknownAction {
                action: action.to_string(),
            })
    }

    /// Startup guarantee: every configured action type resolves.
    pub fn validate_actions<'a, I>(&self, actions: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for action in actions {
            self.resolve(action)?;
        }
        Ok(())
    }

    pub fn actions(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}
