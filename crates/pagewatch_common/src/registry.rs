//! Module registry: module id to display name.
//!
//! Purely additive. Re-registering an id replaces its display name but keeps
//! its original listing position.

use crate::error::{OverlayError, Result};
use std::collections::HashMap;

/// One registered module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistration {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    entries: Vec<ModuleRegistration>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a module. A missing display name defaults to the id.
    pub fn register(&mut self, id: &str, display_name: Option<&str>) -> Result<()> {
        if id.trim().is_empty() {
            return Err(OverlayError::EmptyModuleId);
        }

        let display_name = display_name
            .filter(|name| !name.is_empty())
            .unwrap_or(id)
            .to_string();

        match self.index.get(id) {
            Some(&pos) => self.entries[pos].display_name = display_name,
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push(ModuleRegistration {
                    id: id.to_string(),
                    display_name,
                });
            }
        }
        Ok(())
    }

    /// Display name for `id`, or `id` itself when unregistered
    pub fn lookup<'a>(&'a self, id: &'a str) -> &'a str {
        self.index
            .get(id)
            .map(|&pos| self.entries[pos].display_name.as_str())
            .unwrap_or(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Registrations in first-registration order
    pub fn entries(&self) -> &[ModuleRegistration] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
