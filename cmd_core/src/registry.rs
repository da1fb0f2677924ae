//! # Named-command registry
//!
//! A process-wide mapping from string identifiers to commands. Text-driven
//! sources (path files, dashboards) refer to commands by name; the registry
//! resolves those names at run time, which also keeps event markers from
//! holding owning references into command trees.
//!
//! Registration applies the [`adapter`](crate::adapter) layer, so closures
//! and foreign objects can be registered directly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use crate::adapter::{adapt, Adaptable};
use crate::command::CommandHandle;
use crate::leaf::InstantCommand;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

thread_local! {
    static REGISTRY: CommandRegistry = CommandRegistry::new();
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A name to command mapping with per-name descriptions.
///
/// An explicit value; the control thread's shared instance is reached
/// through [`with`]. Entries persist until removed or cleared.
pub struct CommandRegistry {
    commands: RefCell<HashMap<String, CommandHandle>>,
    descriptions: RefCell<HashMap<String, String>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Command name cannot be empty")]
    EmptyName,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run a closure against the control thread's registry instance.
pub fn with<R>(f: impl FnOnce(&CommandRegistry) -> R) -> R {
    REGISTRY.with(|r| f(r))
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RefCell::new(HashMap::new()),
            descriptions: RefCell::new(HashMap::new()),
        }
    }

    /// Register a command under a name, replacing any prior binding.
    ///
    /// The name is trimmed; an empty name is rejected. The description
    /// defaults to the command's own name.
    pub fn register(
        &self,
        name: &str,
        source: impl Into<Adaptable>,
    ) -> Result<(), RegistryError> {
        let name = trimmed_name(name)?;
        let handle = adapt(source.into());
        let description = handle.name();

        self.commands.borrow_mut().insert(name.clone(), handle);
        self.descriptions.borrow_mut().insert(name, description);
        Ok(())
    }

    /// Register a command under a name with a human-readable description.
    pub fn register_with_description(
        &self,
        name: &str,
        source: impl Into<Adaptable>,
        description: &str,
    ) -> Result<(), RegistryError> {
        self.register(name, source)?;
        self.descriptions
            .borrow_mut()
            .insert(name.trim().to_string(), description.to_string());
        Ok(())
    }

    /// Retrieve a registered command by name.
    ///
    /// An unknown name returns a safe no-op command that logs a warning
    /// when run, so a misspelt event marker never fails the caller.
    pub fn get(&self, name: &str) -> CommandHandle {
        let name = name.trim().to_string();

        if let Some(handle) = self.commands.borrow().get(&name) {
            return handle.clone();
        }

        warn!("No command registered with name '{}'", name);
        CommandHandle::new(InstantCommand::new(move || {
            warn!("Attempted to execute unregistered command '{}'", name)
        }))
    }

    /// True if a command is registered under the name.
    pub fn has(&self, name: &str) -> bool {
        self.commands.borrow().contains_key(name.trim())
    }

    /// Remove a binding, returning true if one existed.
    pub fn remove(&self, name: &str) -> bool {
        let name = name.trim();
        self.descriptions.borrow_mut().remove(name);
        self.commands.borrow_mut().remove(name).is_some()
    }

    /// Remove every binding.
    pub fn clear(&self) {
        self.commands.borrow_mut().clear();
        self.descriptions.borrow_mut().clear();
    }

    /// All registered names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.commands.borrow().keys().cloned().collect()
    }

    /// The description of a registered command, or an empty string.
    pub fn description(&self, name: &str) -> String {
        self.descriptions
            .borrow()
            .get(name.trim())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of registered commands.
    pub fn count(&self) -> usize {
        self.commands.borrow().len()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn trimmed_name(name: &str) -> Result<String, RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(RegistryError::EmptyName)
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_register_and_get() {
        let registry = CommandRegistry::new();
        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();

        registry
            .register("IntakeOn", Adaptable::closure(move || c.set(c.get() + 1)))
            .unwrap();

        assert!(registry.has("IntakeOn"));
        assert_eq!(registry.count(), 1);

        let handle = registry.get("IntakeOn");
        handle.raw_initialize();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_names_are_trimmed() {
        let registry = CommandRegistry::new();
        registry
            .register("  Shoot  ", Adaptable::closure(|| ()))
            .unwrap();

        assert!(registry.has("Shoot"));
        assert!(registry.has(" Shoot "));
        assert_eq!(registry.names(), vec![String::from("Shoot")]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = CommandRegistry::new();
        assert!(matches!(
            registry.register("   ", Adaptable::closure(|| ())),
            Err(RegistryError::EmptyName)
        ));
    }

    #[test]
    fn test_reregistration_keeps_latest_binding() {
        let registry = CommandRegistry::new();
        let hits = Rc::new(Cell::new(0u32));

        let h = hits.clone();
        registry
            .register("Event", Adaptable::closure(move || h.set(h.get() + 1)))
            .unwrap();
        let h = hits.clone();
        registry
            .register("Event", Adaptable::closure(move || h.set(h.get() + 100)))
            .unwrap();

        assert_eq!(registry.count(), 1);
        registry.get("Event").raw_initialize();
        assert_eq!(hits.get(), 100);
    }

    #[test]
    fn test_remove_then_has_is_false() {
        let registry = CommandRegistry::new();
        registry.register("Gone", Adaptable::closure(|| ())).unwrap();

        assert!(registry.remove("Gone"));
        assert!(!registry.has("Gone"));
        assert!(!registry.remove("Gone"));
        assert_eq!(registry.description("Gone"), "");
    }

    #[test]
    fn test_unknown_name_returns_noop() {
        let registry = CommandRegistry::new();
        let handle = registry.get("NoSuchCommand");

        // Safe to run; finishes immediately
        handle.raw_initialize();
        assert!(handle.raw_is_finished());
    }

    #[test]
    fn test_descriptions() {
        let registry = CommandRegistry::new();
        registry
            .register_with_description(
                "Score",
                Adaptable::closure(|| ()),
                "Scores the held sample",
            )
            .unwrap();

        assert_eq!(registry.description("Score"), "Scores the held sample");

        registry.register("Plain", Adaptable::closure(|| ())).unwrap();
        assert_eq!(registry.description("Plain"), "instant");
    }

    #[test]
    fn test_clear() {
        let registry = CommandRegistry::new();
        registry.register("A", Adaptable::closure(|| ())).unwrap();
        registry.register("B", Adaptable::closure(|| ())).unwrap();

        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(registry.names().is_empty());
    }
}
