// Task Registry - name -> Task Unit lookup
// A child process only receives a task name, so units must be resolvable by name

use crate::domain::error::DomainError;
use crate::error::Result;
use crate::port::TaskUnit;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered Task Units
#[derive(Clone, Default)]
pub struct TaskRegistry {
    units: BTreeMap<String, Arc<dyn TaskUnit>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in units
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for unit in super::builtin::all() {
            registry.units.insert(unit.name().to_string(), unit);
        }
        registry
    }

    /// Register a unit under its own name
    ///
    /// # Errors
    /// - AppError::Domain(ValidationError) if the name is empty or already taken
    pub fn register(&mut self, unit: Arc<dyn TaskUnit>) -> Result<()> {
        let name = unit.name().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::ValidationError("Task name must not be empty".to_string()).into());
        }
        if self.units.contains_key(&name) {
            return Err(
                DomainError::ValidationError(format!("Task already registered: {}", name)).into(),
            );
        }
        self.units.insert(name, unit);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskUnit>> {
        self.units.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.units.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
