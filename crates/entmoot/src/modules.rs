//! Process-wide table of loaded modules.

use dashmap::DashMap;

use crate::object::Object;

/// Loaded modules keyed by dotted name.
///
/// Shared by every evaluator of a process and read by the collector as a
/// root set.
#[derive(Default)]
pub struct ModuleTable {
    modules: DashMap<String, Object>,
}

impl ModuleTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a loaded module.
    pub fn get(&self, name: &str) -> Option<Object> {
        self.modules.get(name).map(|entry| entry.value().clone())
    }

    /// Register a module, replacing any previous entry.
    pub fn insert(&self, name: impl Into<String>, module: Object) {
        let previous = self.modules.insert(name.into(), module);
        drop(previous);
    }

    /// Remove a module.
    pub fn remove(&self, name: &str) -> Option<Object> {
        self.modules.remove(name).map(|(_, module)| module)
    }

    /// Whether a module is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Loaded module names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Visit every module without taking extra references.
    pub(crate) fn for_each(&self, mut visit: impl FnMut(&Object)) {
        for entry in self.modules.iter() {
            visit(entry.value());
        }
    }

    /// Remove every module, returning them.
    pub fn clear(&self) -> Vec<Object> {
        let names: Vec<String> = self.modules.iter().map(|entry| entry.key().clone()).collect();
        names.iter().filter_map(|name| self.remove(name)).collect()
    }
}
