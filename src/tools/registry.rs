//! The tool registry.
//!
//! Tools are keyed by name and listed in registration order. The first
//! registration of a name wins; later ones are dropped silently so bootstrap
//! code can run more than once.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tracing::debug;

use super::Tool;

/// In-memory, insertion-ordered collection of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    /// Group name to the tool names that group registered.
    groups: IndexMap<String, Vec<String>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("groups", &self.groups)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool unless one with the same name already exists.
    ///
    /// Returns `true` if the tool was inserted.
    pub fn add_tool(&mut self, tool: impl Tool + 'static) -> bool {
        self.add_shared(Arc::new(tool))
    }

    /// Registers an already shared tool; see [`add_tool`](Self::add_tool).
    pub fn add_shared(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            debug!(tool = %name, "tool already registered, keeping first registration");
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    /// Registers a batch of tools under a group name.
    ///
    /// Each member obeys the first-registration-wins rule; only the tools
    /// this call actually inserted are recorded in the group. Returns the
    /// number inserted.
    pub fn add_group<I>(&mut self, group: impl Into<String>, tools: I) -> usize
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut inserted = Vec::new();
        for tool in tools {
            let name = tool.name().to_string();
            if self.add_shared(tool) {
                inserted.push(name);
            }
        }
        let count = inserted.len();
        self.groups.entry(group.into()).or_default().extend(inserted);
        count
    }

    /// Returns the tool names registered through a group.
    #[must_use]
    pub fn group(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Removes a group and the tools it registered. Returns how many tools
    /// were removed.
    pub fn remove_group(&mut self, group: &str) -> usize {
        let Some(names) = self.groups.shift_remove(group) else {
            return 0;
        };
        names
            .iter()
            .filter(|name| self.tools.shift_remove(name.as_str()).is_some())
            .count()
    }

    /// Removes a tool by name. Returns whether a tool was removed.
    pub fn remove_tool(&mut self, name: &str) -> bool {
        let removed = self.tools.shift_remove(name).is_some();
        if removed {
            for members in self.groups.values_mut() {
                members.retain(|member| member != name);
            }
        }
        removed
    }

    /// Removes every tool and group.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.groups.clear();
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns whether a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Iterates tools in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A registry shared between the dispatcher and runtime code that mutates it.
///
/// Locks are held only for the duration of a registry call, never across a
/// tool invocation.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<RwLock<ToolRegistry>>);

impl SharedRegistry {
    /// Wraps a registry for sharing.
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self(Arc::new(RwLock::new(registry)))
    }

    /// Read access to the registry.
    pub fn read(&self) -> RwLockReadGuard<'_, ToolRegistry> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access to the registry.
    pub fn write(&self) -> RwLockWriteGuard<'_, ToolRegistry> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<ToolRegistry> for SharedRegistry {
    fn from(registry: ToolRegistry) -> Self {
        Self::new(registry)
    }
}
