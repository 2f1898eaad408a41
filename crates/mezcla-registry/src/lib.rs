//! Extension registry for the mezcla mixing engine.
//!
//! This crate provides the directory the engine uses for dynamic capability
//! discovery: a name-ordered map from procedure names to procedure addresses,
//! plus a list of registered capability-group names used purely for
//! membership queries.
//!
//! # Features
//!
//! - **Procedure lookup**: Resolve a procedure by its exact (case-sensitive) name
//! - **Typed access**: Downcast an address back to a concrete `fn` type
//! - **Capability groups**: Ask whether a named group of extensions is present
//! - **First registration wins**: Duplicates are ignored, never overwritten
//!
//! # Example
//!
//! ```rust
//! use mezcla_registry::ExtensionRegistry;
//!
//! fn scale(x: i32) -> i32 {
//!     x * 2
//! }
//!
//! let registry = ExtensionRegistry::new();
//! assert!(registry.register("mzScale", scale as fn(i32) -> i32));
//! registry.register_group("MEZCLA_scale");
//!
//! let f = registry.lookup_as::<fn(i32) -> i32>("mzScale").unwrap();
//! assert_eq!(f(21), 42);
//! assert!(registry.is_group_present("MEZCLA_scale"));
//! ```
//!
//! # Concurrency
//!
//! One registry-wide lock guards both the procedure tree and the group list.
//! The lock is part of the value itself (built by a `const fn`), so
//! registration is valid before any engine initialization has happened.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Maximum stored length (in bytes) of a capability-group name.
///
/// Longer names are truncated at the last character boundary that fits.
pub const MAX_GROUP_NAME_LEN: usize = 240;

/// Type-erased procedure address.
///
/// Addresses are usually plain `fn` pointers. Two lookups of the same name
/// return clones of the same `Arc`, so `Arc::ptr_eq` identifies them.
pub type ProcAddress = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    procs: BTreeMap<String, ProcAddress>,
    groups: Vec<String>,
}

/// Registry of extension procedures and capability groups.
pub struct ExtensionRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ExtensionRegistry")
            .field("procs", &inner.procs.keys().collect::<Vec<_>>())
            .field("groups", &inner.groups)
            .finish()
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                procs: BTreeMap::new(),
                groups: Vec::new(),
            }),
        }
    }

    /// Registers a procedure under `name`.
    ///
    /// Returns `false` if the name is empty or already registered. A
    /// duplicate leaves the first registration in place.
    pub fn register<T: Any + Send + Sync>(&self, name: &str, addr: T) -> bool {
        self.register_address(name, Arc::new(addr))
    }

    /// Registers an already type-erased address under `name`.
    pub fn register_address(&self, name: &str, addr: ProcAddress) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut inner = self.inner.write();
        if inner.procs.contains_key(name) {
            return false;
        }
        inner.procs.insert(name.to_owned(), addr);
        true
    }

    /// Looks up the address registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<ProcAddress> {
        self.inner.read().procs.get(name).cloned()
    }

    /// Looks up `name` and downcasts the address to `T`.
    ///
    /// Returns `None` if the name is unknown or was registered with a
    /// different type.
    pub fn lookup_as<T: Any + Copy>(&self, name: &str) -> Option<T> {
        let inner = self.inner.read();
        inner
            .procs
            .get(name)
            .and_then(|addr| addr.downcast_ref::<T>())
            .copied()
    }

    /// Returns true if a procedure named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().procs.contains_key(name)
    }

    /// Registers a capability-group name.
    ///
    /// Duplicates are allowed. Names longer than [`MAX_GROUP_NAME_LEN`] are
    /// truncated. Returns `false` for an empty name.
    pub fn register_group(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let stored = truncate_name(name);
        self.inner.write().groups.push(stored.to_owned());
        true
    }

    /// Returns true if a capability group named `name` was registered.
    pub fn is_group_present(&self, name: &str) -> bool {
        let wanted = truncate_name(name);
        self.inner.read().groups.iter().any(|g| g == wanted)
    }

    /// Returns all procedure names in registry order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().procs.keys().cloned().collect()
    }

    /// Returns all registered group names in registration order.
    pub fn groups(&self) -> Vec<String> {
        self.inner.read().groups.clone()
    }

    /// Returns the number of registered procedures.
    pub fn len(&self) -> usize {
        self.inner.read().procs.len()
    }

    /// Returns true if no procedures are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().procs.is_empty()
    }

    /// Removes every procedure and group.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.procs.clear();
        inner.groups.clear();
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_GROUP_NAME_LEN {
        return name;
    }
    let mut end = MAX_GROUP_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
