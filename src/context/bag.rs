//! Hierarchical extension bag shared along a processing path.
//!
//! Lookups fall back to the parent bag. Visibility is one-way: a child sees
//! values its parent holds, including ones written after the child was created,
//! but the parent never sees the child's writes. Writes land in the bag they are
//! made on, except [`ContextBag::set_on_root`], so a child can shadow but never
//! overwrite what its parent holds.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct BagInner {
    typed: RwLock<HashMap<TypeId, Entry>>,
    keyed: RwLock<HashMap<String, Entry>>,
    parent: Option<ContextBag>,
}

#[derive(Clone, Default)]
pub struct ContextBag {
    inner: Arc<BagInner>,
}

impl ContextBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new bag whose lookups fall back to this one
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(BagInner {
                parent: Some(self.clone()),
                ..BagInner::default()
            }),
        }
    }

    pub fn set<T: Any + Send + Sync>(&self, value: T) {
        self.set_arc(Arc::new(value));
    }

    pub fn set_arc<T: Any + Send + Sync>(&self, value: Arc<T>) {
        self.inner.typed.write().insert(TypeId::of::<T>(), value);
    }

    /// Nearest value of type `T`, searching this bag then its ancestors
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let local = self.inner.typed.read().get(&TypeId::of::<T>()).cloned();
        match local {
            Some(entry) => entry.downcast::<T>().ok(),
            None => self.inner.parent.as_ref()?.get::<T>(),
        }
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn set_keyed<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner
            .keyed
            .write()
            .insert(key.into(), Arc::new(value));
    }

    /// Nearest value stored under `key` that has type `T`
    pub fn get_keyed<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let local = self.inner.keyed.read().get(key).cloned();
        match local {
            Some(entry) => entry.downcast::<T>().ok(),
            None => self.inner.parent.as_ref()?.get_keyed::<T>(key),
        }
    }

    /// Store `value` in the outermost ancestor so every bag on the path sees it
    pub fn set_on_root<T: Any + Send + Sync>(&self, value: T) {
        match &self.inner.parent {
            Some(parent) => parent.set_on_root(value),
            None => self.set(value),
        }
    }

    pub fn depth(&self) -> usize {
        self.inner.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }
}

impl fmt::Debug for ContextBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBag")
            .field("typed_entries", &self.inner.typed.read().len())
            .field("keyed_entries", &self.inner.keyed.read().len())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[test]
    fn test_child_reads_parent_values() {
        let root = ContextBag::new();
        root.set(Tenant("acme"));
        let child = root.child();

        assert_eq!(*child.get::<Tenant>().unwrap(), Tenant("acme"));
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn test_child_shadows_without_touching_parent() {
        let root = ContextBag::new();
        root.set(Tenant("acme"));
        let child = root.child();
        child.set(Tenant("globex"));

        assert_eq!(*child.get::<Tenant>().unwrap(), Tenant("globex"));
        assert_eq!(*root.get::<Tenant>().unwrap(), Tenant("acme"));
    }

    #[test]
    fn test_parent_writes_after_branching_are_visible_to_child() {
        let root = ContextBag::new();
        let child = root.child();
        root.set(Tenant("acme"));
        child.set_keyed("stage", 1_u8);

        assert_eq!(*child.get::<Tenant>().unwrap(), Tenant("acme"));
        assert!(root.get_keyed::<u8>("stage").is_none());
    }

    #[test]
    fn test_set_on_root_is_visible_everywhere() {
        let root = ContextBag::new();
        let grandchild = root.child().child();
        grandchild.set_on_root(Tenant("initech"));

        assert!(root.contains::<Tenant>());
        assert!(root.child().contains::<Tenant>());
    }

    #[test]
    fn test_keyed_lookup_checks_type() {
        let root = ContextBag::new();
        root.set_keyed("retries", 3_u32);
        let child = root.child();

        assert_eq!(*child.get_keyed::<u32>("retries").unwrap(), 3);
        assert!(child.get_keyed::<String>("retries").is_none());
        assert!(child.get_keyed::<u32>("missing").is_none());
    }
}
