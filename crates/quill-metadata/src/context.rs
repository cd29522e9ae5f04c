//! Request-scoped call context
//!
//! A [`CallContext`] is an immutable chain of typed values. Deriving a new
//! context links a value in front of its parent; the parent is never touched,
//! so contexts can be shared freely between the HTTP and RPC halves of a
//! request and across tasks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Immutable, hierarchically derived carrier of request-scoped values.
///
/// Each value type acts as its own key. Lookups walk from the most recent
/// derivation back to the root and return the nearest value of that type.
#[derive(Clone, Default)]
pub struct CallContext {
    head: Option<Arc<Entry>>,
}

struct Entry {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl CallContext {
    /// Create an empty root context
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context carrying `value`
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Entry {
                type_name: std::any::type_name::<T>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up the nearest value of type `T`
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if let Some(value) = entry.value.downcast_ref::<T>() {
                return Some(value);
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    /// Whether a value of type `T` is reachable from this context
    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.value::<T>().is_some()
    }

    /// Returns true if both handles refer to the same derivation.
    ///
    /// Contexts are compared by identity, not content: two separately derived
    /// contexts carrying equal values are not the same context.
    pub fn same_as(&self, other: &CallContext) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of derivations between this context and the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            depth += 1;
            cursor = entry.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            list.entry(&entry.type_name);
            cursor = entry.parent.as_deref();
        }
        list.finish()
    }
}
