//! Opaque handles to external resources carried through a context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased reference to an external resource such as a
/// database connection or driver session.
///
/// The runtime never opens or closes the resource; it only moves the handle
/// between steps. Two handles are equal when they point at the same resource.
#[derive(Clone)]
pub struct Handle {
    label: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Handle {
    /// Wraps a resource in a new handle.
    pub fn new<T: Any + Send + Sync>(label: impl Into<String>, resource: T) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(resource),
        }
    }

    /// Wraps an already shared resource.
    pub fn from_arc<T: Any + Send + Sync>(label: impl Into<String>, resource: Arc<T>) -> Self {
        Self {
            label: label.into(),
            inner: resource,
        }
    }

    /// Returns the descriptive label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the resource if it has type `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// Returns true if both handles share the same resource.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("label", &self.label).finish()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<handle:{}>", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeConnection {
        dsn: String,
    }

    #[test]
    fn test_downcast_to_original_type() {
        let handle = Handle::new("sqlite", FakeConnection { dsn: "file::memory:".to_string() });

        let conn = handle.downcast::<FakeConnection>().unwrap();
        assert_eq!(conn.dsn, "file::memory:");
        assert!(handle.downcast::<String>().is_none());
    }

    #[test]
    fn test_equality_is_identity() {
        let shared = Arc::new(FakeConnection { dsn: "a".to_string() });
        let a = Handle::from_arc("conn", shared.clone());
        let b = Handle::from_arc("conn", shared);
        let c = Handle::new("conn", FakeConnection { dsn: "a".to_string() });

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let handle = Handle::new("neo4j_driver", 1_u8);
        assert_eq!(handle.to_string(), "<handle:neo4j_driver>");
    }
}
