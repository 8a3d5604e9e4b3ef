use std::io::Read;

use crate::core::errors::Result;
use crate::core::models::object_ref::ObjectRef;

/// A readable object body, consumed once.
pub type ObjectBody = Box<dyn Read + Send>;

/// Port for opening objects as byte streams.
pub trait ObjectSource: Send + Sync {
    /// Fails with `ObjectNotFound` or `AccessDenied`.
    fn open(&self, object: &ObjectRef) -> Result<ObjectBody>;
}

/// Port for storing objects from a byte stream.
///
/// Implementations pull from `body` until end-of-stream and only make the
/// object visible once the whole body was read without error. A body that
/// fails mid-way must leave no object behind.
pub trait ObjectSink: Send + Sync {
    /// Returns the number of bytes stored.
    fn put(&self, object: &ObjectRef, body: &mut dyn Read) -> Result<u64>;
}

/// Port for enumerating object keys under a prefix.
pub trait ObjectLister: Send + Sync {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// A full object-storage capability.
pub trait ObjectStore: ObjectSource + ObjectSink + ObjectLister {}

impl<T: ObjectSource + ObjectSink + ObjectLister> ObjectStore for T {}
