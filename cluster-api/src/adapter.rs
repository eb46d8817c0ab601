use crate::{
    v0::{ImageStat, PoolSummary},
    StorageError,
};

/// Entry point into a storage cluster.
///
/// Shared by all requests, so it must not hold per request state; every
/// call to `connect_admin` hands out an independent connection.
pub trait Cluster: Send + Sync {
    /// Open an administrative connection to the cluster.
    fn connect_admin(&self) -> Result<Box<dyn AdminConnection>, StorageError>;
}

/// Authenticated session with the cluster.
/// Must be released with `shutdown`, see `guard::Connected`.
pub trait AdminConnection {
    /// All pools of the cluster, in the order the cluster reports them.
    fn list_pools(&self) -> Result<Vec<PoolSummary>, StorageError>;
    /// Open a context scoping operations to `pool`.
    fn open_context(
        &self,
        pool: &str,
    ) -> Result<Box<dyn IoContext>, StorageError>;
    /// Release the connection.
    fn shutdown(&mut self);
}

/// Handle scoping operations to a single pool.
/// Must be released with `destroy`, see `guard::PoolContext`.
pub trait IoContext {
    /// Name of the pool this context is bound to.
    fn pool(&self) -> &str;
    /// Names of all images in the pool.
    fn image_names(&self) -> Result<Vec<String>, StorageError>;
    /// Handle for the image `name`, neither opened nor checked for existence.
    fn image(&self, name: &str) -> Box<dyn Image>;
    /// Create a new image of `size` bytes made of `2^order` byte objects.
    fn create_image(
        &self,
        name: &str,
        size: u64,
        order: u8,
    ) -> Result<Box<dyn Image>, StorageError>;
    /// Release the context.
    fn destroy(&mut self);
}

/// Handle of a single image.
/// An opened image must be released with `close`, see `guard::OpenedImage`.
pub trait Image {
    /// Name of the image.
    fn name(&self) -> &str;
    /// Open the image, optionally read only.
    fn open(&mut self, read_only: bool) -> Result<(), StorageError>;
    /// Close a previously opened image.
    fn close(&mut self);
    /// Details of an opened image.
    fn stat(&self) -> Result<ImageStat, StorageError>;
    /// Remove the image from its pool.
    fn remove(&self) -> Result<(), StorageError>;
}
