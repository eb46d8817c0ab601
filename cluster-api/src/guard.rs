use crate::{
    adapter::{AdminConnection, Cluster, Image, IoContext},
    v0::{ImageStat, PoolSummary},
    StorageError,
};
use std::marker::PhantomData;

/// Admin connection which is shut down when dropped.
pub struct Connected {
    inner: Box<dyn AdminConnection>,
}

impl Connected {
    /// Connect to the `cluster` as admin.
    pub fn connect(cluster: &dyn Cluster) -> Result<Self, StorageError> {
        let inner = cluster.connect_admin()?;
        tracing::trace!("admin connection established");
        Ok(Self {
            inner,
        })
    }
    /// See `AdminConnection::list_pools`.
    pub fn list_pools(&self) -> Result<Vec<PoolSummary>, StorageError> {
        self.inner.list_pools()
    }
    /// Open a context for `pool` which cannot outlive this connection.
    pub fn open_context(
        &self,
        pool: &str,
    ) -> Result<PoolContext<'_>, StorageError> {
        let inner = self.inner.open_context(pool)?;
        tracing::trace!(pool, "io context opened");
        Ok(PoolContext {
            inner,
            _connection: PhantomData,
        })
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        tracing::trace!("shutting down admin connection");
        self.inner.shutdown();
    }
}

/// Pool context which is destroyed when dropped, always before the
/// connection it was opened from.
pub struct PoolContext<'c> {
    inner: Box<dyn IoContext>,
    _connection: PhantomData<&'c Connected>,
}

impl<'c> PoolContext<'c> {
    /// Name of the pool.
    pub fn pool(&self) -> &str {
        self.inner.pool()
    }
    /// See `IoContext::image_names`.
    pub fn image_names(&self) -> Result<Vec<String>, StorageError> {
        self.inner.image_names()
    }
    /// Unopened handle for the image `name`.
    pub fn image(&self, name: &str) -> Box<dyn Image> {
        self.inner.image(name)
    }
    /// Open the image `name`, closed again when the returned guard drops.
    pub fn open_image(
        &self,
        name: &str,
        read_only: bool,
    ) -> Result<OpenedImage<'_>, StorageError> {
        let mut inner = self.inner.image(name);
        inner.open(read_only)?;
        Ok(OpenedImage {
            inner,
            _context: PhantomData,
        })
    }
    /// See `IoContext::create_image`.
    pub fn create_image(
        &self,
        name: &str,
        size: u64,
        order: u8,
    ) -> Result<Box<dyn Image>, StorageError> {
        self.inner.create_image(name, size, order)
    }
}

impl Drop for PoolContext<'_> {
    fn drop(&mut self) {
        tracing::trace!(pool = self.inner.pool(), "destroying io context");
        self.inner.destroy();
    }
}

/// Opened image which is closed when dropped, always before the context it
/// was opened from.
pub struct OpenedImage<'p> {
    inner: Box<dyn Image>,
    _context: PhantomData<&'p ()>,
}

impl OpenedImage<'_> {
    /// Name of the image.
    pub fn name(&self) -> &str {
        self.inner.name()
    }
    /// See `Image::stat`.
    pub fn stat(&self) -> Result<ImageStat, StorageError> {
        self.inner.stat()
    }
}

impl Drop for OpenedImage<'_> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Event, Failure, FakeCluster};

    fn cluster() -> FakeCluster {
        FakeCluster::new()
            .with_image("rbd", "a", 1024)
            .with_image("rbd", "b", 2048)
    }

    #[test]
    fn release_in_reverse_order() {
        let cluster = cluster();
        {
            let connection = Connected::connect(&cluster).unwrap();
            let context = connection.open_context("rbd").unwrap();
            let image = context.open_image("a", true).unwrap();
            assert_eq!(image.stat().unwrap().size, 1024);
        }
        assert_eq!(
            cluster.journal(),
            vec![
                Event::Connect,
                Event::OpenContext("rbd".into()),
                Event::OpenImage("rbd".into(), "a".into()),
                Event::CloseImage("rbd".into(), "a".into()),
                Event::DestroyContext("rbd".into()),
                Event::Shutdown,
            ]
        );
        assert!(cluster.counters().balanced());
    }

    #[test]
    fn failed_open_is_not_closed() {
        let cluster =
            cluster().fail(Failure::OpenImage("rbd".into(), "b".into()));
        {
            let connection = Connected::connect(&cluster).unwrap();
            let context = connection.open_context("rbd").unwrap();
            context.open_image("b", true).err().unwrap();
            context.open_image("missing", true).err().unwrap();
        }
        let counters = cluster.counters();
        assert_eq!(counters.images.acquired, 0);
        assert_eq!(counters.images.released, 0);
        assert!(counters.balanced());
    }

    #[test]
    fn context_failure_releases_connection() {
        let cluster = cluster();
        {
            let connection = Connected::connect(&cluster).unwrap();
            let error = connection.open_context("nope").err().unwrap();
            assert!(error.is_not_found());
        }

        let counters = cluster.counters();
        assert_eq!(counters.connections.acquired, 1);
        assert_eq!(counters.connections.released, 1);
        assert_eq!(counters.contexts.acquired, 0);
    }
}
