//! In-memory cluster which keeps track of every acquired and released
//! resource and can be told to fail specific operations.

use crate::{
    adapter::{AdminConnection, Cluster, Image, IoContext},
    v0::{ImageStat, PoolSummary},
    StorageError,
};
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};

/// exit code of injected failures
const EIO: i32 = 5;

/// Operation which the fake cluster fails on demand
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Failure {
    /// admin connection
    Connect,
    /// pool enumeration
    ListPools,
    /// context open of the given pool
    OpenContext(String),
    /// image enumeration of the given pool
    ImageNames(String),
    /// open of the given pool and image
    OpenImage(String, String),
    /// stat of the given pool and image
    Stat(String, String),
    /// any image creation in the given pool
    Create(String),
    /// any image removal in the given pool
    Remove(String),
}

/// Acquire/release accounting of one kind of resource
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Tally {
    /// number of successful acquisitions
    pub acquired: usize,
    /// number of releases
    pub released: usize,
}
impl Tally {
    /// every acquired resource was released exactly once
    pub fn balanced(&self) -> bool {
        self.acquired == self.released
    }
}

/// Accounting of all resources handed out by the fake cluster
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Counters {
    /// admin connections
    pub connections: Tally,
    /// pool contexts
    pub contexts: Tally,
    /// opened images
    pub images: Tally,
}
impl Counters {
    /// all resources were released
    pub fn balanced(&self) -> bool {
        self.connections.balanced()
            && self.contexts.balanced()
            && self.images.balanced()
    }
}

/// Resource and mutation events, in the order they happened
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    /// admin connection established
    Connect,
    /// admin connection shut down
    Shutdown,
    /// context opened for pool
    OpenContext(String),
    /// context destroyed for pool
    DestroyContext(String),
    /// image opened (pool, image)
    OpenImage(String, String),
    /// image closed (pool, image)
    CloseImage(String, String),
    /// image created (pool, image)
    Create(String, String),
    /// image removed (pool, image)
    Remove(String, String),
}

#[derive(Debug, Clone)]
struct FakeImage {
    name: String,
    size: u64,
    order: u8,
}

#[derive(Debug, Clone)]
struct FakePool {
    name: String,
    number: i64,
    images: Vec<FakeImage>,
}

#[derive(Debug, Default)]
struct State {
    pools: Vec<FakePool>,
    failures: HashSet<Failure>,
    counters: Counters,
    journal: Vec<Event>,
}

impl State {
    fn check(&self, failure: Failure) -> Result<(), StorageError> {
        if self.failures.contains(&failure) {
            return Err(StorageError::Exit {
                command: format!("fake {:?}", failure),
                code: Some(EIO),
                error: "injected failure".to_string(),
            });
        }
        Ok(())
    }
    fn pool(&self, pool: &str) -> Option<&FakePool> {
        self.pools.iter().find(|p| p.name == pool)
    }
    fn pool_mut(&mut self, pool: &str) -> Option<&mut FakePool> {
        self.pools.iter_mut().find(|p| p.name == pool)
    }
    fn image(&self, pool: &str, image: &str) -> Result<FakeImage, StorageError> {
        self.pool(pool)
            .and_then(|p| p.images.iter().find(|i| i.name == image))
            .cloned()
            .ok_or_else(|| StorageError::ImageNotFound {
                pool: pool.to_string(),
                image: image.to_string(),
            })
    }
}

/// In-memory cluster, clones share the same state
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    /// new empty cluster
    pub fn new() -> Self {
        Self::default()
    }
    /// add an empty pool, no-op if it exists already
    pub fn with_pool(self, pool: &str) -> Self {
        {
            let mut state = self.state.lock();
            if state.pool(pool).is_none() {
                let number = state.pools.len() as i64 + 1;
                state.pools.push(FakePool {
                    name: pool.to_string(),
                    number,
                    images: vec![],
                });
            }
        }
        self
    }
    /// add an image with the default order, creating the pool if needed
    pub fn with_image(self, pool: &str, image: &str, size: u64) -> Self {
        let cluster = self.with_pool(pool);
        {
            let mut state = cluster.state.lock();
            if let Some(pool) = state.pool_mut(pool) {
                pool.images.push(FakeImage {
                    name: image.to_string(),
                    size,
                    order: 22,
                });
            }
        }
        cluster
    }
    /// fail the given operation until further notice
    pub fn fail(self, failure: Failure) -> Self {
        self.state.lock().failures.insert(failure);
        self
    }
    /// resource accounting so far
    pub fn counters(&self) -> Counters {
        self.state.lock().counters
    }
    /// events so far
    pub fn journal(&self) -> Vec<Event> {
        self.state.lock().journal.clone()
    }
    /// (name, size, order) of the images of `pool`, in creation order
    pub fn images(&self, pool: &str) -> Vec<(String, u64, u8)> {
        self.state
            .lock()
            .pool(pool)
            .map(|p| {
                p.images
                    .iter()
                    .map(|i| (i.name.clone(), i.size, i.order))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Cluster for FakeCluster {
    fn connect_admin(&self) -> Result<Box<dyn AdminConnection>, StorageError> {
        let mut state = self.state.lock();
        state.check(Failure::Connect)?;
        state.counters.connections.acquired += 1;
        state.journal.push(Event::Connect);
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
            shutdown: false,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<State>>,
    shutdown: bool,
}

impl AdminConnection for FakeConnection {
    fn list_pools(&self) -> Result<Vec<PoolSummary>, StorageError> {
        let state = self.state.lock();
        state.check(Failure::ListPools)?;
        Ok(state
            .pools
            .iter()
            .map(|p| PoolSummary {
                name: p.name.clone(),
                number: p.number,
            })
            .collect())
    }

    fn open_context(
        &self,
        pool: &str,
    ) -> Result<Box<dyn IoContext>, StorageError> {
        let mut state = self.state.lock();
        state.check(Failure::OpenContext(pool.to_string()))?;
        if state.pool(pool).is_none() {
            return Err(StorageError::PoolNotFound {
                pool: pool.to_string(),
            });
        }
        state.counters.contexts.acquired += 1;
        state.journal.push(Event::OpenContext(pool.to_string()));
        Ok(Box::new(FakeContext {
            state: self.state.clone(),
            pool: pool.to_string(),
            destroyed: false,
        }))
    }

    fn shutdown(&mut self) {
        if !self.shutdown {
            self.shutdown = true;
            let mut state = self.state.lock();
            state.counters.connections.released += 1;
            state.journal.push(Event::Shutdown);
        }
    }
}

struct FakeContext {
    state: Arc<Mutex<State>>,
    pool: String,
    destroyed: bool,
}

impl IoContext for FakeContext {
    fn pool(&self) -> &str {
        &self.pool
    }

    fn image_names(&self) -> Result<Vec<String>, StorageError> {
        let state = self.state.lock();
        state.check(Failure::ImageNames(self.pool.clone()))?;
        Ok(state
            .pool(&self.pool)
            .map(|p| p.images.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default())
    }

    fn image(&self, name: &str) -> Box<dyn Image> {
        Box::new(FakeImageHandle {
            state: self.state.clone(),
            pool: self.pool.clone(),
            name: name.to_string(),
            opened: false,
        })
    }

    fn create_image(
        &self,
        name: &str,
        size: u64,
        order: u8,
    ) -> Result<Box<dyn Image>, StorageError> {
        {
            let mut state = self.state.lock();
            state.check(Failure::Create(self.pool.clone()))?;
            if state.image(&self.pool, name).is_ok() {
                return Err(StorageError::ImageExists {
                    pool: self.pool.clone(),
                    image: name.to_string(),
                });
            }
            let pool = state.pool_mut(&self.pool).ok_or_else(|| {
                StorageError::PoolNotFound {
                    pool: self.pool.clone(),
                }
            })?;
            pool.images.push(FakeImage {
                name: name.to_string(),
                size,
                order,
            });
            state
                .journal
                .push(Event::Create(self.pool.clone(), name.to_string()));
        }
        Ok(self.image(name))
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            let mut state = self.state.lock();
            state.counters.contexts.released += 1;
            state.journal.push(Event::DestroyContext(self.pool.clone()));
        }
    }
}

struct FakeImageHandle {
    state: Arc<Mutex<State>>,
    pool: String,
    name: String,
    opened: bool,
}

impl Image for FakeImageHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, _read_only: bool) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.check(Failure::OpenImage(self.pool.clone(), self.name.clone()))?;
        state.image(&self.pool, &self.name)?;
        state.counters.images.acquired += 1;
        state
            .journal
            .push(Event::OpenImage(self.pool.clone(), self.name.clone()));
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.opened {
            self.opened = false;
            let mut state = self.state.lock();
            state.counters.images.released += 1;
            state
                .journal
                .push(Event::CloseImage(self.pool.clone(), self.name.clone()));
        }
    }

    fn stat(&self) -> Result<ImageStat, StorageError> {
        if !self.opened {
            return Err(StorageError::ImageNotOpen {
                pool: self.pool.clone(),
                image: self.name.clone(),
            });
        }
        let state = self.state.lock();
        state.check(Failure::Stat(self.pool.clone(), self.name.clone()))?;
        let image = state.image(&self.pool, &self.name)?;
        let object_size = 1u64 << image.order;
        Ok(ImageStat {
            size: image.size,
            object_size,
            num_objs: (image.size + object_size - 1) / object_size,
            order: image.order,
            block_name_prefix: format!("rbd_data.{}", image.name),
        })
    }

    fn remove(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.check(Failure::Remove(self.pool.clone()))?;
        state.image(&self.pool, &self.name)?;
        if let Some(pool) = state.pool_mut(&self.pool) {
            pool.images.retain(|i| i.name != self.name);
        }
        state
            .journal
            .push(Event::Remove(self.pool.clone(), self.name.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_stat_remove() {
        let cluster = FakeCluster::new().with_pool("rbd");
        let mut connection = cluster.connect_admin().unwrap();
        let mut context = connection.open_context("rbd").unwrap();

        let created = context.create_image("img1", 1048576, 22).unwrap();
        assert_eq!(created.name(), "img1");
        assert!(context.create_image("img1", 1, 22).is_err());

        let mut image = context.image("img1");
        assert!(image.stat().is_err());
        image.open(true).unwrap();
        let stat = image.stat().unwrap();
        assert_eq!(stat.size, 1048576);
        assert_eq!(stat.object_size, 4194304);
        assert_eq!(stat.num_objs, 1);
        image.close();

        context.image("img1").remove().unwrap();
        assert!(context.image("img1").remove().unwrap_err().is_not_found());
        assert!(cluster.images("rbd").is_empty());

        context.destroy();
        context.destroy();
        connection.shutdown();
        assert_eq!(cluster.counters().contexts.released, 1);
        assert!(cluster.counters().balanced());
    }

    #[test]
    fn injected_failures() {
        let cluster = FakeCluster::new()
            .with_image("rbd", "a", 1)
            .fail(Failure::ListPools)
            .fail(Failure::Stat("rbd".into(), "a".into()));
        let connection = cluster.connect_admin().unwrap();
        assert!(connection.list_pools().is_err());

        let context = connection.open_context("rbd").unwrap();
        assert_eq!(context.image_names().unwrap(), vec!["a".to_string()]);
        let mut image = context.image("a");
        image.open(true).unwrap();
        assert!(image.stat().is_err());

        let cluster = cluster.fail(Failure::Connect);
        assert!(cluster.connect_admin().is_err());
    }

    #[test]
    fn pools_keep_insertion_order() {
        let cluster = FakeCluster::new()
            .with_pool("b")
            .with_pool("a")
            .with_pool("b");
        let connection = cluster.connect_admin().unwrap();
        let pools = connection.list_pools().unwrap();
        let names = pools.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(pools[1].number, 2);
    }
}
