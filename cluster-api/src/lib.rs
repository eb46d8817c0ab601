#![warn(missing_docs)]
//! Block image management against a storage cluster.
//!
//! The cluster is reached through the adapter traits in [`adapter`]; every
//! resource handed out by an adapter must be released explicitly, which the
//! guards in [`guard`] take care of, in reverse order of acquisition.
//!
//! # Example:
//!
//! fn images(cluster: &dyn Cluster) -> Result<Vec<String>, StorageError> {
//!     let connection = Connected::connect(cluster)?;
//!     let context = connection.open_context("rbd")?;
//!     context.image_names()
//! }

/// storage client adapter contract
pub mod adapter;
/// adapter driving the `ceph` and `rbd` command line tools
pub mod ceph;
mod error;
/// in-memory adapter with acquire/release accounting
#[cfg(any(test, feature = "fake"))]
pub mod fake;
/// scoped release of connections, contexts and images
pub mod guard;
/// data model shared with the REST layer
pub mod v0;

pub use adapter::{AdminConnection, Cluster, Image, IoContext};
pub use error::StorageError;
pub use guard::{Connected, OpenedImage, PoolContext};
