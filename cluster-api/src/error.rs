use snafu::Snafu;

/// errno reported by the cluster when a pool or image does not exist
pub(crate) const ENOENT: i32 = 2;

/// Errors which can be encountered whilst talking to the storage cluster.
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum StorageError {
    #[snafu(display("Failed to spawn/wait for {} command: {}", command, source))]
    /// The command could not be executed
    Spawn {
        /// command line description
        command: String,
        /// spawn error
        source: std::io::Error,
    },
    #[snafu(display("{} command failed ({:?}): {}", command, code, error))]
    /// The command completed with a failure exit code
    Exit {
        /// command line description
        command: String,
        /// exit code, none if killed by a signal
        code: Option<i32>,
        /// captured stderr
        error: String,
    },
    #[snafu(display("Failed to json parse {} output: {}", command, source))]
    /// The command output is not the expected json
    JsonParsing {
        /// command line description
        command: String,
        /// decode error
        source: serde_json::Error,
    },
    #[snafu(display("Pool {} not found", pool))]
    /// The pool does not exist
    PoolNotFound {
        /// name of the pool
        pool: String,
    },
    #[snafu(display("Image {} not found in pool {}", image, pool))]
    /// The image does not exist
    ImageNotFound {
        /// name of the pool
        pool: String,
        /// name of the image
        image: String,
    },
    #[snafu(display("Image {} already exists in pool {}", image, pool))]
    /// An image with the same name already exists
    ImageExists {
        /// name of the pool
        pool: String,
        /// name of the image
        image: String,
    },
    #[snafu(display("Image {} in pool {} is not open", image, pool))]
    /// The image must be opened before it can be stat'ed
    ImageNotOpen {
        /// name of the pool
        pool: String,
        /// name of the image
        image: String,
    },
}

impl StorageError {
    /// The referenced pool or image does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::PoolNotFound {
                ..
            }
            | StorageError::ImageNotFound {
                ..
            } => true,
            StorageError::Exit {
                code, ..
            } => *code == Some(ENOENT),
            _ => false,
        }
    }
}
