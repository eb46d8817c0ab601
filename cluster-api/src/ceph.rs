//! Cluster adapter which drives a Ceph cluster through the `ceph` and `rbd`
//! command line tools, decoding their json output.
//! The tools keep no session between invocations, so connections and
//! contexts only carry the arguments needed to reach the cluster.

use crate::{
    adapter::{AdminConnection, Cluster, Image, IoContext},
    error::{self, ENOENT},
    v0::{ImageStat, PoolSummary},
    StorageError,
};
use serde::Deserialize;
use snafu::ResultExt;
use std::{ffi::OsStr, path::PathBuf, process::Command, sync::Arc};
use strum_macros::{AsRefStr, Display};

/// How to reach the cluster.
#[derive(Debug, Clone)]
pub struct CephConfig {
    /// path or name of the `ceph` binary
    pub ceph_bin: String,
    /// path or name of the `rbd` binary
    pub rbd_bin: String,
    /// name of the cluster
    pub cluster: String,
    /// client id used to authenticate, eg: admin
    pub id: String,
    /// configuration file, the tools' default when missing
    pub conf: Option<PathBuf>,
    /// keyring of the client id, the tools' default when missing
    pub keyring: Option<PathBuf>,
}

impl Default for CephConfig {
    fn default() -> Self {
        Self {
            ceph_bin: "ceph".to_string(),
            rbd_bin: "rbd".to_string(),
            cluster: "ceph".to_string(),
            id: "admin".to_string(),
            conf: None,
            keyring: None,
        }
    }
}

/// Subcommands used to manage pools and images.
#[derive(AsRefStr, Display, Debug, Clone, Copy)]
enum CephSubCmd {
    /// Cluster fsid, used to check the cluster is reachable.
    #[strum(serialize = "fsid")]
    Fsid,
    /// List the pools.
    #[strum(serialize = "osd lspools")]
    PoolList,
    /// Stats of a pool, fails if the pool does not exist.
    #[strum(serialize = "osd pool stats")]
    PoolStats,
    /// List the images of a pool.
    #[strum(serialize = "ls")]
    ImageList,
    /// Details of an image.
    #[strum(serialize = "info")]
    ImageInfo,
    /// Create an image.
    #[strum(serialize = "create")]
    ImageCreate,
    /// Remove an image.
    #[strum(serialize = "rm")]
    ImageRemove,
}

/// Wrapper over `Command` with the cluster connection arguments, error
/// mapping and decoding of the json output.
struct CephCmd {
    cmd: String,
    cmder: Command,
}

impl CephCmd {
    fn new(bin: &str, sub: CephSubCmd, config: &CephConfig) -> Self {
        let mut cmder = Command::new(bin);
        cmder
            .arg("--cluster")
            .arg(&config.cluster)
            .arg("--id")
            .arg(&config.id);
        if let Some(conf) = &config.conf {
            cmder.arg("--conf").arg(conf);
        }
        if let Some(keyring) = &config.keyring {
            cmder.arg("--keyring").arg(keyring);
        }
        cmder.args(sub.as_ref().split(' '));
        Self {
            cmd: format!("{} {}", bin, sub),
            cmder,
        }
    }
    /// Prepare a `ceph` command.
    fn ceph(sub: CephSubCmd, config: &CephConfig) -> Self {
        Self::new(&config.ceph_bin, sub, config)
    }
    /// Prepare a `rbd` command.
    fn rbd(sub: CephSubCmd, config: &CephConfig) -> Self {
        Self::new(&config.rbd_bin, sub, config)
    }
    /// See help for `Command::arg`.
    fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.cmder.arg(arg);
        self
    }
    /// See help for `Command::args`.
    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmder.args(args);
        self
    }
    /// Runs the command and returns the `T` decoded from its json output.
    ///
    /// # Errors
    ///
    /// `StorageError::Spawn` => Failed to execute or wait for completion.
    /// `StorageError::Exit` => Completed with a failure exit code.
    /// `StorageError::JsonParsing` => Output is not a valid json for `T`.
    fn output_json<T: for<'a> Deserialize<'a>>(self) -> Result<T, StorageError> {
        let cmd = self.cmd.clone();
        let output = self.arg("--format").arg("json").output()?;
        serde_json::from_slice(output.stdout.as_slice()).context(
            error::JsonParsing {
                command: cmd,
            },
        )
    }
    /// Runs the command and discards its output.
    fn run(self) -> Result<(), StorageError> {
        self.output().map(|_| ())
    }
    /// Runs the command and returns the `std::process::Output` in case of
    /// success.
    fn output(mut self) -> Result<std::process::Output, StorageError> {
        tracing::trace!("{:?}", self.cmder);

        let output = self.cmder.output().context(error::Spawn {
            command: self.cmd.clone(),
        })?;
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(StorageError::Exit {
                command: self.cmd,
                code: output.status.code(),
                error: error.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Decode the output of `ceph osd lspools --format json`, example:
/// [{"poolnum":1,"poolname":"rbd"},{"poolnum":2,"poolname":"data"}]
#[derive(Debug, Deserialize)]
struct LsPool {
    poolnum: i64,
    poolname: String,
}
impl From<LsPool> for PoolSummary {
    fn from(pool: LsPool) -> Self {
        Self {
            name: pool.poolname,
            number: pool.poolnum,
        }
    }
}

/// Decode the output of `rbd info --format json`, example:
/// {"name":"img1","size":1048576,"objects":1,"order":22,
///  "object_size":4194304,"block_name_prefix":"rbd_data.10226b8b4567",
///  "format":2}
#[derive(Debug, Deserialize)]
struct RbdInfo {
    size: u64,
    objects: u64,
    order: u8,
    object_size: u64,
    #[serde(default)]
    block_name_prefix: String,
}
impl From<RbdInfo> for ImageStat {
    fn from(info: RbdInfo) -> Self {
        Self {
            size: info.size,
            object_size: info.object_size,
            num_objs: info.objects,
            order: info.order,
            block_name_prefix: info.block_name_prefix,
        }
    }
}

/// Map an ENOENT exit of the tools into `not_found`.
fn or_not_found(error: StorageError, not_found: StorageError) -> StorageError {
    match error {
        StorageError::Exit {
            code: Some(ENOENT),
            ..
        } => not_found,
        error => error,
    }
}

/// Cluster reached through the `ceph` and `rbd` tools.
#[derive(Debug, Clone, Default)]
pub struct CephCli {
    config: Arc<CephConfig>,
}

impl CephCli {
    /// new adapter using `config` for every command
    pub fn new(config: CephConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
    /// configuration in use
    pub fn config(&self) -> &CephConfig {
        &self.config
    }
}

impl Cluster for CephCli {
    fn connect_admin(&self) -> Result<Box<dyn AdminConnection>, StorageError> {
        let fsid: serde_json::Value =
            CephCmd::ceph(CephSubCmd::Fsid, &self.config).output_json()?;
        tracing::debug!("connected to cluster {}", fsid);
        Ok(Box::new(CephConnection {
            config: self.config.clone(),
        }))
    }
}

struct CephConnection {
    config: Arc<CephConfig>,
}

impl AdminConnection for CephConnection {
    fn list_pools(&self) -> Result<Vec<PoolSummary>, StorageError> {
        let pools: Vec<LsPool> =
            CephCmd::ceph(CephSubCmd::PoolList, &self.config).output_json()?;
        Ok(pools.into_iter().map(PoolSummary::from).collect())
    }

    fn open_context(
        &self,
        pool: &str,
    ) -> Result<Box<dyn IoContext>, StorageError> {
        CephCmd::ceph(CephSubCmd::PoolStats, &self.config)
            .arg(pool)
            .output_json::<serde_json::Value>()
            .map_err(|error| {
                or_not_found(
                    error,
                    StorageError::PoolNotFound {
                        pool: pool.to_string(),
                    },
                )
            })?;
        Ok(Box::new(CephContext {
            config: self.config.clone(),
            pool: pool.to_string(),
        }))
    }

    fn shutdown(&mut self) {
        tracing::trace!("cluster {} connection shut down", self.config.cluster);
    }
}

struct CephContext {
    config: Arc<CephConfig>,
    pool: String,
}

impl CephContext {
    fn handle(&self, name: &str) -> RbdImage {
        RbdImage {
            config: self.config.clone(),
            pool: self.pool.clone(),
            name: name.to_string(),
            read_only: None,
        }
    }
}

impl IoContext for CephContext {
    fn pool(&self) -> &str {
        &self.pool
    }

    fn image_names(&self) -> Result<Vec<String>, StorageError> {
        CephCmd::rbd(CephSubCmd::ImageList, &self.config)
            .args(&["--pool", self.pool.as_str()])
            .output_json()
    }

    fn image(&self, name: &str) -> Box<dyn Image> {
        Box::new(self.handle(name))
    }

    fn create_image(
        &self,
        name: &str,
        size: u64,
        order: u8,
    ) -> Result<Box<dyn Image>, StorageError> {
        CephCmd::rbd(CephSubCmd::ImageCreate, &self.config)
            .args(&["--pool", self.pool.as_str()])
            .arg("--size")
            .arg(format!("{}B", size))
            .arg("--order")
            .arg(order.to_string())
            .arg(name)
            .run()
            .map_err(|error| match error {
                StorageError::Exit {
                    code: Some(EEXIST),
                    ..
                } => StorageError::ImageExists {
                    pool: self.pool.clone(),
                    image: name.to_string(),
                },
                error => or_not_found(
                    error,
                    StorageError::PoolNotFound {
                        pool: self.pool.clone(),
                    },
                ),
            })?;
        Ok(Box::new(self.handle(name)))
    }

    fn destroy(&mut self) {
        tracing::trace!("pool {} context destroyed", self.pool);
    }
}

/// errno reported when creating an image which already exists
const EEXIST: i32 = 17;

struct RbdImage {
    config: Arc<CephConfig>,
    pool: String,
    name: String,
    read_only: Option<bool>,
}

impl RbdImage {
    fn not_found(&self) -> StorageError {
        StorageError::ImageNotFound {
            pool: self.pool.clone(),
            image: self.name.clone(),
        }
    }
}

impl Image for RbdImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, read_only: bool) -> Result<(), StorageError> {
        self.read_only = Some(read_only);
        Ok(())
    }

    fn close(&mut self) {
        self.read_only = None;
    }

    fn stat(&self) -> Result<ImageStat, StorageError> {
        if self.read_only.is_none() {
            return Err(StorageError::ImageNotOpen {
                pool: self.pool.clone(),
                image: self.name.clone(),
            });
        }
        let info: RbdInfo = CephCmd::rbd(CephSubCmd::ImageInfo, &self.config)
            .args(&["--pool", self.pool.as_str(), "--image", self.name.as_str()])
            .output_json()
            .map_err(|error| or_not_found(error, self.not_found()))?;
        Ok(info.into())
    }

    fn remove(&self) -> Result<(), StorageError> {
        CephCmd::rbd(CephSubCmd::ImageRemove, &self.config)
            .args(&["--no-progress", "--pool", self.pool.as_str()])
            .arg(&self.name)
            .run()
            .map_err(|error| or_not_found(error, self.not_found()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &CephCmd) -> Vec<String> {
        cmd.cmder
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn connection_arguments() {
        let config = CephConfig {
            conf: Some("/etc/ceph/ceph.conf".into()),
            keyring: Some("/etc/ceph/keyring".into()),
            ..Default::default()
        };
        let cmd = CephCmd::rbd(CephSubCmd::ImageList, &config)
            .args(&["--pool", "rbd"]);
        assert_eq!(cmd.cmd, "rbd ls");
        assert_eq!(
            args(&cmd),
            vec![
                "--cluster",
                "ceph",
                "--id",
                "admin",
                "--conf",
                "/etc/ceph/ceph.conf",
                "--keyring",
                "/etc/ceph/keyring",
                "ls",
                "--pool",
                "rbd"
            ]
        );

        let cmd = CephCmd::ceph(CephSubCmd::PoolStats, &CephConfig::default());
        assert_eq!(
            args(&cmd),
            vec!["--cluster", "ceph", "--id", "admin", "osd", "pool", "stats"]
        );
    }

    #[test]
    fn decode_pools() {
        let pools: Vec<LsPool> = serde_json::from_str(
            r#"[{"poolnum":1,"poolname":"rbd"},{"poolnum":3,"poolname":"data"}]"#,
        )
        .unwrap();
        let pools = pools.into_iter().map(PoolSummary::from).collect::<Vec<_>>();
        assert_eq!(
            pools,
            vec![
                PoolSummary {
                    name: "rbd".into(),
                    number: 1
                },
                PoolSummary {
                    name: "data".into(),
                    number: 3
                }
            ]
        );
    }

    #[test]
    fn decode_info() {
        let info: RbdInfo = serde_json::from_str(
            r#"{"name":"img1","id":"10226b8b4567","size":1048576,"objects":1,
            "order":22,"object_size":4194304,"snapshot_count":0,
            "block_name_prefix":"rbd_data.10226b8b4567","format":2,
            "features":["layering"],"op_features":[],"flags":[]}"#,
        )
        .unwrap();
        assert_eq!(
            ImageStat::from(info),
            ImageStat {
                size: 1048576,
                object_size: 4194304,
                num_objs: 1,
                order: 22,
                block_name_prefix: "rbd_data.10226b8b4567".into(),
            }
        );
    }

    #[test]
    fn missing_binary() {
        let cluster = CephCli::new(CephConfig {
            ceph_bin: "/nonexistent/bin/ceph".into(),
            ..Default::default()
        });
        match cluster.connect_admin() {
            Err(StorageError::Spawn {
                command, ..
            }) => assert_eq!(command, "/nonexistent/bin/ceph fsid"),
            Err(error) => panic!("unexpected error {}", error),
            Ok(_) => panic!("connected without a ceph binary"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_and_silent_binaries() {
        let failing = CephCli::new(CephConfig {
            ceph_bin: "false".into(),
            ..Default::default()
        });
        match failing.connect_admin() {
            Err(StorageError::Exit {
                code, ..
            }) => assert_eq!(code, Some(1)),
            Err(error) => panic!("unexpected error {}", error),
            Ok(_) => panic!("connected with a failing ceph binary"),
        }

        let silent = CephCli::new(CephConfig {
            ceph_bin: "true".into(),
            ..Default::default()
        });
        match silent.connect_admin() {
            Err(StorageError::JsonParsing {
                ..
            }) => {}
            Err(error) => panic!("unexpected error {}", error),
            Ok(_) => panic!("connected with an empty fsid"),
        }
    }

    #[test]
    fn enoent_maps_to_not_found() {
        let exit = |code| StorageError::Exit {
            command: "rbd rm".into(),
            code: Some(code),
            error: String::new(),
        };
        let not_found = || StorageError::ImageNotFound {
            pool: "rbd".into(),
            image: "img1".into(),
        };
        assert!(matches!(
            or_not_found(exit(ENOENT), not_found()),
            StorageError::ImageNotFound { .. }
        ));
        assert!(matches!(
            or_not_found(exit(1), not_found()),
            StorageError::Exit { .. }
        ));
        assert!(exit(ENOENT).is_not_found());
    }

    #[test]
    fn stat_requires_open() {
        let context = CephContext {
            config: Arc::new(CephConfig::default()),
            pool: "rbd".into(),
        };
        let image = context.image("img1");
        assert!(matches!(
            image.stat(),
            Err(StorageError::ImageNotOpen { .. })
        ));
    }
}
