mod v0;

use actix_web::{middleware, App, HttpServer};
use cluster_api::{
    ceph::{CephCli, CephConfig},
    Cluster,
};
use rustls::{
    internal::pemfile::{certs, rsa_private_keys},
    NoClientAuth,
    ServerConfig,
};
use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub(crate) struct CliArgs {
    /// The bind address for the REST interface (with HTTP)
    /// Default: 0.0.0.0:8080
    #[structopt(long, default_value = "0.0.0.0:8080")]
    http: String,
    /// The bind address for the REST interface (with HTTPS)
    #[structopt(long, requires_all = &["cert-file", "key-file"])]
    https: Option<String>,

    /// Path to the certificate file
    #[structopt(long, short)]
    cert_file: Option<PathBuf>,
    /// Path to the key file
    #[structopt(long, short)]
    key_file: Option<PathBuf>,

    /// Trace rest requests to the Jaeger endpoint agent
    #[structopt(long, short)]
    jaeger: Option<String>,

    #[structopt(flatten)]
    ceph: CephArgs,
}

/// How to reach the storage cluster
#[derive(Debug, StructOpt)]
pub(crate) struct CephArgs {
    /// Path to the ceph binary
    #[structopt(long, default_value = "ceph")]
    ceph_bin: String,
    /// Path to the rbd binary
    #[structopt(long, default_value = "rbd")]
    rbd_bin: String,
    /// Name of the ceph cluster
    #[structopt(long, default_value = "ceph")]
    cluster: String,
    /// Client id used to authenticate with the cluster
    #[structopt(long, default_value = "admin")]
    id: String,
    /// Path to the ceph configuration file
    #[structopt(long)]
    conf: Option<PathBuf>,
    /// Path to the keyring of the client id
    #[structopt(long)]
    keyring: Option<PathBuf>,
}

impl From<CephArgs> for CephConfig {
    fn from(args: CephArgs) -> Self {
        Self {
            ceph_bin: args.ceph_bin,
            rbd_bin: args.rbd_bin,
            cluster: args.cluster,
            id: args.id,
            conf: args.conf,
            keyring: args.keyring,
        }
    }
}

use actix_web_opentelemetry::RequestTracing;
use opentelemetry::{
    global,
    sdk::{propagation::TraceContextPropagator, trace::Tracer},
};
use opentelemetry_jaeger::Uninstall;

fn init_tracing(
    jaeger: Option<&String>,
) -> anyhow::Result<Option<(Tracer, Uninstall)>> {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }
    if let Some(agent) = jaeger {
        tracing::info!("Starting jaeger trace pipeline at {}...", agent);
        // Start a new jaeger trace pipeline
        global::set_text_map_propagator(TraceContextPropagator::new());
        let pipeline = opentelemetry_jaeger::new_pipeline()
            .with_agent_endpoint(agent)
            .with_service_name("image-rest-server")
            .install()
            .map_err(|error| {
                anyhow::anyhow!("Jaeger pipeline install error: {}", error)
            })?;
        Ok(Some(pipeline))
    } else {
        Ok(None)
    }
}

fn get_certificates(args: &CliArgs) -> anyhow::Result<ServerConfig> {
    // guaranteed to be `Some` by the requires_all attribute
    let cert_file = args
        .cert_file
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("cert_file is required"))?;
    let key_file = args
        .key_file
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("key_file is required"))?;
    let cert_file = &mut BufReader::new(File::open(cert_file)?);
    let key_file = &mut BufReader::new(File::open(key_file)?);
    load_certificates(cert_file, key_file)
}

fn load_certificates<R: std::io::Read>(
    cert_file: &mut BufReader<R>,
    key_file: &mut BufReader<R>,
) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::new(NoClientAuth::new());
    let cert_chain = certs(cert_file).map_err(|_| {
        anyhow::anyhow!(
            "Failed to retrieve certificates from the certificate file",
        )
    })?;
    let mut keys = rsa_private_keys(key_file).map_err(|_| {
        anyhow::anyhow!(
            "Failed to retrieve the rsa private keys from the key file",
        )
    })?;
    if keys.is_empty() {
        anyhow::bail!("No keys found in the keys file");
    }
    config.set_single_cert(cert_chain, keys.remove(0))?;
    Ok(config)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::from_args();
    // need to keep the jaeger pipeline tracer alive, if enabled
    let _tracer = init_tracing(args.jaeger.as_ref())?;

    let tls = match args.https {
        Some(_) => Some(get_certificates(&args)?),
        None => None,
    };
    let CliArgs {
        http,
        https,
        ceph,
        ..
    } = args;

    let ceph = CephCli::new(ceph.into());
    tracing::info!("Using ceph cluster configuration {:?}", ceph.config());
    let cluster: Arc<dyn Cluster> = Arc::new(ceph);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestTracing::new())
            .wrap(middleware::Logger::default())
            .data(cluster.clone())
            .configure(v0::configure)
    })
    .bind(http)?;

    match (https, tls) {
        (Some(https), Some(tls)) => server.bind_rustls(https, tls)?,
        _ => server,
    }
    .run()
    .await
    .map_err(|e| e.into())
}
