//! Version 0 of the URI's
//! Ex: /image

pub mod images;

use rest_client::versions::v0::*;

use actix_web::web;
use cluster_api::Cluster;
use futures::StreamExt;
use snafu::ResultExt;
use std::sync::Arc;
use tracing_futures::Instrument;

/// Cluster shared by all handlers
pub(crate) type ClusterData = web::Data<Arc<dyn Cluster>>;

pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    images::configure(cfg);
}

/// Run the cluster orchestration `f` on the blocking thread pool, within the
/// span of the calling handler.
async fn blocking<F, T>(f: F) -> Result<T, RestError>
where
    F: FnOnce() -> Result<T, RestError> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    web::block(move || span.in_scope(f))
        .await
        .map_err(RestError::from)
}

/// Read the whole request body, failures are server errors.
async fn read_body(
    mut payload: web::Payload,
    operation: &str,
) -> Result<web::Bytes, RestError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|error| RestError::ReadBody {
            operation: operation.to_string(),
            details: error.to_string(),
        })?;
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Decode the request body into a `BlockImage`, failures are client errors.
fn decode_image(body: &[u8], operation: &str) -> Result<BlockImage, RestError> {
    serde_json::from_slice(body).context(MalformedBody {
        operation,
        body: String::from_utf8_lossy(body),
    })
}
