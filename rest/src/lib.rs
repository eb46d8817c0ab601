#![warn(missing_docs)]
//! Client library which manages the block images of a storage cluster
//! through the REST service
//! Different versions are exposed through `versions`
//!
//! # Example:
//!
//! async fn main() {
//!     use rest_client::{versions::v0::RestClient, ActixRestClient};
//!     let client = ActixRestClient::new("http://localhost:8080", false)
//!         .unwrap()
//!         .v0();
//!     let _images = client.get_images().await.unwrap();
//! }

/// expose different versions of the client
pub mod versions;

use actix_web::{
    client::{
        Client,
        ClientBuilder,
        ClientResponse,
        PayloadError,
        SendRequestError,
    },
    dev::ResponseHead,
    web::Bytes,
};
use actix_web_opentelemetry::ClientExt;
use futures::Stream;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

/// Actix Rest Client
#[derive(Clone)]
pub struct ActixRestClient {
    client: actix_web::client::Client,
    url: String,
    trace: bool,
}

impl ActixRestClient {
    /// creates a new client which uses the specified `url`
    /// https urls need a CA certificate, see `new_with_ca`
    pub fn new(url: &str, trace: bool) -> anyhow::Result<Self> {
        Self::new_timeout(url, trace, None, Duration::from_secs(5))
    }
    /// creates a new client which uses the specified `url` and trusts the
    /// server certificates signed by the `ca_cert` pem file
    pub fn new_with_ca(
        url: &str,
        trace: bool,
        ca_cert: &Path,
    ) -> anyhow::Result<Self> {
        Self::new_timeout(url, trace, Some(ca_cert), Duration::from_secs(5))
    }
    /// creates a new client which uses the specified `url`
    /// uses the rustls connector if the url has the https scheme
    pub fn new_timeout(
        url: &str,
        trace: bool,
        ca_cert: Option<&Path>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let url: url::Url = url.parse()?;
        let builder = Client::builder().timeout(timeout);

        match url.scheme() {
            "https" => Self::new_https(builder, &url, trace, ca_cert),
            "http" => Ok(Self::new_http(builder, &url, trace)),
            invalid => {
                let msg = format!("Invalid url scheme: {}", invalid);
                Err(anyhow::Error::msg(msg))
            }
        }
    }
    /// creates a new secure client
    fn new_https(
        client: ClientBuilder,
        url: &url::Url,
        trace: bool,
        ca_cert: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let ca_cert = ca_cert.ok_or_else(|| {
            anyhow::anyhow!("A CA certificate is required for {}", url)
        })?;
        let cert_file = &mut BufReader::new(File::open(ca_cert)?);

        let mut config = rustls::ClientConfig::new();
        config
            .root_store
            .add_pem_file(cert_file)
            .map_err(|_| anyhow::anyhow!("Add pem file to the root store!"))?;
        let connector = actix_web::client::Connector::new()
            .rustls(std::sync::Arc::new(config));
        let rest_client = client.connector(connector.finish()).finish();

        Ok(Self {
            client: rest_client,
            url: url.to_string().trim_end_matches('/').into(),
            trace,
        })
    }
    /// creates a new client
    fn new_http(client: ClientBuilder, url: &url::Url, trace: bool) -> Self {
        Self {
            client: client.finish(),
            url: url.to_string().trim_end_matches('/').into(),
            trace,
        }
    }
    async fn get_vec<R>(&self, urn: &str) -> ClientResult<Vec<R>>
    where
        for<'de> R: Deserialize<'de>,
    {
        let uri = format!("{}{}", self.url, urn);

        let result = if self.trace {
            self.client.get(uri.clone()).trace_request().send().await
        } else {
            self.client.get(uri.clone()).send().await
        };

        let rest_response = result.context(Send {
            details: format!("Failed to get_vec uri {}", uri),
        })?;

        Self::rest_vec_result(rest_response).await
    }
    async fn post_text<B: Serialize>(
        &self,
        urn: &str,
        body: &B,
    ) -> ClientResult<String> {
        let uri = format!("{}{}", self.url, urn);
        let body = serde_json::to_vec(body).context(Encode {
            details: format!("Failed to encode the body of uri {}", uri),
        })?;

        let result = if self.trace {
            self.client
                .post(uri.clone())
                .content_type("application/json")
                .trace_request()
                .send_body(body)
                .await
        } else {
            self.client
                .post(uri.clone())
                .content_type("application/json")
                .send_body(body)
                .await
        };

        let rest_response = result.context(Send {
            details: format!("Failed to post uri {}", uri),
        })?;

        Self::rest_text_result(rest_response).await
    }

    async fn rest_vec_result<S, R>(
        mut rest_response: ClientResponse<S>,
    ) -> ClientResult<Vec<R>>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
        for<'de> R: Deserialize<'de>,
    {
        let status = rest_response.status();
        let headers = rest_response.headers().clone();
        let head = || {
            let mut head = ResponseHead::new(status);
            head.headers = headers.clone();
            head
        };
        let body = rest_response.body().await.map_err(|_| {
            ClientError::InvalidPayload {
                head: head(),
            }
        })?;
        if status.is_success() {
            serde_json::from_slice(&body).map_err(|_| {
                ClientError::InvalidBody {
                    head: head(),
                    body,
                }
            })
        } else {
            Err(ClientError::Status {
                head: head(),
            })
        }
    }

    async fn rest_text_result<S>(
        mut rest_response: ClientResponse<S>,
    ) -> ClientResult<String>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        let status = rest_response.status();
        let headers = rest_response.headers().clone();
        let head = || {
            let mut head = ResponseHead::new(status);
            head.headers = headers.clone();
            head
        };
        let body = rest_response.body().await.map_err(|_| {
            ClientError::InvalidPayload {
                head: head(),
            }
        })?;
        if status.is_success() {
            String::from_utf8(body.to_vec()).map_err(|_| {
                ClientError::InvalidBody {
                    head: head(),
                    body,
                }
            })
        } else {
            Err(ClientError::Status {
                head: head(),
            })
        }
    }
}

/// Result of a Rest Client Operation
/// T is the Object parsed from the body
pub type ClientResult<T> = Result<T, ClientError>;

/// Rest Client Error
#[derive(Debug, Snafu)]
pub enum ClientError {
    /// Failed to send message to the server
    #[snafu(display("{}, reason: {}", details, source))]
    Send {
        /// Message
        details: String,
        /// Source Request Error
        source: SendRequestError,
    },
    /// Failed to encode the request body
    #[snafu(display("{}, reason: {}", details, source))]
    Encode {
        /// Message
        details: String,
        /// Source Encode Error
        source: serde_json::Error,
    },
    /// Invalid Payload
    #[snafu(display("Invalid payload, header: {:?}", head))]
    InvalidPayload {
        /// http Header
        head: ResponseHead,
    },
    /// Invalid Body
    #[snafu(display("Invalid body, header: {:?}", head))]
    InvalidBody {
        /// http Header
        head: ResponseHead,
        /// http Body
        body: Bytes,
    },
    /// The server failed the request, failures carry no body
    #[snafu(display("Http status: {}", head.status))]
    Status {
        /// http Header
        head: ResponseHead,
    },
}

impl ClientError {
    /// http status of a request the server failed
    pub fn status(&self) -> Option<actix_web::http::StatusCode> {
        match self {
            ClientError::Status {
                head,
            } => Some(head.status),
            _ => None,
        }
    }
}
