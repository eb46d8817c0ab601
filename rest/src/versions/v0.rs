use super::super::{ActixRestClient, ClientResult};
use actix_web::{
    error::BlockingError,
    http::StatusCode,
    HttpResponse,
    ResponseError,
};
use async_trait::async_trait;
use cluster_api::StorageError;
use snafu::Snafu;

/// Block image, as listed, created and deleted through the REST api
pub type BlockImage = cluster_api::v0::BlockImage;

/// urn of the image collection
pub const IMAGE_URN: &str = "/image";
/// urn used to remove an image
pub const IMAGE_REMOVE_URN: &str = "/image/remove";

/// Message returned when an image is created
pub fn created_message(name: &str) -> String {
    format!("succeeded created image {}", name)
}
/// Message returned when an image is deleted
pub fn deleted_message(name: &str) -> String {
    format!("succeeded deleting image {}", name)
}

/// RestClient interface
#[async_trait(?Send)]
pub trait RestClient {
    /// Get the images of all pools
    async fn get_images(&self) -> ClientResult<Vec<BlockImage>>;
    /// Create a new image, returns the confirmation message
    async fn create_image(&self, image: &BlockImage) -> ClientResult<String>;
    /// Delete an image, only the name and pool are used
    async fn delete_image(&self, image: &BlockImage) -> ClientResult<String>;
}

#[async_trait(?Send)]
impl RestClient for ActixRestClient {
    async fn get_images(&self) -> ClientResult<Vec<BlockImage>> {
        self.get_vec(IMAGE_URN).await
    }

    async fn create_image(&self, image: &BlockImage) -> ClientResult<String> {
        self.post_text(IMAGE_URN, image).await
    }

    async fn delete_image(&self, image: &BlockImage) -> ClientResult<String> {
        self.post_text(IMAGE_REMOVE_URN, image).await
    }
}

impl ActixRestClient {
    /// Get RestClient v0
    pub fn v0(&self) -> impl RestClient {
        self.clone()
    }
}

/// Rest Error
/// Failures are logged with their context and answered with the status
/// code only.
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub")]
pub enum RestError {
    /// The request body could not be read
    #[snafu(display("Failed to read the {} request body: {}", operation, details))]
    ReadBody {
        /// operation which read the body
        operation: String,
        /// payload error
        details: String,
    },
    /// The request body is not a json image
    #[snafu(display(
        "Failed to unmarshal {} request body '{}': {}",
        operation,
        body,
        source
    ))]
    MalformedBody {
        /// operation which decoded the body
        operation: String,
        /// the received body
        body: String,
        /// decode error
        source: serde_json::Error,
    },
    /// The request image lacks required fields
    #[snafu(display("Image missing required fields: {:?}", image))]
    MissingFields {
        /// the received image
        image: BlockImage,
    },
    /// The storage cluster failed the operation
    #[snafu(display("Failed to {}: {}", details, source))]
    Storage {
        /// what was being done
        details: String,
        /// cluster error
        source: StorageError,
    },
    /// The blocking task was canceled before completion
    #[snafu(display("Blocking cluster operation canceled"))]
    Canceled {},
}

impl RestError {
    /// http status of the error
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::MalformedBody {
                ..
            }
            | RestError::MissingFields {
                ..
            } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for RestError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }
    fn error_response(&self) -> HttpResponse {
        tracing::error!("{}", self);
        HttpResponse::build(self.status()).finish()
    }
}

impl From<BlockingError<RestError>> for RestError {
    fn from(error: BlockingError<RestError>) -> Self {
        match error {
            BlockingError::Error(error) => error,
            BlockingError::Canceled => RestError::Canceled {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::{BodySize, MessageBody};

    #[test]
    fn status_mapping() {
        let missing = RestError::MissingFields {
            image: BlockImage::new("", "rbd", 1),
        };
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let malformed = serde_json::from_str::<BlockImage>("{")
            .map_err(|source| RestError::MalformedBody {
                operation: "create image".into(),
                body: "{".into(),
                source,
            })
            .unwrap_err();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let storage = RestError::Storage {
            details: "list pools".into(),
            source: StorageError::PoolNotFound {
                pool: "rbd".into(),
            },
        };
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            storage.to_string(),
            "Failed to list pools: Pool rbd not found"
        );

        let canceled = RestError::from(BlockingError::<RestError>::Canceled);
        assert_eq!(canceled.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failures_have_no_body() {
        let error = RestError::ReadBody {
            operation: "delete image".into(),
            details: "payload reached EOF".into(),
        };
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().size(), BodySize::Empty);
    }
}
