use super::*;
use actix_web::{get, post, HttpResponse};
use cluster_api::{Connected, PoolContext};

/// Object size of new images, as a power of two (4MiB).
const IMAGE_ORDER: u8 = 22;

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_images)
        .service(create_image)
        .service(delete_image);
}

// Lists the images of every pool of the cluster.
//      curl -X GET "http://localhost:8080/image"
#[get("/image")]
async fn get_images(cluster: ClusterData) -> Result<HttpResponse, RestError> {
    let cluster = cluster.get_ref().clone();
    async move {
        let images = blocking(move || list_images(cluster.as_ref())).await?;
        Ok(HttpResponse::Ok().json(images))
    }
    .instrument(tracing::info_span!("get_images"))
    .await
}

// Creates a new image.
//      curl -X POST "http://localhost:8080/image" \
//      -d '{"name":"img1","poolName":"rbd","size":1048576}'
#[post("/image")]
async fn create_image(
    cluster: ClusterData,
    payload: web::Payload,
) -> Result<HttpResponse, RestError> {
    let cluster = cluster.get_ref().clone();
    async move {
        let body = read_body(payload, "create image").await?;
        let image = decode_image(&body, "create image")?;
        validate_create(&image)?;
        let message =
            blocking(move || new_image(cluster.as_ref(), &image)).await?;
        Ok(text(message))
    }
    .instrument(tracing::info_span!("create_image"))
    .await
}

// Deletes an image, the size is ignored.
//      curl -X POST "http://localhost:8080/image/remove" \
//      -d '{"name":"img1","poolName":"rbd"}'
#[post("/image/remove")]
async fn delete_image(
    cluster: ClusterData,
    payload: web::Payload,
) -> Result<HttpResponse, RestError> {
    let cluster = cluster.get_ref().clone();
    async move {
        let body = read_body(payload, "delete image").await?;
        let image = decode_image(&body, "delete image")?;
        validate_remove(&image)?;
        let message =
            blocking(move || remove_image(cluster.as_ref(), &image)).await?;
        Ok(text(message))
    }
    .instrument(tracing::info_span!("delete_image"))
    .await
}

fn text(message: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(message)
}

fn validate_create(image: &BlockImage) -> Result<(), RestError> {
    if image.name.is_empty() || image.pool_name.is_empty() || image.size == 0
    {
        return MissingFields {
            image: image.clone(),
        }
        .fail();
    }
    Ok(())
}

fn validate_remove(image: &BlockImage) -> Result<(), RestError> {
    if image.name.is_empty() || image.pool_name.is_empty() {
        return MissingFields {
            image: image.clone(),
        }
        .fail();
    }
    Ok(())
}

fn connect(cluster: &dyn Cluster) -> Result<Connected, RestError> {
    Connected::connect(cluster).context(Storage {
        details: "connect to the cluster",
    })
}

fn open_context<'c>(
    connection: &'c Connected,
    pool: &str,
) -> Result<PoolContext<'c>, RestError> {
    connection.open_context(pool).context(Storage {
        details: format!("open the io context of pool {}", pool),
    })
}

/// Images of all pools, all or nothing.
fn list_images(cluster: &dyn Cluster) -> Result<Vec<BlockImage>, RestError> {
    let connection = connect(cluster)?;
    let pools = connection.list_pools().context(Storage {
        details: "list pools",
    })?;

    let mut result = Vec::new();
    for pool in pools {
        let context = open_context(&connection, &pool.name)?;
        let images = pool_images(&context)?;
        result.extend(images);
    }

    tracing::debug!("listed {} images", result.len());
    Ok(result)
}

/// Images of the pool of `context`, each opened read only to stat its size.
fn pool_images(context: &PoolContext) -> Result<Vec<BlockImage>, RestError> {
    let pool = context.pool().to_string();
    let names = context.image_names().context(Storage {
        details: format!("get image names from pool {}", pool),
    })?;

    let mut images = Vec::with_capacity(names.len());
    for name in names {
        let size = image_size(context, &name)?;
        images.push(BlockImage {
            name,
            pool_name: pool.clone(),
            size,
        });
    }
    Ok(images)
}

fn image_size(context: &PoolContext, name: &str) -> Result<u64, RestError> {
    let details =
        || format!("stat image {} from pool {}", name, context.pool());
    let image = context.open_image(name, true).context(Storage {
        details: details(),
    })?;
    let stat = image.stat().context(Storage {
        details: details(),
    })?;
    Ok(stat.size)
}

fn new_image(
    cluster: &dyn Cluster,
    request: &BlockImage,
) -> Result<String, RestError> {
    let connection = connect(cluster)?;
    let context = open_context(&connection, &request.pool_name)?;
    let created = context
        .create_image(&request.name, request.size, IMAGE_ORDER)
        .context(Storage {
            details: format!("create image {:?}", request),
        })?;

    let message = created_message(created.name());
    tracing::info!("{}", message);
    Ok(message)
}

fn remove_image(
    cluster: &dyn Cluster,
    request: &BlockImage,
) -> Result<String, RestError> {
    let connection = connect(cluster)?;
    let context = open_context(&connection, &request.pool_name)?;
    context.image(&request.name).remove().context(Storage {
        details: format!("delete image {:?}", request),
    })?;

    let message = deleted_message(&request.name);
    tracing::info!("{}", message);
    Ok(message)
}
