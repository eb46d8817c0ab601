use actix_web::{http::StatusCode, test, web, App, HttpResponse};
use rest_client::{versions::v0::*, ActixRestClient, ClientError};

// Stand-in for the service, answering the way the image handlers do.
async fn list_images() -> HttpResponse {
    HttpResponse::Ok().json(vec![
        BlockImage::new("a", "rbd", 1024),
        BlockImage::new("b", "data", 2048),
    ])
}
async fn create_image(image: web::Json<BlockImage>) -> HttpResponse {
    if image.size == 0 {
        return HttpResponse::BadRequest().finish();
    }
    HttpResponse::Ok().body(created_message(&image.name))
}
async fn delete_image(image: web::Json<BlockImage>) -> HttpResponse {
    if image.name == "missing" {
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok().body(deleted_message(&image.name))
}

fn server() -> test::TestServer {
    test::start(|| {
        App::new()
            .route(IMAGE_URN, web::get().to(list_images))
            .route(IMAGE_URN, web::post().to(create_image))
            .route(IMAGE_REMOVE_URN, web::post().to(delete_image))
    })
}

#[actix_rt::test]
async fn client() {
    let srv = server();
    let client = ActixRestClient::new(&srv.url("/"), false).unwrap().v0();

    let images = client.get_images().await.unwrap();
    assert_eq!(
        images,
        vec![
            BlockImage::new("a", "rbd", 1024),
            BlockImage::new("b", "data", 2048)
        ]
    );

    let message = client
        .create_image(&BlockImage::new("img1", "rbd", 1048576))
        .await
        .unwrap();
    assert_eq!(message, "succeeded created image img1");

    let message = client
        .delete_image(&BlockImage::new("img1", "rbd", 0))
        .await
        .unwrap();
    assert_eq!(message, "succeeded deleting image img1");
}

#[actix_rt::test]
async fn client_failures() {
    let srv = server();
    let client = ActixRestClient::new(&srv.url("/"), false).unwrap().v0();

    let error = client
        .create_image(&BlockImage::new("img1", "rbd", 0))
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::BAD_REQUEST));

    let error = client
        .delete_image(&BlockImage::new("missing", "rbd", 0))
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(matches!(error, ClientError::Status { .. }));
}

#[actix_rt::test]
async fn client_urls() {
    assert!(ActixRestClient::new("ftp://localhost:8080", false).is_err());
    assert!(ActixRestClient::new("https://localhost:8080", false).is_err());
    assert!(ActixRestClient::new("localhost", false).is_err());
    assert!(ActixRestClient::new("http://localhost:8080/", true).is_ok());
}
