use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use photo_gateway::{
    AppState, app,
    services::{
        file_service::FileService,
        key_scheme::PublicUrls,
        token_service::{TokenService, TokenValidator},
    },
    store::MemoryObjectStore,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "gateway-test-boundary";
const LIMIT: usize = 1024 * 1024;

fn images() -> Vec<String> {
    vec![".png".into(), ".jpg".into(), ".jpeg".into()]
}

fn router_with(store: Arc<MemoryObjectStore>, auth: Option<TokenService>, limit: usize) -> Router {
    let files = FileService::new(store, PublicUrls::new("mybucket", "s3.timeweb.cloud"), images());
    let auth = auth.map(|svc| Arc::new(svc) as Arc<dyn TokenValidator>);
    app(AppState { files, auth }, limit)
}

fn router(store: Arc<MemoryObjectStore>) -> Router {
    router_with(store, None, LIMIT)
}

enum Section<'a> {
    File(&'a str, &'a [u8]),
    Field(&'a str, &'a str),
}

fn multipart_body(sections: &[Section<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for section in sections {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match section {
            Section::File(name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Section::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(id: &str, sections: &[Section<'_>]) -> Request<Body> {
    let body = multipart_body(sections);
    Request::builder()
        .method("POST")
        .uri(format!("/upload/{id}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn upload_returns_public_urls_for_each_file() {
    let store = Arc::new(MemoryObjectStore::new());
    let (status, body) = send(
        router(store.clone()),
        upload_request(
            "42",
            &[
                Section::File("cat.jpg", b"jpeg-bytes"),
                Section::Field("caption", "ignored"),
                Section::File("dog.png", b"png-bytes"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let urls = body["urls"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    assert!(
        urls[0]
            .as_str()
            .unwrap()
            .starts_with("https://mybucket.s3.timeweb.cloud/photos/42/")
    );
    assert!(urls[0].as_str().unwrap().ends_with(".jpg"));
    assert!(urls[1].as_str().unwrap().ends_with(".png"));

    let keys = store.keys().await;
    assert_eq!(keys.len(), 2);
    for key in &keys {
        assert!(key.starts_with("photos/42/"));
    }
}

#[tokio::test]
async fn upload_sets_request_id_header() {
    let store = Arc::new(MemoryObjectStore::new());
    let res = router(store)
        .oneshot(upload_request("1", &[Section::File("a.png", b"x")]))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn upload_without_files_is_bad_request() {
    let store = Arc::new(MemoryObjectStore::new());
    let (status, body) = send(
        router(store.clone()),
        upload_request("42", &[Section::Field("caption", "hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn upload_with_wrong_content_type_is_bad_request() {
    let store = Arc::new(MemoryObjectStore::new());
    let req = Request::builder()
        .method("POST")
        .uri("/upload/42")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(router(store), req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "multipart_data");
}

#[tokio::test]
async fn upload_with_disallowed_extension_is_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let (status, body) = send(
        router(store.clone()),
        upload_request("42", &[Section::File("payload.exe", b"MZ")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "file");
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected_before_reaching_the_store() {
    let store = Arc::new(MemoryObjectStore::new());
    let app = router_with(store.clone(), None, 64);
    let res = app
        .oneshot(upload_request("42", &[Section::File("big.png", &[0u8; 512])]))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn oversized_streamed_body_is_payload_too_large() {
    let store = Arc::new(MemoryObjectStore::new());
    let app = router_with(store.clone(), None, 64);
    let body = multipart_body(&[Section::File("big.png", &[7u8; 4096])]);
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(512)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let req = Request::builder()
        .method("POST")
        .uri("/upload/42")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap();

    let (status, body) = send(app, req).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], 413);
    assert_eq!(body["details"][0]["field"], "multipart_data");
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn invalid_utf8_path_segment_names_the_parameter() {
    let store = Arc::new(MemoryObjectStore::new());

    let (status, body) = send(router(store.clone()), request("DELETE", "/upload/%FF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["details"][0]["field"], "id");

    let (status, body) = send(router(store), request("DELETE", "/upload/42/%FF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "sub_id");
}

#[tokio::test]
async fn encoded_slash_in_id_is_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let (status, body) = send(
        router(store),
        upload_request("..%2F7", &[Section::File("a.png", b"x")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "id");
}

#[tokio::test]
async fn delete_entity_removes_files_then_reports_not_found() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("photos/42/a.jpg", "a", "image/jpeg").await;
    store.insert("photos/42/b.png", "b", "image/png").await;
    store.insert("photos/43/c.png", "c", "image/png").await;

    let (status, body) = send(router(store.clone()), request("DELETE", "/upload/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "all files deleted");
    assert_eq!(store.keys().await, vec!["photos/43/c.png"]);

    let (status, body) = send(router(store), request("DELETE", "/upload/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn delete_by_sub_id_returns_deleted_keys() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("photos/42/abc-1.jpg", "1", "image/jpeg").await;
    store.insert("photos/42/abd-2.jpg", "2", "image/jpeg").await;

    let (status, body) = send(router(store.clone()), request("DELETE", "/upload/42/abc")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "file(s) deleted by sub-id");
    assert_eq!(body["keys"], serde_json::json!(["photos/42/abc-1.jpg"]));
    assert_eq!(store.keys().await, vec!["photos/42/abd-2.jpg"]);
}

#[tokio::test]
async fn failed_delete_surfaces_store_error() {
    let store = Arc::new(MemoryObjectStore::new().fail_delete_at(1));
    store.insert("photos/42/a.jpg", "a", "image/jpeg").await;

    let (status, body) = send(router(store.clone()), request("DELETE", "/upload/42")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("injected delete failure"));
    assert_eq!(store.keys().await, vec!["photos/42/a.jpg"]);
}

#[tokio::test]
async fn objects_lists_every_url() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("photos/1/a.jpg", "a", "image/jpeg").await;
    store.insert("photos/2/b.jpg", "b", "image/jpeg").await;

    let (status, body) = send(router(store), request("GET", "/objects")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["files"],
        serde_json::json!([
            "https://mybucket.s3.timeweb.cloud/photos/1/a.jpg",
            "https://mybucket.s3.timeweb.cloud/photos/2/b.jpg"
        ])
    );
}

#[tokio::test]
async fn objects_on_empty_bucket_is_an_empty_list() {
    let (status, body) = send(
        router(Arc::new(MemoryObjectStore::new())),
        request("GET", "/objects"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"], serde_json::json!([]));
}

#[tokio::test]
async fn folder_exists_covers_missing_absent_and_present() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("photos/42/a.jpg", "a", "image/jpeg").await;

    let (status, body) = send(router(store.clone()), request("GET", "/objects/exists")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "folder");

    let (status, _) = send(
        router(store.clone()),
        request("GET", "/objects/exists?folder=photos/7"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        router(store),
        request("GET", "/objects/exists?folder=photos/42"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folder"], "photos/42/");
    assert_eq!(body["exists"], true);
    assert_eq!(
        body["files"],
        serde_json::json!(["https://mybucket.s3.timeweb.cloud/photos/42/a.jpg"])
    );
}

#[tokio::test]
async fn health_probes_answer_ok() {
    let store = Arc::new(MemoryObjectStore::new());

    let (status, body) = send(router(store.clone()), request("GET", "/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(router(store), request("GET", "/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["object_store"]["ok"], true);
}

#[tokio::test]
async fn file_routes_require_a_token_when_auth_is_enabled() {
    let store = Arc::new(MemoryObjectStore::new());
    let tokens = TokenService::new("integration-secret");
    let token = tokens
        .generate_access_token(9, chrono::Duration::minutes(5))
        .unwrap();
    let app = router_with(store.clone(), Some(tokens), LIMIT);

    let (status, body) = send(app.clone(), request("GET", "/objects")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = send(app.clone(), request("GET", "/healthz")).await;
    assert_eq!(status, StatusCode::OK);

    let mut req = upload_request("42", &[Section::File("a.png", b"x")]);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urls"].as_array().unwrap().len(), 1);
    assert_eq!(store.keys().await.len(), 1);
}
