use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use menulens::ai::{AiError, AiService, TextGeneration};
use menulens::db;
use menulens::http::{create_router, AppState};
use menulens::model::ExtractedItem;
use menulens::worker::WorkerPool;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Adapter fake that always succeeds with a fixed two-item menu.
#[derive(Clone)]
struct HappyAi;

#[async_trait]
impl AiService for HappyAi {
    async fn extract_items(&self, _image: &[u8]) -> Result<Vec<ExtractedItem>, AiError> {
        Ok(vec![
            ExtractedItem {
                item_text: "Burger".into(),
                item_price: Some("$9".into()),
            },
            ExtractedItem {
                item_text: "Fries".into(),
                item_price: Some("$3".into()),
            },
        ])
    }

    async fn generate_text(&self, _prompt: &str) -> Result<TextGeneration, AiError> {
        Ok(TextGeneration {
            description: "Freshly made.".into(),
            estimated_calories: 450,
        })
    }

    async fn generate_image(&self, _prompt: &str) -> Result<Vec<u8>, AiError> {
        Ok(vec![1, 2, 3, 4])
    }
}

async fn setup_app(max_upload_bytes: usize) -> (Router, db::Pool, WorkerPool) {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let workers = WorkerPool::spawn(pool.clone(), Arc::new(HappyAi), 2, 2);
    let state = AppState {
        pool: pool.clone(),
        queue: workers.queue(),
        max_upload_bytes,
    };
    (create_router(state), pool, workers)
}

fn multipart_request(field_name: &str, data: &[u8]) -> Request<Body> {
    let boundary = "menulens-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
             filename=\"menu.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/menus")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _pool, _workers) = setup_app(1024).await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unknown_menu_is_not_found() {
    let (app, _pool, _workers) = setup_app(1024).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/menus/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Menu not found");

    // A non-UUID path segment is just an unknown menu.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/menus/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_then_poll_returns_enriched_items() {
    let (app, _pool, _workers) = setup_app(1024 * 1024).await;

    let response = app
        .clone()
        .oneshot(multipart_request("image", b"fake-jpeg-bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    let menu_id = body["menu_id"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let menu = loop {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/menus/{menu_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let menu = json_body(response).await;
        match menu["status"].as_str().unwrap() {
            "COMPLETED" | "FAILED" => break menu,
            _ => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "menu never reached a terminal state"
                );
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    };

    assert_eq!(menu["status"], "COMPLETED");
    assert!(menu.get("error").is_none());
    let items = menu["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        assert_eq!(item["description"], "Freshly made.");
        assert_eq!(item["estimated_calories"], 450);
        assert_eq!(item["generated_image_data"], "AQIDBA==");
        assert!(item.get("generation_prompt").is_none());
    }
    assert_eq!(items[0]["item_text"], "Burger");
    assert_eq!(items[0]["item_price"], "$9");
}

#[tokio::test]
async fn upload_without_image_field_is_rejected() {
    let (app, pool, _workers) = setup_app(1024).await;

    let response = app
        .oneshot(multipart_request("attachment", b"bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No image file provided");

    // No job record was created for the rejected upload.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, pool, _workers) = setup_app(8).await;

    let response = app.oneshot(multipart_request("image", &[0u8; 64])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn regenerate_unknown_item_is_not_found() {
    let (app, _pool, _workers) = setup_app(1024).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/menu-items/{}/regenerate", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Menu item not found");
}
