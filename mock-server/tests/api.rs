use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with, MockConfig, MockState};
use serde_json::{json, Value};
use tower::ServiceExt;

const BASIC: &str = "Basic VVNFUjpQQVNT";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, BASIC)
        .header(http::header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    request("GET", uri, "")
}

fn paged(page_size: usize) -> (MockState, Router) {
    let state = MockState::new(MockConfig {
        page_size,
        ..MockConfig::default()
    });
    (state.clone(), app_with(state))
}

async fn create(app: &Router, uri: &str, body: Value) -> u64 {
    let resp = app
        .clone()
        .oneshot(request("POST", uri, &body.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await["id"].as_u64().unwrap()
}

// --- authentication ---

#[tokio::test]
async fn missing_credentials_is_plain_403() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/index.php/api/v4/projects.json")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(&body_bytes(resp).await[..], b"Forbidden");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/index.php/api/v4/users/me.json")
                .header(http::header::AUTHORIZATION, "Basic VVNFUjp3cm9uZw==")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// --- routing ---

#[tokio::test]
async fn unknown_resource_is_plain_404() {
    let resp = app()
        .oneshot(get("/index.php/api/v4/nothing/here.json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(&body_bytes(resp).await[..], b"Not Found");
}

#[tokio::test]
async fn unknown_api_version_is_404() {
    let resp = app()
        .oneshot(get("/index.php/api/v9/projects.json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn files_only_exist_in_v5() {
    let state = MockState::new(MockConfig::default());
    let file = state.seed("files", json!({"filename": "a.txt"})).await.unwrap();

    let resp = app_with(state.clone())
        .oneshot(get(&format!("/index.php/api/v4/files/{file}.json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app_with(state)
        .oneshot(get(&format!("/index.php/api/v5/files/{file}.json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["filename"], "a.txt");
}

// --- pagination ---

#[tokio::test]
async fn collection_pages_carry_next_link() {
    let (_, app) = paged(3);
    for n in 0..5 {
        create(&app, "/index.php/api/v4/projects.json", json!({"name": format!("p{n}")})).await;
    }

    let resp = app
        .clone()
        .oneshot(get("/index.php/api/v4/projects.json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let link = resp.headers()[http::header::LINK].to_str().unwrap().to_string();
    assert_eq!(
        link,
        "<http://localhost/index.php/api/v4/projects/page/2.json>; rel=\"next\""
    );
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 3);

    let resp = app
        .oneshot(get("/index.php/api/v4/projects/page/2.json"))
        .await
        .unwrap();
    assert!(resp.headers().get(http::header::LINK).is_none());
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn full_last_page_has_no_link() {
    let (_, app) = paged(2);
    for n in 0..4 {
        create(&app, "/index.php/api/v4/groups.json", json!({"name": format!("g{n}")})).await;
    }

    let resp = app
        .oneshot(get("/index.php/api/v4/groups/page/2.json"))
        .await
        .unwrap();
    assert!(resp.headers().get(http::header::LINK).is_none());
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn search_decodes_term() {
    let (_, app) = paged(20);
    create(&app, "/index.php/api/v4/passwords.json", json!({"name": "Mail Server"})).await;
    create(&app, "/index.php/api/v4/passwords.json", json!({"name": "Router"})).await;

    let resp = app
        .oneshot(get("/index.php/api/v4/passwords/search/mail+server.json"))
        .await
        .unwrap();
    let found = body_json(resp).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["name"], "Mail Server");
}

// --- writes ---

#[tokio::test]
async fn create_requires_name() {
    let resp = app()
        .oneshot(request("POST", "/index.php/api/v4/projects.json", r#"{"notes":"x"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "The name field is required");
}

#[tokio::test]
async fn update_missing_row_is_404() {
    let resp = app()
        .oneshot(request("PUT", "/index.php/api/v4/projects/99.json", r#"{"name":"x"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn locked_password_needs_reason() {
    let (_, app) = paged(20);
    let id = create(&app, "/index.php/api/v4/passwords.json", json!({"name": "Vault"})).await;
    let resp = app
        .clone()
        .oneshot(request("PUT", &format!("/index.php/api/v4/passwords/{id}/lock.json"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(get(&format!("/index.php/api/v4/passwords/{id}.json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], true);

    let mut with_reason = get(&format!("/index.php/api/v4/passwords/{id}.json"));
    with_reason
        .headers_mut()
        .insert("x-unlock-reason", http::HeaderValue::from_static("audit"));
    let resp = app.oneshot(with_reason).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["name"], "Vault");
}

#[tokio::test]
async fn group_membership() {
    let (_, app) = paged(20);
    let group = create(&app, "/index.php/api/v4/groups.json", json!({"name": "Ops"})).await;

    let resp = app
        .clone()
        .oneshot(request("PUT", &format!("/index.php/api/v4/groups/{group}/add_user/1.json"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app
        .clone()
        .oneshot(get(&format!("/index.php/api/v4/groups/{group}.json")))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["users"], json!([1]));

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/index.php/api/v4/groups/{group}/delete_user/1.json"),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app
        .oneshot(get(&format!("/index.php/api/v4/groups/{group}.json")))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["users"], json!([]));
}

#[tokio::test]
async fn favorites_follow_their_rows() {
    let (_, app) = paged(20);
    let id = create(&app, "/index.php/api/v4/projects.json", json!({"name": "Fav"})).await;
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/index.php/api/v4/favorite_project/{id}.json"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(get("/index.php/api/v4/projects/favorite.json"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/index.php/api/v4/projects/{id}.json"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app
        .oneshot(get("/index.php/api/v4/projects/favorite.json"))
        .await
        .unwrap();
    assert!(body_json(resp).await.as_array().unwrap().is_empty());
}

// --- diagnostics ---

#[tokio::test]
async fn injected_failures_then_recovery() {
    let state = MockState::new(MockConfig::default());
    state.fail_next(1).await;

    let resp = app_with(state.clone())
        .oneshot(get("/index.php/api/v4/version.json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(serde_json::from_slice::<Value>(&body_bytes(resp).await).is_err());

    let resp = app_with(state.clone())
        .oneshot(get("/index.php/api/v4/version.json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["api_version"], "v4");

    let recorded = state.requests().await;
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].header("authorization"), Some(BASIC));
}
