//! Practice provisioning and help center administration

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use helpers::{signed_request, uuid_field, PracticeCreds, TestApp};

fn public_get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_admin_routes_hidden_without_token() {
    let app = TestApp::builder().without_admin().build().await;

    let (status, _) = app
        .send(app.admin("POST", "/api/admin/practices", Some(json!({ "name": "New" }))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_rejects_wrong_token() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/practices")
        .header("x-admin-token", "guess")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "New" }).to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provisioned_practice_can_sign_requests() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(app.admin("POST", "/api/admin/practices", Some(json!({ "name": "Northside Therapy" }))))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let secret = body["shared_secret"].as_i64().unwrap();
    assert_ne!(secret, 0);

    let creds = PracticeCreds { id: uuid_field(&body, "id"), secret };
    let (status, practice) = app.send(signed_request(creds, None, "GET", "/api/practice", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(practice["name"], "Northside Therapy");
}

#[tokio::test]
async fn test_seeded_guides_are_public() {
    let app = TestApp::new().await;

    let (status, guides) = app.send(public_get("/api/help-guides")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!guides.as_array().unwrap().is_empty());

    let (status, guide) = app.send(public_get("/api/help-guides/getting-started")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(guide["title"], "Getting started");
}

#[tokio::test]
async fn test_guide_upsert_and_unpublish() {
    let app = TestApp::new().await;
    let guide = json!({
        "title": "Exporting notes",
        "category": "notes",
        "body": "Use Export on a finalized note.",
    });

    let (status, _) = app
        .send(app.admin("PUT", "/api/admin/help-guides/exporting-notes", Some(guide.clone())))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(app.admin("PUT", "/api/admin/help-guides/exporting-notes", Some(guide)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, found) = app.send(public_get("/api/help-guides?category=notes&q=export")).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (status, _) = app
        .send(app.admin("DELETE", "/api/admin/help-guides/exporting-notes", None))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(public_get("/api/help-guides/exporting-notes")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(app.admin("PUT", "/api/admin/help-guides/Bad_Slug", Some(json!({
            "title": "x", "category": "x", "body": "x",
        }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
