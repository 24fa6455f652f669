//! Commands and button actions over HTTP.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use serde_json::json;
use stampline_core::genre::Genre;
use stampline_core::status::SetStatus;
use stampline_core::trigger::{
    ACTION_APPROVE_SAMPLES, ACTION_NO_REFERENCE, ACTION_SELECT_GENRE,
};
use stampline_db::repositories::{SetFilter, StampSetRepo};

#[tokio::test]
async fn new_command_creates_a_set() {
    let app = common::build_test_app().await;

    let response = post_json(&app.router, "/api/v1/commands", json!({ "text": "new Lucky Cat" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    let data = &body_json(response).await["data"];
    assert!(data["text"].as_str().unwrap().contains("Lucky Cat"));
    assert!(data["blocks"].is_array());

    let sets = StampSetRepo::list(&app.pool, &SetFilter::default()).await.unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].set.name, "Lucky Cat");
    assert_eq!(sets[0].set.status, SetStatus::DirectionPending);
}

#[tokio::test]
async fn help_command_returns_usage() {
    let app = common::build_test_app().await;

    let response = post_json(&app.router, "/api/v1/commands", json!({ "text": "help" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_json(response).await["data"]["text"].as_str().unwrap().to_string();
    assert!(text.contains("new"));
    assert!(text.contains("list"));
}

#[tokio::test]
async fn actions_drive_the_direction_stage() {
    let app = common::build_test_app().await;
    let set = app.engine.create_set("Cat", Genre::Animal).await.unwrap();

    let response = post_json(
        &app.router,
        "/api/v1/actions",
        json!({ "action_id": ACTION_SELECT_GENRE, "value": format!("{}:concept", set.id) }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app.router,
        "/api/v1/actions",
        json!({ "action_id": ACTION_NO_REFERENCE, "value": set.id.to_string() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.settle(set.id).await;

    let stored = StampSetRepo::find_by_id(&app.pool, set.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.genre, Genre::Concept);
    assert!(!stored.character_consistency);
    assert_eq!(stored.proposals().len(), 1);
}

#[tokio::test]
async fn malformed_action_value_is_400() {
    let app = common::build_test_app().await;

    let response = post_json(
        &app.router,
        "/api/v1/actions",
        json!({ "action_id": ACTION_APPROVE_SAMPLES, "value": "abc" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn out_of_order_action_is_409() {
    let app = common::build_test_app().await;
    let set = app.engine.create_set("Cat", Genre::Animal).await.unwrap();

    let response = post_json(
        &app.router,
        "/api/v1/actions",
        json!({ "action_id": ACTION_APPROVE_SAMPLES, "value": set.id.to_string() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(app.status(set.id).await, SetStatus::DirectionPending);
}

#[tokio::test]
async fn action_on_missing_set_is_404() {
    let app = common::build_test_app().await;

    let response = post_json(
        &app.router,
        "/api/v1/actions",
        json!({ "action_id": ACTION_APPROVE_SAMPLES, "value": "404" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
