//! Integration tests for the annotation endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    add_object, annotate, body_json, create_image, create_label, delete, get, get_data, post_json,
    put_json,
};
use serde_json::json;

const FOX_SENTENCE: &str = "This is a fox, because it has orange fur.";

async fn fox_object(app: &axum::Router) -> (i64, i64) {
    let fox = create_label(app, "fox").await;
    let image = create_image(app, "fox.jpg").await;
    (fox, add_object(app, image, fox).await)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_annotation_is_assembled_and_stored() {
    let app = common::build_test_app();
    let (_, object_id) = fox_object(&app).await;

    let annotation = annotate(&app, object_id, FOX_SENTENCE).await;

    assert_eq!(annotation["objectId"], object_id);
    assert_eq!(annotation["text"], "This is a fox, because it has orange fur");
    assert_eq!(
        annotation["tokens"],
        json!(["this", "is", "a", "fox", ",", "because", "it", "has", "orange", "fur"])
    );
    // The label mention is marked with the label's cell; "orange fur" is concept 0.
    assert_eq!(
        annotation["conceptMask"],
        json!([-1, -1, -1, -2, -1, -1, -1, -1, 0, 0])
    );
    assert_eq!(annotation["conceptIds"].as_array().unwrap().len(), 1);

    let concept_id = annotation["conceptIds"][0].as_i64().unwrap();
    let concept = get_data(&app, &format!("/api/v1/concepts/{concept_id}")).await;
    assert_eq!(concept["surfaces"], json!(["orange", "fur"]));
    assert_eq!(concept["nounCount"], 1);

    let key = concept["key"].as_str().unwrap().to_string();
    let by_key = get_data(&app, &format!("/api/v1/concepts/key/{key}")).await;
    assert_eq!(by_key["id"], concept_id);
}

#[tokio::test]
async fn batch_insert_skips_invalid_lines_when_asked() {
    let app = common::build_test_app();
    let (_, object_id) = fox_object(&app).await;
    let texts = json!(["blue beak", " ", "long tail"]);

    let response = post_json(
        &app,
        "/api/v1/annotation",
        json!({ "objectId": object_id, "annotations": texts }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = post_json(
        &app,
        "/api/v1/annotation",
        json!({ "objectId": object_id, "annotations": texts, "skipInvalid": true, "createdBy": 9 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await["data"].clone();
    let created = created.as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["text"], "blue beak");
    assert_eq!(created[1]["text"], "long tail");
    assert_eq!(created[1]["createdBy"], 9);
}

#[tokio::test]
async fn create_requires_exactly_one_text_field() {
    let app = common::build_test_app();
    let (_, object_id) = fox_object(&app).await;

    for body in [
        json!({ "objectId": object_id }),
        json!({ "objectId": object_id, "annotation": "red fur", "annotations": ["red fur"] }),
    ] {
        let response = post_json(&app, "/api/v1/annotation", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    let response = post_json(
        &app,
        "/api/v1/annotation",
        json!({ "objectId": 999, "annotation": "red fur" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Preprocess
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preprocess_returns_concepts_without_writing() {
    let app = common::build_test_app();
    let (fox, _) = fox_object(&app).await;

    let uri = format!("/api/v1/annotation/preprocess?annotation=orange%20fur&labelId={fox}");
    let pre = get_data(&app, &uri).await;

    assert_eq!(pre["tokens"], json!(["orange", "fur"]));
    assert_eq!(pre["conceptMask"], json!([0, 0]));
    assert_eq!(pre["concepts"][0]["surfaces"], json!(["orange", "fur"]));
    assert_eq!(get(&app, "/api/v1/annotation/1").await.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/api/v1/annotation/preprocess?annotation=fur&labelId=404").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Range updates, fetch and delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn range_update_marks_a_new_concept_or_returns_null() {
    let app = common::build_test_app();
    let (_, object_id) = fox_object(&app).await;
    let annotation = annotate(&app, object_id, FOX_SENTENCE).await;
    let id = annotation["id"].as_i64().unwrap();

    let response = put_json(
        &app,
        "/api/v1/annotation",
        json!({ "annoId": id, "tokenStart": 3, "tokenEnd": 4 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert_eq!(
        updated["conceptMask"],
        json!([-1, -1, -1, 0, -1, -1, -1, -1, 1, 1])
    );
    assert_eq!(updated["conceptIds"][1], annotation["conceptIds"][0]);

    // "because" holds no noun phrase; nothing is written.
    let response = put_json(
        &app,
        "/api/v1/annotation",
        json!({ "annoId": id, "tokenStart": 5, "tokenEnd": 6 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"].is_null());
    assert_eq!(get_data(&app, &format!("/api/v1/annotation/{id}")).await, updated);

    let response = put_json(
        &app,
        "/api/v1/annotation",
        json!({ "annoId": id, "tokenStart": 9, "tokenEnd": 11 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_the_annotation() {
    let app = common::build_test_app();
    let (_, object_id) = fox_object(&app).await;
    let id = annotate(&app, object_id, "orange fur").await["id"].as_i64().unwrap();

    let uri = format!("/api/v1/annotation/{id}");
    assert_eq!(delete(&app, &uri).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(get(&app, &uri).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(delete(&app, &uri).await.status(), StatusCode::NOT_FOUND);
}
