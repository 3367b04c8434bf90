//! Integration tests for projects, weighted work fetch and progress.

mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use common::{
    add_object, annotate, body_json, create_image, create_label, get, get_data, post_data,
    post_json,
};
use serde_json::json;

/// A project of three images, each holding one unannotated fox object.
struct Fixture {
    project: i64,
    fox: i64,
    images: Vec<i64>,
    objects: Vec<i64>,
}

async fn project_of_three(app: &axum::Router) -> Fixture {
    let fox = create_label(app, "fox").await;
    let mut images = Vec::new();
    let mut objects = Vec::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        let image = create_image(app, name).await;
        objects.push(add_object(app, image, fox).await);
        images.push(image);
    }
    let project = post_data(app, "/api/v1/projects", json!({ "name": "foxes" }), StatusCode::CREATED)
        .await["id"]
        .as_i64()
        .unwrap();
    let added = post_data(
        app,
        &format!("/api/v1/projects/{project}/images"),
        json!({ "imageIds": images }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(added["added"], 3);
    Fixture {
        project,
        fox,
        images,
        objects,
    }
}

fn ids(value: &serde_json::Value) -> Vec<i64> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// randfetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn randfetch_returns_distinct_member_images() {
    let app = common::build_test_app();
    let Fixture { project, images, .. } = project_of_three(&app).await;

    let picked = ids(&get_data(&app, &format!("/api/v1/project/{project}/randfetch/2")).await);
    assert_eq!(picked.len(), 2);
    let unique: HashSet<i64> = picked.iter().copied().collect();
    assert_eq!(unique.len(), 2);
    assert!(picked.iter().all(|id| images.contains(id)));

    // Asking for at least the project size returns every member.
    let all = ids(&get_data(&app, &format!("/api/v1/project/{project}/randfetch/5")).await);
    assert_eq!(all, images);
}

#[tokio::test]
async fn randfetch_validates_n_and_project() {
    let app = common::build_test_app();
    let Fixture { project, .. } = project_of_three(&app).await;

    for n in [0, 11] {
        let response = get(&app, &format!("/api/v1/project/{project}/randfetch/{n}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "n = {n}");
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    let response = get(&app, "/api/v1/project/999/randfetch/1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn worker_history_is_excluded_from_candidates() {
    let app = common::build_test_app();
    let Fixture { project, images, .. } = project_of_three(&app).await;

    for &doc in &images[..2] {
        let entry = post_data(
            &app,
            &format!("/api/v1/project/{project}/work"),
            json!({ "workerId": 7, "docId": doc }),
            StatusCode::OK,
        )
        .await;
        assert_eq!(entry["isFinished"], false);
    }

    let picked = ids(
        &get_data(&app, &format!("/api/v1/project/{project}/randfetch/1?workerId=7")).await,
    );
    assert_eq!(picked, vec![images[2]]);
}

#[tokio::test]
async fn work_on_foreign_image_is_rejected() {
    let app = common::build_test_app();
    let Fixture { project, .. } = project_of_three(&app).await;
    let outsider = create_image(&app, "z.jpg").await;

    let response = post_json(
        &app,
        &format!("/api/v1/project/{project}/work"),
        json!({ "workerId": 7, "docId": outsider, "isFinished": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Priority and progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn annotating_an_object_lowers_priority_and_raises_progress() {
    let app = common::build_test_app();
    let Fixture {
        project,
        images,
        objects,
        ..
    } = project_of_three(&app).await;

    let progress = get_data(&app, &format!("/api/v1/project/{project}/progress")).await;
    assert_eq!(progress["numDocs"], 3);
    assert_eq!(progress["totalPrio"], 3.0);
    assert_eq!(progress["progress"], 0.0);

    annotate(&app, objects[0], "orange fur").await;

    let priority = get_data(&app, &format!("/api/v1/images/{}/priority?force=true", images[0])).await;
    assert_eq!(priority["imageId"], images[0]);
    assert_eq!(priority["priority"], 0.0);

    let progress = get_data(&app, &format!("/api/v1/project/{project}/progress?force=true")).await;
    assert_eq!(progress["totalPrio"], 2.0);
    let value = progress["progress"].as_f64().unwrap();
    assert!((value - 1.0 / 3.0).abs() < 1e-9);

    let response = get(&app, "/api/v1/images/999/priority").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_object_restores_full_priority() {
    let app = common::build_test_app();
    let Fixture {
        fox,
        images,
        objects,
        ..
    } = project_of_three(&app).await;
    add_object(&app, images[0], fox).await;
    annotate(&app, objects[0], "orange fur").await;

    let uri = format!("/api/v1/images/{}/priority?force=true", images[0]);
    assert_eq!(get_data(&app, &uri).await["priority"], 0.5);

    let response = common::delete(&app, &format!("/api/v1/objects/{}", objects[0])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(get_data(&app, &uri).await["priority"], 1.0);

    let response = common::delete(&app, &format!("/api/v1/objects/{}", objects[0])).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn project_images_and_objects_are_readable() {
    let app = common::build_test_app();
    let Fixture {
        project,
        fox,
        images,
        objects,
    } = project_of_three(&app).await;

    let members = ids(&get_data(&app, &format!("/api/v1/projects/{project}/images")).await);
    assert_eq!(members, images);

    let object = get_data(&app, &format!("/api/v1/objects/{}", objects[1])).await;
    assert_eq!(object["imageId"], images[1]);
    assert_eq!(object["labelId"], fox);

    let response = get(&app, "/api/v1/projects/999/images").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
