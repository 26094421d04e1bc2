mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{spawn_app, TestApp};

/// A post owned by `writer`; returns the app, the admin and writer tokens
/// and the post id.
async fn setup() -> (TestApp, String, String, i64) {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (writer, _) = app.register("writer", "writer@example.com", "secret1").await;
    let category = app.create_category(&admin, "Tech").await;
    let post = app
        .create_post(
            &writer,
            json!({"title": "Discussed", "content": "Body", "category": category}),
        )
        .await;
    (app, admin, writer, post)
}

async fn add_comment(app: &TestApp, token: &str, post: i64, content: &str) -> i64 {
    let (status, body) = app
        .post_json(
            &format!("/api/comments/post/{post}"),
            Some(token),
            json!({ "content": content }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["comment"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn comments_are_trimmed_and_required() {
    let (app, _, writer, post) = setup().await;
    let path = format!("/api/comments/post/{post}");

    let (status, body) = app
        .post_json(&path, Some(&writer), json!({"content": "   "}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Comment content is required");

    let (status, body) = app
        .post_json(&path, Some(&writer), json!({"content": "  Great read  "}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["comment"]["content"], "Great read");
    assert_eq!(body["comment"]["author"]["username"], "writer");
    assert_eq!(body["comment"]["post"], post);

    let (status, _) = app
        .post_json("/api/comments/post/999", Some(&writer), json!({"content": "hi"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post_json(&path, None, json!({"content": "hi"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_author_cannot_change_a_comment() {
    let (app, _, writer, post) = setup().await;
    let (intruder, _) = app.register("intruder", "intruder@example.com", "secret1").await;
    let id = add_comment(&app, &writer, post, "original").await;
    let path = format!("/api/comments/{id}");

    let (status, body) = app.put_json(&path, &intruder, json!({"content": "defaced"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized to update this comment");

    let (status, _) = app.delete(&path, &intruder).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comment"]["content"], "original");
}

#[tokio::test]
async fn non_author_is_forbidden_even_with_an_empty_comment() {
    let (app, _, writer, post) = setup().await;
    let (intruder, _) = app.register("intruder", "intruder@example.com", "secret1").await;
    let id = add_comment(&app, &writer, post, "original").await;
    let path = format!("/api/comments/{id}");

    let (status, body) = app.put_json(&path, &intruder, json!({"content": "  "})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized to update this comment");

    let (status, body) = app.put_json(&path, &writer, json!({"content": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Comment content is required");
}

#[tokio::test]
async fn author_and_admin_can_change_a_comment() {
    let (app, admin, writer, post) = setup().await;
    let id = add_comment(&app, &writer, post, "first draft").await;
    let path = format!("/api/comments/{id}");

    let (status, body) = app.put_json(&path, &writer, json!({"content": "edited"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comment"]["content"], "edited");
    assert_eq!(body["message"], "Comment updated successfully");

    let (status, _) = app.delete(&path, &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get(&path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Comment not found");
}

#[tokio::test]
async fn single_comment_carries_a_post_summary() {
    let (app, _, writer, post) = setup().await;
    let id = add_comment(&app, &writer, post, "hello").await;

    let (status, body) = app.get(&format!("/api/comments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["comment"]["post"],
        json!({"id": post, "title": "Discussed", "slug": "discussed"})
    );

    let (status, body) = app.get("/api/comments/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid comment ID format");
}

#[tokio::test]
async fn post_comments_sort_and_paginate() {
    let (app, _, writer, post) = setup().await;
    for content in ["banana", "apple", "cherry"] {
        add_comment(&app, &writer, post, content).await;
    }
    let base = format!("/api/comments/post/{post}");

    let (status, body) = app.get(&base).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = body["comments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["cherry", "apple", "banana"]);

    let (_, body) = app
        .get(&format!("{base}?sortBy=content&order=asc&limit=2"))
        .await;
    let contents: Vec<&str> = body["comments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["apple", "banana"]);
    assert_eq!(body["pagination"]["totalCount"], 3);
    assert_eq!(body["pagination"]["hasNext"], true);

    let (status, _) = app.get(&format!("{base}?sortBy=password")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/comments/post/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_by_user_include_the_user() {
    let (app, _, writer, post) = setup().await;
    add_comment(&app, &writer, post, "one").await;
    add_comment(&app, &writer, post, "two").await;
    let (_, profile) = app.get_as("/api/auth/profile", &writer).await;
    let writer_id = profile["user"]["id"].as_i64().unwrap();

    let (status, body) = app.get(&format!("/api/comments/user/{writer_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "writer");
    assert_eq!(body["comments"][0]["content"], "two");
    assert_eq!(body["comments"][0]["post"]["slug"], "discussed");
    assert_eq!(body["pagination"]["totalCount"], 2);

    let (status, body) = app.get("/api/comments/user/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn deleting_a_post_removes_its_comments() {
    let (app, _, writer, post) = setup().await;
    let id = add_comment(&app, &writer, post, "soon gone").await;

    let (status, _) = app.delete(&format!("/api/posts/{post}"), &writer).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/comments/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
