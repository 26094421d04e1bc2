#![allow(dead_code)]

mod media;

use std::net::SocketAddr;
use std::sync::Arc;

use blogsphere::{
    config::{Config, RateLimits},
    db_helpers::create_admin_in_db,
    init_db, make_router,
    media::MediaStore,
    AppState, NewUser,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::TcpListener;

pub use media::InMemoryMediaStore;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub pool: SqlitePool,
    pub media: Arc<InMemoryMediaStore>,
}

/// An in-memory database and budgets no test run gets near.
pub fn test_config() -> Config {
    let mut config = Config::new("sqlite::memory:", "integration-test-secret");
    config.rate_limits = RateLimits::new(10_000, 10_000, 900);
    config
}

/// Serves the full router on a random local port over a fresh in-memory
/// database.
pub async fn spawn_app() -> TestApp {
    let media = Arc::new(InMemoryMediaStore::new());
    spawn_app_with(test_config(), media.clone()).await.with_media(media)
}

/// Like [`spawn_app`] with a caller-chosen config and media store.
pub async fn spawn_app_with(config: Config, store: Arc<dyn MediaStore>) -> TestApp {
    let pool = init_db(&config.database_url).await.expect("database starts");
    let state = Arc::new(AppState::new(pool.clone(), config, store));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("port is free");
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let service = make_router(state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        pool,
        media: Arc::new(InMemoryMediaStore::new()),
    }
}

impl TestApp {
    fn with_media(mut self, media: Arc<InMemoryMediaStore>) -> Self {
        self.media = media;
        self
    }

    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.address, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and returns the status with the decoded body.
    pub async fn send(&self, builder: RequestBuilder) -> (StatusCode, Value) {
        let response = builder.send().await.expect("request is sent");
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.request(Method::GET, path, None)).await
    }

    pub async fn get_as(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.request(Method::GET, path, Some(token))).await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(self.request(Method::POST, path, token).json(&body))
            .await
    }

    pub async fn put_json(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.request(Method::PUT, path, Some(token)).json(&body))
            .await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.request(Method::DELETE, path, Some(token)))
            .await
    }

    /// Registers a user and returns `(token, user id)`.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> (String, i64) {
        let (status, body) = self
            .post_json(
                "/api/auth/register",
                None,
                json!({"username": username, "email": email, "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_owned(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post_json(
            "/api/auth/login",
            None,
            json!({"email": email, "password": password}),
        )
        .await
    }

    /// Creates the admin account directly and logs in as it.
    pub async fn admin_token(&self) -> String {
        let admin = NewUser {
            username: "admin".to_owned(),
            email: "admin@example.com".to_owned(),
            password: "admin-password".to_owned(),
        };
        create_admin_in_db(&self.pool, admin).await.unwrap();
        let (status, body) = self.login("admin@example.com", "admin-password").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_owned()
    }

    pub async fn create_category(&self, admin_token: &str, name: &str) -> i64 {
        let (status, body) = self
            .post_json("/api/categories", Some(admin_token), json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["category"]["id"].as_i64().unwrap()
    }

    /// Creates a post from JSON and returns its id.
    pub async fn create_post(&self, token: &str, body: Value) -> i64 {
        let (status, body) = self.post_json("/api/posts", Some(token), body).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["post"]["id"].as_i64().unwrap()
    }
}
