use anyhow::{Context, Result};
use ::common::{ListTag, Role};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use server::api::jwt::AuthUser;
use server::db::models::Level;
use server::http_server::{build_router, AppState};
use server::reorder::NewLevel;

use super::test_database::TestDatabase;

const TEST_JWT_SECRET: &str = "test-secret";

/// The router served on an ephemeral port against a fresh database
pub struct TestServer {
    pub db: TestDatabase,
    pub state: AppState,
    pub base_url: String,
    pub client: reqwest::Client,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(test_name: &str) -> Result<Self> {
        let db = TestDatabase::new(test_name).await?;
        let state = AppState::new(db.pool.clone(), TEST_JWT_SECRET);
        Self::serve(db, state).await
    }

    /// Starts with `state` as built by the caller, e.g. with a mock verifier.
    pub async fn serve(db: TestDatabase, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_router(state.clone());

        let cancellation_token = CancellationToken::new();
        let shutdown = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                eprintln!("Test server error: {}", e);
            }
        });

        info!("Test server listening on {}", addr);

        Ok(Self {
            db,
            state,
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            cancellation_token,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Inserts a user directly and returns it with a valid bearer token.
    pub async fn create_user(&self, username: &str, role: Role) -> Result<(AuthUser, String)> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, 'unused', $2) RETURNING id",
        )
        .bind(username)
        .bind(role.as_str())
        .fetch_one(&self.db.pool)
        .await
        .context("Failed to insert test user")?;

        let token = self.state.jwt_manager.generate_token(id, username, role)?;
        let user = AuthUser {
            id,
            username: username.to_string(),
            role,
        };
        Ok((user, token))
    }

    /// Adds a level through the reorder engine.
    pub async fn seed_level(&self, list: ListTag, placement: i32, name: &str) -> Result<Level> {
        let data = NewLevel {
            name: name.to_string(),
            creator: "creator".to_string(),
            verifier: "verifier".to_string(),
            video_id: format!("video-{}", name),
            ..Default::default()
        };
        self.state
            .reorder
            .insert(list, placement, data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to seed level {}: {}", name, e))
    }

    /// `(name, placement)` for a list, ordered by placement
    pub async fn placements(&self, list: ListTag) -> Result<Vec<(String, i32)>> {
        let rows = sqlx::query_as("SELECT name, placement FROM levels WHERE list = $1 ORDER BY placement")
            .bind(list.as_str())
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows)
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancellation_token.cancel();
        let _ = self.handle.await;
        self.db.cleanup().await
    }
}
