use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use server::api::jwt::{AuthUser, TokenVerifier};

/// Mock token verifier for testing
pub struct MockJwtVerifier {
    expected_tokens: HashMap<String, AuthUser>,
}

impl MockJwtVerifier {
    pub fn new() -> Self {
        Self {
            expected_tokens: HashMap::new(),
        }
    }

    pub fn with_user(mut self, token: &str, user: AuthUser) -> Self {
        self.expected_tokens.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl TokenVerifier for MockJwtVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser> {
        self.expected_tokens
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Invalid token"))
    }
}
