//! Bearer-token to account-email resolution via the OAuth userInfo endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Resolves a bearer credential to the linked account's email address.
/// Resolution failures are logged and surface as `None`, never as errors.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<String>;
}

#[derive(Deserialize)]
struct UserInfo {
    email: String,
}

/// HTTP resolver against the configured userInfo endpoint.
pub struct ProfileResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl ProfileResolver {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl IdentityResolver for ProfileResolver {
    async fn resolve(&self, token: &str) -> Option<String> {
        let response = match self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("userInfo request failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("userInfo returned status {}", response.status());
            return None;
        }

        match response.json::<UserInfo>().await {
            Ok(info) => Some(info.email),
            Err(e) => {
                warn!("userInfo response parse failed: {e}");
                None
            }
        }
    }
}
