//! HTTP client for the GitLab REST API v4.
//!
//! The scraper talks to GitLab exclusively through the [`TokenSource`]
//! trait so tests can substitute an in-memory fake. Every request
//! carries a timeout: a hung GitLab instance must not stall the scrape
//! loop indefinitely.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::errors::SourceError;

use super::types::{AccessToken, NamedEntity, PersonalAccessToken};

/// Request timeout for every GitLab call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The three token populations and their owner-name lookups.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn project_access_tokens(&self, project_id: u64)
        -> Result<Vec<AccessToken>, SourceError>;
    async fn project_name(&self, project_id: u64) -> Result<String, SourceError>;

    async fn personal_access_tokens(&self) -> Result<Vec<PersonalAccessToken>, SourceError>;
    async fn user_name(&self, user_id: u64) -> Result<String, SourceError>;

    async fn group_access_tokens(&self, group_id: u64) -> Result<Vec<AccessToken>, SourceError>;
    async fn group_name(&self, group_id: u64) -> Result<String, SourceError>;
}

pub struct GitLabClient {
    base: Url,
    token: String,
    http: Client,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, SourceError> {
        let mut base = Url::parse(base_url)?;
        // Endpoints are joined relative to the base, so a path-hosted
        // instance (e.g. https://example.com/gitlab) keeps its prefix.
        // Url::join drops the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            base,
            token: token.into(),
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = self.base.join(path)?;
        let resp = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // GitLab wraps errors as {"message": "..."}; fall back to the raw body.
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
                .unwrap_or(body);
            return Err(SourceError::Api { status, message });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TokenSource for GitLabClient {
    async fn project_access_tokens(
        &self,
        project_id: u64,
    ) -> Result<Vec<AccessToken>, SourceError> {
        self.get_json(&format!("api/v4/projects/{project_id}/access_tokens"), &[])
            .await
    }

    async fn project_name(&self, project_id: u64) -> Result<String, SourceError> {
        let project: NamedEntity = self
            .get_json(&format!("api/v4/projects/{project_id}"), &[])
            .await?;
        Ok(project.name)
    }

    async fn personal_access_tokens(&self) -> Result<Vec<PersonalAccessToken>, SourceError> {
        self.get_json(
            "api/v4/personal_access_tokens",
            &[("state", "active"), ("revoked", "false")],
        )
        .await
    }

    async fn user_name(&self, user_id: u64) -> Result<String, SourceError> {
        let user: NamedEntity = self.get_json(&format!("api/v4/users/{user_id}"), &[]).await?;
        Ok(user.name)
    }

    async fn group_access_tokens(&self, group_id: u64) -> Result<Vec<AccessToken>, SourceError> {
        self.get_json(
            &format!("api/v4/groups/{group_id}/access_tokens"),
            &[("state", "active"), ("revoked", "false")],
        )
        .await
    }

    async fn group_name(&self, group_id: u64) -> Result<String, SourceError> {
        let group: NamedEntity = self.get_json(&format!("api/v4/groups/{group_id}"), &[]).await?;
        Ok(group.name)
    }
}

// ── Tests ─────────────────────────────────────────────────────
