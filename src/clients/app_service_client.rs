use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration as StdDuration;
use jsonwebtoken::{encode, Header, EncodingKey};
use serde::{Serialize, Deserialize};
use chrono::{Utc, Duration};
use tracing::{error, info};

use crate::services::access::{AccessChecker, AccessDecision, Role};
use crate::services::folder_store::{FolderQuestion, FolderStore, StoreError};
use crate::ws::error::CollabError;

#[derive(Debug, Clone)]
enum Credentials {
    /// Sign short-lived service tokens with the shared secret.
    Service { jwt_secret: String, service_name: String },
    /// Act on behalf of a user session.
    Bearer(String),
}

/// HTTP client for the application service that owns folders and their permissions.
#[derive(Debug, Clone)]
pub struct AppServiceClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest<'a> {
    question_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ReorderResponse {
    updated: usize,
}

impl AppServiceClient {
    /// Client authenticating as this service.
    pub fn new(base_url: String, jwt_secret: String, service_name: String) -> Result<Self, reqwest::Error> {
        Self::build(base_url, Credentials::Service { jwt_secret, service_name })
    }

    /// Client acting with a user's session token.
    pub fn with_user_token(base_url: String, token: String) -> Result<Self, reqwest::Error> {
        Self::build(base_url, Credentials::Bearer(token))
    }

    fn build(base_url: String, credentials: Credentials) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn bearer_token(&self) -> Result<String, String> {
        match &self.credentials {
            Credentials::Bearer(token) => Ok(token.clone()),
            Credentials::Service { jwt_secret, service_name } => {
                let expiration = Utc::now()
                    .checked_add_signed(Duration::seconds(60)) // 1 minute expiration
                    .ok_or_else(|| "timestamp overflow".to_string())?
                    .timestamp();

                let claims = Claims {
                    sub: service_name.clone(),
                    type_: "service".to_string(),
                    exp: expiration as usize,
                };

                encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))
                    .map_err(|e| format!("Failed to generate JWT: {}", e))
            }
        }
    }

    /// `{base}/folders/{folder_id}/{tail}`, with the folder id encoded as a
    /// single path segment.
    fn folder_url(&self, folder_id: &str, tail: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| format!("invalid app service url: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| format!("app service url '{}' cannot take a path", self.base_url))?
            .pop_if_empty()
            .push("folders")
            .push(folder_id)
            .push(tail);
        Ok(url)
    }

    /// Ask whether `user_id` holds at least `role` on a folder
    pub async fn get_folder_access(&self, folder_id: &str, user_id: &str, role: Role) -> Result<AccessDecision, String> {
        let token = self.bearer_token()?;
        let url = self.folder_url(folder_id, "access")?;
        let response = self.client.get(url)
            .query(&[("userId", user_id), ("role", role.as_str())])
            .bearer_auth(token)
            .send().await
            .map_err(|e| e.to_string())?;

        match response.status() {
            // Unknown folders and forbidden both mean no access
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(AccessDecision::deny()),
            status if status.is_success() => response.json().await.map_err(|e| e.to_string()),
            status => Err(format!("app service answered {}", status)),
        }
    }
}

#[async_trait]
impl AccessChecker for AppServiceClient {
    async fn check_access(&self, folder_id: &str, user_id: &str, required_role: Role) -> Result<AccessDecision, CollabError> {
        let decision = self.get_folder_access(folder_id, user_id, required_role).await.map_err(|e| {
            error!("Access check for {} on folder {} failed: {}", user_id, folder_id, e);
            CollabError::AccessCheck(e)
        })?;

        // The service may report a weaker role than asked for
        let allowed = decision.allowed && decision.role.map_or(true, |r| r >= required_role);
        info!("Access for {} on folder {} as {}: {}", user_id, folder_id, required_role, allowed);
        Ok(AccessDecision { allowed, role: decision.role })
    }
}

#[async_trait]
impl FolderStore for AppServiceClient {
    async fn fetch_folder_contents(&self, folder_id: &str) -> Result<Vec<FolderQuestion>, StoreError> {
        let token = self.bearer_token().map_err(StoreError::Request)?;
        let url = self.folder_url(folder_id, "questions").map_err(StoreError::Request)?;
        let response = self.client.get(url)
            .bearer_auth(token)
            .send().await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(folder_id.to_string())),
            status if status.is_success() => {
                let mut questions: Vec<FolderQuestion> = response.json().await.map_err(|e| StoreError::Request(e.to_string()))?;
                questions.sort_by_key(|q| q.position);
                Ok(questions)
            }
            status => Err(StoreError::Request(format!("app service answered {}", status))),
        }
    }

    async fn apply_reorder(&self, folder_id: &str, question_ids: &[String]) -> Result<usize, StoreError> {
        let token = self.bearer_token().map_err(StoreError::Request)?;
        let url = self.folder_url(folder_id, "order").map_err(StoreError::Request)?;
        let response = self.client.put(url)
            .bearer_auth(token)
            .json(&ReorderRequest { question_ids })
            .send().await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(folder_id.to_string())),
            StatusCode::FORBIDDEN | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Rejected(body))
            }
            status if status.is_success() => {
                let body: ReorderResponse = response.json().await.map_err(|e| StoreError::Request(e.to_string()))?;
                Ok(body.updated)
            }
            status => Err(StoreError::Request(format!("app service answered {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::validate_jwt;

    #[test]
    fn service_token_validates_with_shared_secret() {
        let client = AppServiceClient::new("http://localhost:9000/".into(), "s3cret".into(), "colabri-folder".into()).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
        let token = client.bearer_token().unwrap();
        let data = validate_jwt(&token, "s3cret").unwrap();
        assert_eq!(data.claims["sub"], "colabri-folder");
        assert_eq!(data.claims["type"], "service");
    }

    #[test]
    fn folder_id_stays_one_path_segment() {
        let client = AppServiceClient::with_user_token("http://localhost:9000".into(), "abc".into()).unwrap();
        let url = client.folder_url("f1", "questions").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/folders/f1/questions");

        let url = client.folder_url("a/b?c#d", "access").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/folders/a%2Fb%3Fc%23d/access");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let nested = AppServiceClient::with_user_token("http://localhost:9000/api/".into(), "abc".into()).unwrap();
        let url = nested.folder_url("../admin", "order").unwrap();
        assert_eq!(url.path(), "/api/folders/..%2Fadmin/order");
    }

    #[test]
    fn user_token_is_passed_through() {
        let client = AppServiceClient::with_user_token("http://localhost:9000".into(), "abc".into()).unwrap();
        assert_eq!(client.bearer_token().unwrap(), "abc");
    }
}
