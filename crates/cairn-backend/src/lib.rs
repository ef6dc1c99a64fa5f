pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod rentals;
mod store;

use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use cairn_types::api::Items;

pub const ENV_BASE_URL: &str = "CAIRN_BACKEND_URL";
pub const ENV_TOKEN: &str = "CAIRN_BACKEND_TOKEN";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not configured: {0}")]
    Configuration(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Api { status: u16, detail: String },
}

/// Backend collaborator configuration, read once at process start.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Static bearer token. Session mechanics live outside this crate.
    pub token: Option<String>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn from_env() -> Result<Self, BackendError> {
        let _ = dotenvy::dotenv();

        let base_url = std::env::var(ENV_BASE_URL)
            .map_err(|_| BackendError::Configuration(format!("{ENV_BASE_URL} is not set")))?;
        if base_url.trim().is_empty() {
            return Err(BackendError::Configuration(format!(
                "{ENV_BASE_URL} is empty"
            )));
        }

        Ok(Self {
            base_url,
            token: std::env::var(ENV_TOKEN).ok(),
        })
    }
}

/// Request/response client for the hosted collection backend.
///
/// Every operation is a plain CRUD call against `/items/{collection}`; the
/// realtime subsystem treats this as the system of record.
#[derive(Clone)]
pub struct Backend {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        }
    }

    fn items_url(&self, collection: &str) -> String {
        format!("{}/items/{}", self.base_url, collection)
    }

    fn item_url(&self, collection: &str, id: &str) -> String {
        format!("{}/items/{}/{}", self.base_url, collection, id)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) async fn get_items<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &[(String, String)],
    ) -> Result<T, BackendError> {
        let response = self
            .request(Method::GET, self.items_url(collection))
            .query(query)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub(crate) async fn get_item<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, BackendError> {
        let response = self
            .request(Method::GET, self.item_url(collection, id))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub(crate) async fn create_item<T: DeserializeOwned>(
        &self,
        collection: &str,
        payload: &impl Serialize,
    ) -> Result<T, BackendError> {
        let response = self
            .request(Method::POST, self.items_url(collection))
            .json(payload)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub(crate) async fn update_item<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        payload: &impl Serialize,
    ) -> Result<T, BackendError> {
        let response = self
            .request(Method::PATCH, self.item_url(collection, id))
            .json(payload)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "backend request failed");
            return Err(BackendError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.json::<Items<T>>().await?.data)
    }
}

/// `filter[{field}][_eq]={value}` query pair.
pub(crate) fn eq_filter(field: &str, value: &str) -> (String, String) {
    (format!("filter[{field}][_eq]"), value.to_string())
}

/// `filter[{field}][_gt]={value}` query pair.
pub(crate) fn gt_filter(field: &str, value: &str) -> (String, String) {
    (format!("filter[{field}][_gt]"), value.to_string())
}

pub(crate) fn sort(value: &str) -> (String, String) {
    ("sort".to_string(), value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let backend = Backend::new(BackendConfig::new("https://cms.cairn.app/"));
        assert_eq!(backend.items_url("messages"), "https://cms.cairn.app/items/messages");
        assert_eq!(
            backend.item_url("notifications", "n1"),
            "https://cms.cairn.app/items/notifications/n1"
        );
    }

    #[test]
    fn filter_pairs() {
        assert_eq!(
            eq_filter("conversation", "c1"),
            ("filter[conversation][_eq]".to_string(), "c1".to_string())
        );
        assert_eq!(
            gt_filter("date_created", "2026-08-01T00:00:00Z"),
            (
                "filter[date_created][_gt]".to_string(),
                "2026-08-01T00:00:00Z".to_string()
            )
        );
        assert_eq!(sort("-date_created").0, "sort");
    }
}
