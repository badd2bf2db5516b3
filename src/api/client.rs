use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::relay::catch_up::{FetchOutcome, MessageStore};
use crate::relay::sequence::SequenceNumber;

/// HTTP client for the satellite API's message store.
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiClient {
        ApiClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MessageStore for ApiClient {
    async fn fetch(&self, seq: SequenceNumber) -> anyhow::Result<FetchOutcome> {
        let url = format!("{}/message/{}", self.base_url, seq);
        debug!("fetching message #{} from the API", seq);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !response.status().is_success() {
            anyhow::bail!("API answered {} for {}", response.status(), url);
        }

        Ok(FetchOutcome::Found(response.bytes().await?))
    }
}
