pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{LinkedInPost, LinkedInSearchInput};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Server-side run timeout passed to run-sync endpoints, in seconds.
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 120;

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    run_timeout_secs: u64,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, BASE_URL)
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(token: String, base_url: &str) -> Self {
        let run_timeout_secs = DEFAULT_RUN_TIMEOUT_SECS;
        Self {
            // The HTTP timeout has to outlive the server-side run timeout.
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(run_timeout_secs + 30))
                .build()
                .expect("Failed to build HTTP client"),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            run_timeout_secs,
        }
    }

    /// Run an actor synchronously and return its default dataset items.
    /// Apify answers 408 when the run does not finish within `timeout`.
    pub async fn run_sync_dataset_items<I, T>(&self, actor_id: &str, input: &I) -> Result<Vec<T>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!(
            "{}/acts/{}/run-sync-get-dataset-items?timeout={}&format=json",
            self.base_url, actor_id, self.run_timeout_secs
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 408 {
            return Err(ApifyError::Timeout {
                secs: self.run_timeout_secs,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let items: Vec<T> = serde_json::from_str(&body)?;
        Ok(items)
    }

    /// Search LinkedIn posts end-to-end through a content-search actor.
    pub async fn search_linkedin_posts(
        &self,
        actor_id: &str,
        search_url: &str,
        limit: u32,
    ) -> Result<Vec<LinkedInPost>> {
        tracing::info!(actor_id, search_url, limit, "Running LinkedIn search actor");

        let input = LinkedInSearchInput {
            search_url: search_url.to_string(),
            max_results: limit,
        };
        let posts: Vec<LinkedInPost> = self.run_sync_dataset_items(actor_id, &input).await?;
        tracing::info!(count = posts.len(), "Fetched LinkedIn posts");

        Ok(posts)
    }
}
