//! Client for the ticket service.
//!
//! Every request carries a timeout and any transport error or non-success
//! status is returned as is; nothing is retried.

use crate::error::{DispatchError, DispatchResult};
use crate::server::CompleteParams;
use futures::Stream;
use futures::stream;
use reqwest::{Client, Response};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(30) }
    }
}

/// How long to wait for the server to publish its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up after this long. `None` waits until cancelled.
    pub max_wait: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), max_wait: None }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceClient {
    base_url: String,
    client: Client,
}

impl SequenceClient {
    pub fn new(base_url: impl Into<String>) -> DispatchResult<Self> {
        Self::with_config(base_url, &ClientConfig::default())
    }

    pub fn with_config(base_url: impl Into<String>, config: &ClientConfig) -> DispatchResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { base_url, client })
    }

    /// Wait for the server's `url.txt` and connect to the URL inside.
    pub async fn from_url_file(
        path: &Path,
        poll: &PollOptions,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> DispatchResult<Self> {
        let started = Instant::now();
        loop {
            match tokio::fs::read_to_string(path).await {
                Ok(url) if !url.trim().is_empty() => {
                    info!(url = %url.trim(), path = %path.display(), "ticket service url found");
                    return Self::with_config(url, config);
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DispatchError::Io(e)),
            }

            let waited = started.elapsed();
            if poll.max_wait.is_some_and(|max| waited >= max) {
                return Err(DispatchError::UrlFileTimeout { path: path.to_path_buf(), waited });
            }
            debug!(path = %path.display(), interval = ?poll.interval, "waiting for ticket service url");

            tokio::select! {
                () = cancel.cancelled() => return Err(DispatchError::Cancelled),
                () = tokio::time::sleep(poll.interval) => {}
            }
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Probe the health endpoint. A non-success status means "not ready".
    pub async fn connect(&self) -> DispatchResult<bool> {
        let response = self.client.get(self.endpoint("/")).send().await?;
        let ready = response.status().is_success();
        debug!(url = %self.base_url, status = %response.status(), ready, "ticket service probe");
        Ok(ready)
    }

    /// Ask for the next index of `case_name`, a sequence of `total_length`.
    pub async fn assign(&self, case_name: &str, total_length: usize) -> DispatchResult<Option<usize>> {
        let url = self.endpoint("/assign");
        let response = self
            .client
            .get(&url)
            .query(&[("case_name", case_name.to_string()), ("seq", total_length.to_string())])
            .send()
            .await?;
        let response = check_status(&url, response).await?;

        let index: Option<usize> = response.json().await.map_err(|e| DispatchError::RemoteFailure {
            url: url.clone(),
            status: None,
            message: format!("unexpected assign response: {e}"),
        })?;
        debug!(case = case_name, index = ?index, "assigned");
        Ok(index)
    }

    pub async fn complete(&self, case_name: &str, index: usize) -> DispatchResult<()> {
        let url = self.endpoint("/complete");
        let params = CompleteParams { case_name: case_name.to_string(), index };
        let response = self.client.put(&url).form(&params).send().await?;
        check_status(&url, response).await?;
        debug!(case = case_name, index, "completed");
        Ok(())
    }

    /// Stream the items of `items` this client is assigned for `case_name`.
    ///
    /// Each index is completed when the next item is requested, so an item
    /// counts as done once the consumer moves past it. After `cancel` fires
    /// the pending index is still completed and the stream ends.
    pub fn consume<'a, T>(
        &'a self,
        case_name: &'a str,
        items: &'a [T],
        cancel: CancellationToken,
    ) -> impl Stream<Item = DispatchResult<&'a T>> + 'a {
        stream::try_unfold(None, move |pending: Option<usize>| {
            let cancel = cancel.clone();
            async move {
                if let Some(index) = pending {
                    self.complete(case_name, index).await?;
                }
                if cancel.is_cancelled() {
                    debug!(case = case_name, "consumption cancelled");
                    return Ok(None);
                }

                let Some(index) = self.assign(case_name, items.len()).await? else {
                    return Ok(None);
                };
                let item = items.get(index).ok_or_else(|| DispatchError::RemoteFailure {
                    url: self.base_url.clone(),
                    status: None,
                    message: format!("assigned index {index} is out of range for {} items", items.len()),
                })?;
                Ok::<_, DispatchError>(Some((item, Some(index))))
            }
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn check_status(url: &str, response: Response) -> DispatchResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    Err(DispatchError::RemoteFailure { url: url.to_string(), status: Some(status.as_u16()), message })
}
