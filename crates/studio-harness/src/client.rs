use std::time::Duration;

use bridge_proto::{Ack, Job, JobResult, PingResponse, PollResponse};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::{HarnessError, HarnessResult};

/// Longer than any server-side poll hold, so an idle poll is never cut short.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the bridge's long-poll surface.
#[derive(Clone, Debug)]
pub struct BridgeClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> HarnessResult<Self> {
        Self::with_timeout(base_url, client_id, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        request_timeout: Duration,
    ) -> HarnessResult<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn ping(&self) -> HarnessResult<PingResponse> {
        let res = self
            .http
            .get(format!("{}/ping", self.base_url))
            .query(&[("client_id", &self.client_id)])
            .send()
            .await?;
        decode(res).await
    }

    /// Long-polls for the next job. `None` means the server's hold elapsed idle.
    pub async fn poll(&self) -> HarnessResult<Option<Job>> {
        let res = self
            .http
            .get(format!("{}/poll", self.base_url))
            .query(&[("client_id", &self.client_id)])
            .send()
            .await?;
        let body: PollResponse = decode(res).await?;
        Ok(body.job)
    }

    pub async fn post_result(&self, result: &JobResult) -> HarnessResult<()> {
        let res = self
            .http
            .post(format!("{}/result", self.base_url))
            .json(result)
            .send()
            .await?;
        let _: Ack = decode(res).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> HarnessResult<T> {
    if res.status().is_success() {
        Ok(res.json::<T>().await?)
    } else {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(HarnessError::UnexpectedStatus { status, body })
    }
}
