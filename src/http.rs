//! Transport to the inference runtime.
//!
//! A generation POST that reached the runtime is never sent twice: the runtime
//! keeps working on an abandoned request, so a resend would only queue a second
//! generation behind it. Only connection failures, where nothing was delivered,
//! are retried.

use crate::error::{Error, Result};
use reqwest::{Client, Response, StatusCode, header};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const FIRST_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    connect_retries: u32,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration, connect_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(format!("build client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            connect_retries,
        })
    }

    /// POSTs a JSON body and returns the response text of a 2xx reply.
    pub async fn post_json(&self, url: &str, body: &str, bearer: Option<&str>) -> Result<String> {
        let mut backoff = FIRST_BACKOFF;
        let mut reconnects = 0;

        loop {
            let mut request = self
                .client
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_owned());
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => return read_reply(response).await,
                Err(e) if e.is_timeout() => {
                    return Err(Error::http(format!(
                        "runtime did not answer within {}s",
                        self.timeout.as_secs_f64()
                    )));
                }
                Err(e) if e.is_connect() && reconnects < self.connect_retries => {
                    reconnects += 1;
                    warn!(url, reconnects, "runtime unreachable, reconnecting in {backoff:?}");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(Error::http(e.to_string())),
            }
        }
    }
}

async fn read_reply(response: Response) -> Result<String> {
    let status = response.status();
    let runtime = response
        .url()
        .host_str()
        .map_or_else(|| "runtime".to_string(), |h| h.to_string());
    debug!(%status, %runtime, "runtime replied");

    if status.is_success() {
        return response
            .text()
            .await
            .map_err(|e| Error::http(format!("read reply body: {e}")));
    }

    let retry_after_secs = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let detail = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit {
            platform: runtime,
            retry_after_secs,
        },
        StatusCode::SERVICE_UNAVAILABLE => Error::api_with_status(
            runtime,
            format!("runtime unavailable (model loading or overloaded): {detail}"),
            status.as_u16(),
        ),
        _ => Error::api_with_status(runtime, detail, status.as_u16()),
    })
}
