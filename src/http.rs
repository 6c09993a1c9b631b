use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GdcError;

/// Status code plus body text, decoupled from the transport so core
/// logic can be exercised against canned responses.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Promote a non-2xx response to an error, folding the GDC
    /// `warnings` key into the message when the body carries one.
    pub fn error_for_status(self) -> Result<Self, GdcError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = match serde_json::from_str::<Value>(&self.body) {
            Ok(json) => match json.get("warnings") {
                Some(warnings) if !warnings.is_null() => warnings.to_string(),
                _ => self.body.clone(),
            },
            Err(_) => self.body.clone(),
        };
        Err(GdcError::Upstream {
            status: self.status,
            message,
        })
    }

    pub fn json(&self) -> Result<Value, GdcError> {
        serde_json::from_str(&self.body).map_err(|err| GdcError::ResultParse(err.to_string()))
    }
}

pub trait GdcHttp: Send + Sync {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, GdcError>;
}

/// Minimum-interval rate limiter applied before each outgoing request.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn wait(&self) {
        let mut last_call = self.last_call.lock().unwrap();
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last_call = Some(Instant::now());
    }
}

pub struct GdcHttpClient {
    client: Client,
    limiter: RateLimiter,
}

impl GdcHttpClient {
    pub fn new() -> Result<Self, GdcError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gdc-query/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GdcError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GdcError::Http(err.to_string()))?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(Duration::from_secs(1)),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, GdcError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 1;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            self.limiter.wait();
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        warn!(status, "retryable status from GDC, trying request again");
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        warn!("connection problem, trying request again: {err}");
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS));
                        attempt += 1;
                        continue;
                    }
                    return Err(GdcError::Http(err.to_string()));
                }
            }
        }
    }
}

impl GdcHttp for GdcHttpClient {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, GdcError> {
        debug!(url, ?params, "submitting GDC request");
        let response = self.send_with_retries(|| self.client.get(url).query(params))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| GdcError::Http(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
