use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::GrabError;

/// Maps transport and status failures onto a repository's error variants.
pub type HttpErr = fn(String) -> GrabError;
pub type StatusErr = fn(u16, String) -> GrabError;

/// Blocking HTTP client shared by the repository clients.
#[derive(Clone)]
pub struct Http {
    client: Client,
    on_http: HttpErr,
    on_status: StatusErr,
}

impl Http {
    pub fn new(timeout: Duration, on_http: HttpErr, on_status: StatusErr) -> Result<Self, GrabError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("grabseqs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| on_http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| on_http(err.to_string()))?;
        Ok(Self {
            client,
            on_http,
            on_status,
        })
    }

    pub fn get_text(&self, url: &str) -> Result<String, GrabError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = self.handle_status(response)?;
        response.text().map_err(|err| (self.on_http)(err.to_string()))
    }

    pub fn get_json(&self, url: &str) -> Result<Value, GrabError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = self.handle_status(response)?;
        response.json().map_err(|err| (self.on_http)(err.to_string()))
    }

    /// Streams the body of `url` into `destination`.
    pub fn download_to(&self, url: &str, destination: &Path) -> Result<u64, GrabError> {
        tracing::debug!(url, destination = %destination.display(), "downloading");
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = self.handle_status(response)?;
        let mut file = File::create(destination)
            .map_err(|err| GrabError::Filesystem(format!("create {}: {err}", destination.display())))?;
        std::io::copy(&mut response, &mut file).map_err(|err| (self.on_http)(err.to_string()))
    }

    fn handle_status(&self, response: Response) -> Result<Response, GrabError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "request failed".to_string());
        Err((self.on_status)(status, message))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, GrabError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err((self.on_http)(err.to_string()));
                }
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
