//! JSON and NDJSON request helpers.
//!
//! This module implements the request methods of [`ReqwestClient`].

use std::time::Instant;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode, Url};
use serde_json::Value;

use crate::connect::{ReqwestClient, TRACING_TARGET};
use crate::error::{Error, Result};

/// Maximum number of body characters kept in status errors.
const ERROR_BODY_LIMIT: usize = 1024;

/// Decoded response of a JSON request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    /// Response status code.
    pub status: StatusCode,
    /// Response body: parsed JSON, a string when the body is not JSON, or
    /// `null` when empty.
    pub body: Value,
}

impl JsonResponse {
    /// Returns whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turns a non-2xx response into [`Error::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let body = match &self.body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Err(Error::Status {
            status: self.status,
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }

    async fn decode(response: Response) -> Result<Self> {
        let status = response.status();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(Self { status, body })
    }
}

impl ReqwestClient {
    /// Sends a request with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error only when no response was received or the body
    /// could not be read; non-2xx statuses are returned as values.
    pub async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<JsonResponse> {
        let started_at = Instant::now();

        tracing::trace!(
            target: TRACING_TARGET,
            method = %method,
            url = %url,
            "Sending JSON request"
        );

        let mut request = self.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = JsonResponse::decode(request.send().await?).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            method = %method,
            url = %url,
            status = response.status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis(),
            "JSON request completed"
        );

        Ok(response)
    }

    /// Sends a newline-delimited JSON body with `POST`, as used by bulk APIs.
    pub async fn send_ndjson(&self, url: Url, body: String) -> Result<JsonResponse> {
        let started_at = Instant::now();
        let body_len = body.len();

        let response = self
            .request(Method::POST, url.clone())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = JsonResponse::decode(response).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            url = %url,
            body_len,
            status = response.status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis(),
            "NDJSON request completed"
        );

        Ok(response)
    }
}
