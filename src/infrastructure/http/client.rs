//! Fleet REST API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::application::ports::BookingApi;
use crate::config::AppConfig;
use crate::domain::{BookingId, BookingRequest, BookingSnapshot, BookingStatus, SyncError, SyncResult};

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: BookingStatus,
}

/// `reqwest`-backed [`BookingApi`]
#[derive(Clone, Debug)]
pub struct HttpBookingApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBookingApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> SyncResult<Self> {
        Self::new(config.api.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the server to cancel a booking.
    pub async fn cancel_booking(&self, booking_id: &BookingId, token: Option<&str>) -> SyncResult<()> {
        let url = self.url(&format!("/api/bookings/{booking_id}/status"));
        debug!(booking_id = %booking_id, "Requesting server-side cancellation");

        let response = with_token(self.http_client.post(&url), token)
            .json(&StatusUpdate {
                status: BookingStatus::Cancelled,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, booking_id.as_str()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn fetch_snapshot(
        &self,
        booking_id: &BookingId,
        token: Option<&str>,
    ) -> SyncResult<BookingSnapshot> {
        let url = self.url(&format!("/api/bookings/{booking_id}"));
        let response = with_token(self.http_client.get(&url), token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body, booking_id.as_str()));
        }
        decode_snapshot(&body, booking_id.as_str())
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
        token: Option<&str>,
    ) -> SyncResult<BookingSnapshot> {
        let url = self.url("/api/bookings/create");
        let response = with_token(self.http_client.post(&url), token)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body, "new booking"));
        }
        decode_snapshot(&body, "new booking")
    }
}

fn with_token(builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_decode() {
        SyncError::MalformedMessage(e.to_string())
    } else {
        SyncError::Network(e.to_string())
    }
}

/// The booking endpoint answers `null` for an unknown id.
fn decode_snapshot(body: &str, what: &str) -> SyncResult<BookingSnapshot> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(SyncError::NotFound(what.to_string()));
    }
    Ok(BookingSnapshot::from_json(trimmed)?)
}

fn status_error(status: StatusCode, body: &str, what: &str) -> SyncError {
    let message = server_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::NOT_FOUND => SyncError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized(message),
        s if s.is_client_error() => SyncError::Validation(message),
        s => {
            warn!(status = s.as_u16(), "Fleet API error");
            SyncError::Network(message)
        }
    }
}

/// `message` (or `error`) field of a JSON error body, else a short plain body.
fn server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return ["message", "error"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);
    }
    (body.len() <= 200).then(|| body.to_string())
}
