//! HTTP sender.
//!
//! Posts the JSON form of a payload to its destination URL, carrying the
//! credential in the `Signature` header.

use crate::application::ports::Sender;
use crate::domain::outcome::DeliveryError;
use crate::domain::route::Destination;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Request};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the submission credential.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Bytes of a rejection body kept in [`DeliveryError::Rejected`].
const MAX_REJECTION_BODY: usize = 1024;

/// [`Sender`] that delivers payloads as JSON over HTTP.
///
/// Any 2xx response is a success. Other statuses become
/// [`DeliveryError::Rejected`]; connection problems and timeouts become
/// [`DeliveryError::Transport`]. Nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    /// Sender whose requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns `DeliveryError::Transport` if the HTTP client cannot be
    /// initialised (for example, no TLS backend).
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS, proxies).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Build the request that [`send`](Sender::send) would execute.
    ///
    /// # Errors
    /// Returns `Serialization` when the payload cannot be encoded as JSON and
    /// `Transport` when the destination or credential cannot form a request.
    pub fn build_request<P: Serialize>(
        &self,
        destination: &Destination,
        payload: &P,
        credential: &str,
    ) -> Result<Request, DeliveryError> {
        let body =
            serde_json::to_vec(payload).map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        let signature = HeaderValue::from_str(credential)
            .map_err(|_| DeliveryError::Transport("credential is not a valid header value".to_string()))?;

        self.client
            .post(destination.as_str())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

impl<P> Sender<P> for HttpSender
where
    P: Serialize + Send + Sync + 'static,
{
    async fn send(
        &self,
        destination: &Destination,
        payload: &P,
        credential: &str,
    ) -> Result<(), DeliveryError> {
        let request = self.build_request(destination, payload, credential)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // The body is diagnostic only; failing to read it keeps the status.
        let mut body = response.text().await.unwrap_or_default();
        truncate(&mut body, MAX_REJECTION_BODY);
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
