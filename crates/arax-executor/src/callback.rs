//! Callback delivery: POST the final envelope to a caller-supplied URL.
//!
//! At most once. Only 200 and 201 count as delivered.

use arax_core::Envelope;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("callback {url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("callback {url} unreachable: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl DeliveryError {
    pub fn code(&self) -> &'static str {
        "UnreachableCallback"
    }
}

#[derive(Clone)]
pub struct CallbackClient {
    client: Client,
    timeout: Duration,
}

impl Default for CallbackClient {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

impl CallbackClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Returns the HTTP status on success.
    pub async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<u16, DeliveryError> {
        let transport = |source| DeliveryError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(envelope)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        if status == 200 || status == 201 {
            debug!(url, status, "callback delivered");
            Ok(status)
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(url, status, "callback rejected: {}", body);
            Err(DeliveryError::Status {
                url: url.to_string(),
                status,
            })
        }
    }
}
