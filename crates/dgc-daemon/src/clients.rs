//! Outbound HTTP with bounded deadlines.
//!
//! Every cross-service call is a message with an explicit deadline and a
//! classified outcome. Primary-path coordination uses a 5 second deadline
//! and surfaces failures with precise codes; best-effort fan-out uses
//! 3 seconds and suppresses failures after a log line.
//!
//! All outbound requests attach the shared `x-service-token` header when the
//! trust fabric is configured.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::SERVICE_TOKEN_HEADER;

/// Deadline for primary-path coordination calls.
pub const PRIMARY_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline for best-effort fan-out calls.
pub const FANOUT_DEADLINE: Duration = Duration::from_secs(3);

/// Transport-level outbound failure. Non-2xx statuses are not errors here;
/// call sites classify them per their own contract.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// The collaborator could not be reached before the deadline.
    #[error("collaborator unreachable: {0}")]
    Unreachable(String),
}

/// An outbound response: status plus parsed JSON body (null when the body is
/// not JSON).
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Parsed body, `Value::Null` when absent or unparseable.
    pub body: Value,
}

impl OutboundResponse {
    /// True for any 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Shared outbound HTTP client carrying the service token.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Builds a client. Construction only fails on TLS backend issues, which
    /// is a startup-fatal condition.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error.
    pub fn new(token: Option<SecretString>) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self { inner, token })
    }

    fn apply_token(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header(SERVICE_TOKEN_HEADER, token.expose_secret()),
            None => builder,
        }
    }

    /// POSTs a JSON body with the given deadline.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Unreachable`] on connect failure or deadline
    /// expiry; non-2xx responses come back as [`OutboundResponse`].
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        deadline: Duration,
    ) -> Result<OutboundResponse, OutboundError> {
        let request = self
            .apply_token(self.inner.post(url))
            .timeout(deadline)
            .json(body);
        Self::execute(request).await
    }

    /// GETs a JSON resource with the given deadline.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Unreachable`] on connect failure or deadline
    /// expiry.
    pub async fn get_json(
        &self,
        url: &str,
        deadline: Duration,
    ) -> Result<OutboundResponse, OutboundError> {
        let request = self.apply_token(self.inner.get(url)).timeout(deadline);
        Self::execute(request).await
    }

    async fn execute(request: reqwest::RequestBuilder) -> Result<OutboundResponse, OutboundError> {
        let response = request
            .send()
            .await
            .map_err(|e| OutboundError::Unreachable(e.to_string()))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(OutboundResponse { status, body })
    }
}

/// Fire-and-forget fan-out POST on a detached task. Failures are logged at
/// debug level and otherwise silent; the primary path never waits on this.
pub fn spawn_fanout(client: HttpClient, url: String, body: Value, what: &'static str) {
    tokio::spawn(async move {
        match client.post_json(&url, &body, FANOUT_DEADLINE).await {
            Ok(response) if response.is_success() => {
                debug!(url = %url, what, "fan-out delivered");
            },
            Ok(response) => {
                debug!(url = %url, what, status = %response.status, "fan-out rejected");
            },
            Err(e) => {
                debug!(url = %url, what, error = %e, "fan-out unreachable");
            },
        }
    });
}

/// Outcome classification for the certificate authority's proof/event hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    /// The collaborator acknowledged with a 2xx.
    Delivered,
    /// No collaborator is configured.
    Skipped,
    /// The collaborator failed or was unreachable.
    Failed,
}

impl HopOutcome {
    /// Wire label for anchor hops.
    #[must_use]
    pub const fn anchor_label(self) -> &'static str {
        match self {
            Self::Delivered => "ANCHORED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }

    /// Wire label for event-record hops.
    #[must_use]
    pub const fn record_label(self) -> &'static str {
        match self {
            Self::Delivered => "RECORDED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }

    /// Combines outcomes for a multi-part operation (split anchors both the
    /// parent and the child): FAILED if any failed, else ANCHORED if any
    /// delivered, else SKIPPED.
    #[must_use]
    pub fn combine(outcomes: &[Self]) -> Self {
        if outcomes.iter().any(|o| matches!(o, Self::Failed)) {
            Self::Failed
        } else if outcomes.iter().any(|o| matches!(o, Self::Delivered)) {
            Self::Delivered
        } else {
            Self::Skipped
        }
    }
}

/// Classifies a primary-path call result into a hop outcome, logging
/// failures.
#[must_use]
pub fn classify_hop(
    result: &Result<OutboundResponse, OutboundError>,
    what: &'static str,
) -> HopOutcome {
    match result {
        Ok(response) if response.is_success() => HopOutcome::Delivered,
        Ok(response) => {
            warn!(what, status = %response.status, "outbound hop rejected");
            HopOutcome::Failed
        },
        Err(e) => {
            warn!(what, error = %e, "outbound hop unreachable");
            HopOutcome::Failed
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_prefers_failed() {
        use HopOutcome::{Delivered, Failed, Skipped};
        assert_eq!(HopOutcome::combine(&[Delivered, Failed]), Failed);
        assert_eq!(HopOutcome::combine(&[Delivered, Delivered]), Delivered);
        assert_eq!(HopOutcome::combine(&[Skipped, Skipped]), Skipped);
        assert_eq!(HopOutcome::combine(&[Skipped, Delivered]), Delivered);
        assert_eq!(HopOutcome::combine(&[]), Skipped);
    }

    #[test]
    fn labels() {
        assert_eq!(HopOutcome::Delivered.anchor_label(), "ANCHORED");
        assert_eq!(HopOutcome::Delivered.record_label(), "RECORDED");
        assert_eq!(HopOutcome::Skipped.anchor_label(), "SKIPPED");
        assert_eq!(HopOutcome::Failed.record_label(), "FAILED");
    }
}
