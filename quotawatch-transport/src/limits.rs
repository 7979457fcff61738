//! Fire-and-forget custom limit pushes.
//!
//! When the user picks a custom plan, the backend is told so that its own
//! warning thresholds line up with the client's. Local state is already
//! updated by the time the push happens, so a failed push is logged and
//! dropped, never retried and never surfaced as an error.

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;
use crate::protocol::CustomLimitsBody;

/// Pushes the custom limits to the backend.
///
/// # Errors
///
/// Returns `TransportError::Http` on request or status failure.
pub async fn publish_custom_limits(
    client: &Client,
    url: &Url,
    body: &CustomLimitsBody,
) -> Result<(), TransportError> {
    client
        .post(url.as_str())
        .json(body)
        .send()
        .await?
        .error_for_status()?;
    debug!(tokens = body.tokens, "Published custom limits");
    Ok(())
}

/// Spawns the push in the background. Failures are logged at warn level
/// and otherwise ignored; the caller's state is already committed.
pub fn spawn_publish_custom_limits(client: Client, url: Url, body: CustomLimitsBody) {
    tokio::spawn(async move {
        if let Err(e) = publish_custom_limits(&client, &url, &body).await {
            warn!(error = %e, "Custom limit push failed; local plan state is unaffected");
        }
    });
}
