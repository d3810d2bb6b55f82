//! Session-server join for online-mode logins.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::ClientError;

/// Body of the join POST.
pub fn join_payload(access_token: &str, selected_profile: &str, server_hash: &str) -> Value {
    json!({
        "accessToken": access_token,
        "selectedProfile": selected_profile,
        "serverId": server_hash,
    })
}

/// POST the join request and insist on a 2xx. The session server answers
/// 204 on success and carries an error JSON otherwise.
pub async fn join(
    url: &str,
    access_token: &str,
    selected_profile: &str,
    server_hash: &str,
) -> Result<(), ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .json(&join_payload(access_token, selected_profile, server_hash))
        .send()
        .await
        .map_err(|e| ClientError::SessionJoin(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::SessionJoin(format!("{status}: {body}")));
    }
    debug!("session join accepted ({status})");
    Ok(())
}
