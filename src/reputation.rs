//! Client for the SponsorBlock reputation service.
//!
//! A single read-only lookup per submission. The endpoint is idempotent and
//! side-effect free, so a failed attempt is always safe to repeat on the
//! next message; no retry happens within one submission.

use serde::Deserialize;
use std::time::Duration;

use crate::error::QueueError;

/// Fields requested from the userInfo endpoint. The response shape below
/// must stay in sync with this selection.
const USER_INFO_VALUES: &str = r#"["userName","segmentCount","ignoredSegmentCount","permissions"]"#;

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "userName")]
    pub username: String,
    #[serde(rename = "segmentCount")]
    pub segment_count: u64,
    #[serde(rename = "ignoredSegmentCount")]
    pub ignored_segment_count: u64,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Permissions {
    pub sponsor: bool,
}

#[derive(Clone)]
pub struct ReputationClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReputationClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sbqueue/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self { client, base_url }
    }

    /// Fetch the reputation profile for a public user ID.
    ///
    /// Any transport error, non-200 status, or decode failure is a
    /// `LookupFailed`; there is no partial profile.
    pub async fn user_info(&self, public_id: &str) -> Result<UserInfo, QueueError> {
        let url = format!(
            "{}/api/userInfo?publicUserID={}&values={}",
            self.base_url, public_id, USER_INFO_VALUES
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QueueError::lookup(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::lookup(format!("unexpected status {status}")));
        }

        response
            .json::<UserInfo>()
            .await
            .map_err(|e| QueueError::lookup(format!("malformed response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const ID: &str = "b05a67d5d765013bbb82d9f3b08a95b864b02bb46d4a31d6da589bfa6b1b4215";

    #[tokio::test]
    async fn test_decodes_full_profile() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/userInfo")
                .query_param("publicUserID", ID);
            then.status(200).json_body(serde_json::json!({
                "userName": "someuser",
                "segmentCount": 12,
                "ignoredSegmentCount": 3,
                "permissions": { "sponsor": false }
            }));
        });

        let client = ReputationClient::new(server.base_url());
        let info = client.user_info(ID).await.expect("lookup should succeed");

        mock.assert();
        assert_eq!(info.username, "someuser");
        assert_eq!(info.segment_count, 12);
        assert_eq!(info.ignored_segment_count, 3);
        assert!(!info.permissions.sponsor);
    }

    #[tokio::test]
    async fn test_non_success_status_is_lookup_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/userInfo");
            then.status(500).body("internal error");
        });

        let client = ReputationClient::new(server.base_url());
        let err = client.user_info(ID).await.unwrap_err();
        assert!(
            matches!(err, QueueError::LookupFailed { .. }),
            "expected LookupFailed, got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_lookup_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/userInfo");
            then.status(200).body("not json at all");
        });

        let client = ReputationClient::new(server.base_url());
        let err = client.user_info(ID).await.unwrap_err();
        assert!(matches!(err, QueueError::LookupFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_field_is_lookup_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/userInfo");
            then.status(200)
                .json_body(serde_json::json!({ "userName": "someuser" }));
        });

        let client = ReputationClient::new(server.base_url());
        let err = client.user_info(ID).await.unwrap_err();
        assert!(matches!(err, QueueError::LookupFailed { .. }));
    }
}
