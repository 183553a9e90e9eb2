//! Parsing and validation of submitted bulk add payloads.
//!
//! The transport (multipart upload, header authentication) lives outside
//! this crate; it hands over the raw users document and the caller's id.

use crate::common::RequestError;
use crate::engine::{BulkOperationRequest, JobAccepted, UserRef};
use serde::Deserialize;

/// A users document as submitted by a client.
///
/// ```json
/// {"channel_id": "...", "add_to_team": true, "users": [{"user_id": "..."}, {"username": "..."}]}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkAddPayload {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub add_to_team: bool,
    #[serde(default)]
    pub include_guests: bool,
    #[serde(default)]
    pub users: Vec<UserRef>,
}

impl BulkAddPayload {
    /// Decodes a JSON document of at most `max_kb` kilobytes.
    pub fn from_json(bytes: &[u8], max_kb: u64) -> Result<Self, RequestError> {
        if bytes.len() as u64 > max_kb * 1024 {
            return Err(RequestError::TooLarge { max_kb });
        }

        serde_json::from_slice(bytes).map_err(|e| {
            log::error!("error parsing bulk add payload, err={e}");
            RequestError::Malformed {
                reason: e.to_string(),
            }
        })
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.channel_id.trim().is_empty() {
            return Err(RequestError::MissingChannel);
        }

        if self.users.is_empty() {
            return Err(RequestError::MissingUsers);
        }

        Ok(())
    }

    /// Validates the payload and turns it into a job request on behalf of
    /// `initiator_id`.
    pub fn into_request(self, initiator_id: &str) -> Result<BulkOperationRequest, RequestError> {
        if initiator_id.trim().is_empty() {
            return Err(RequestError::MissingInitiator);
        }
        self.validate()?;

        Ok(
            BulkOperationRequest::new(self.channel_id.trim(), initiator_id.trim(), self.users)
                .add_to_parent(self.add_to_team)
                .include_guests(self.include_guests),
        )
    }
}

/// Body returned once a job has been accepted.
pub fn accepted_body(accepted: &JobAccepted) -> String {
    serde_json::json!({
        "message": "bulk add job started",
        "job_id": accepted.job_id.to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JobId;
    use claims::*;

    #[test]
    fn test_parse_valid_payload() {
        let payload = BulkAddPayload::from_json(
            br#"{"channel_id": "c1", "add_to_team": true, "users": [{"user_id": "u1"}, {"username": "bob"}, {}]}"#,
            256,
        )
        .unwrap();

        let request = assert_ok!(payload.into_request("admin"));

        assert_eq!(request.resource_id, "c1");
        assert_eq!(request.initiator_id, "admin");
        assert!(request.add_to_parent);
        assert!(!request.include_guests);
        assert_eq!(request.users.len(), 3);
        assert!(request.users[2].is_empty());
    }

    #[test]
    fn test_payload_too_large() {
        let big = format!(r#"{{"users": [{}]}}"#, r#"{"user_id": "x"},"#.repeat(100));

        assert_eq!(
            BulkAddPayload::from_json(big.as_bytes(), 1).unwrap_err(),
            RequestError::TooLarge { max_kb: 1 }
        );
    }

    #[test]
    fn test_malformed_payload() {
        let err = BulkAddPayload::from_json(b"{not json", 256).unwrap_err();

        assert_matches!(err, RequestError::Malformed { .. });
        assert_eq!(err.to_string(), "Error parsing submitted file");
    }

    #[test]
    fn test_validation_errors() {
        let missing_channel = BulkAddPayload {
            users: vec![UserRef::by_id("u1")],
            ..BulkAddPayload::default()
        };
        assert_eq!(missing_channel.validate(), Err(RequestError::MissingChannel));

        let missing_users = BulkAddPayload {
            channel_id: "c1".to_string(),
            ..BulkAddPayload::default()
        };
        assert_eq!(missing_users.validate(), Err(RequestError::MissingUsers));

        let payload = BulkAddPayload {
            channel_id: "c1".to_string(),
            users: vec![UserRef::by_id("u1")],
            ..BulkAddPayload::default()
        };
        assert_eq!(
            payload.into_request("").unwrap_err(),
            RequestError::MissingInitiator
        );
    }

    #[test]
    fn test_accepted_body() {
        let accepted = JobAccepted {
            job_id: JobId::new(),
            resource_id: "c1".to_string(),
        };

        let body: serde_json::Value = serde_json::from_str(&accepted_body(&accepted)).unwrap();

        assert_eq!(body["message"], "bulk add job started");
        assert_eq!(body["job_id"], accepted.job_id.to_string());
    }
}
