//! Human-assistance suspensions.
//!
//! When the `generate` node's model call asks for `human_assistance`, the
//! turn stops at [`EngineNode::HumanAssistance`](crate::EngineNode) and the
//! request is persisted as a [`PendingInterrupt`] in the checkpoint metadata.
//! It survives restarts; any process can later deliver a [`HumanResponse`]
//! through [`SessionManager::resume_with_human_input`](crate::SessionManager::resume_with_human_input).

use chrono::{DateTime, Utc};
use parley_checkpoint::PendingInterrupt;
use serde::{Deserialize, Serialize};

/// What the caller sees when a turn suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanAssistanceRequest {
    pub tool_call_id: String,
    /// Question the model wants an operator to answer
    pub query: String,
    pub raised_at: DateTime<Utc>,
}

impl From<&PendingInterrupt> for HumanAssistanceRequest {
    fn from(pending: &PendingInterrupt) -> Self {
        Self {
            tool_call_id: pending.tool_call_id.clone(),
            query: pending.query.clone(),
            raised_at: pending.raised_at,
        }
    }
}

impl From<&HumanAssistanceRequest> for PendingInterrupt {
    fn from(request: &HumanAssistanceRequest) -> Self {
        Self {
            tool_call_id: request.tool_call_id.clone(),
            query: request.query.clone(),
            raised_at: request.raised_at,
        }
    }
}

/// Operator input delivered to a suspended conversation.
///
/// Serializes as `{"data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanResponse {
    pub data: String,
}

impl HumanResponse {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trips_through_pending() {
        let request = HumanAssistanceRequest {
            tool_call_id: "call_9".to_string(),
            query: "Can a clinician confirm this dosage?".to_string(),
            raised_at: Utc::now(),
        };
        let pending = PendingInterrupt::from(&request);
        assert_eq!(HumanAssistanceRequest::from(&pending), request);
    }

    #[test]
    fn test_response_wire_shape() {
        let response: HumanResponse = serde_json::from_str(r#"{"data": "Yes, 5mg is fine."}"#).unwrap();
        assert_eq!(response, HumanResponse::new("Yes, 5mg is fine."));
    }
}
