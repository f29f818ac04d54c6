// Start Broadcast Use Case (request + validation)

use crate::application::constants::{
    MAX_INTER_DESTINATION_DELAY_SECONDS, MAX_INTER_ITEM_DELAY_MINUTES, MAX_TEMPLATE_LEN,
    MAX_TOTAL_UNITS,
};
use crate::domain::BroadcastPayload;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Start request: what to send, where, and how fast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBroadcast {
    /// Items in priority order
    pub item_ids: Vec<String>,
    /// Destinations in selection order
    pub destination_ids: Vec<String>,
    pub template: String,

    #[serde(default)]
    pub inter_destination_delay_seconds: u64,

    #[serde(default)]
    pub inter_item_delay_minutes: u64,
}

impl StartBroadcast {
    pub fn into_payload(self) -> BroadcastPayload {
        BroadcastPayload {
            item_ids: self.item_ids,
            destination_ids: self.destination_ids,
            template: self.template,
            inter_destination_delay_seconds: self.inter_destination_delay_seconds,
            inter_item_delay_minutes: self.inter_item_delay_minutes,
        }
    }
}

/// Validate a start request before anything is persisted
pub fn validate_request(req: &StartBroadcast) -> Result<()> {
    if req.item_ids.iter().any(|id| id.trim().is_empty())
        || req.destination_ids.iter().any(|id| id.trim().is_empty())
    {
        return Err(AppError::Validation("ids cannot be empty".to_string()));
    }

    if req.template.len() > MAX_TEMPLATE_LEN {
        return Err(AppError::Validation(format!(
            "template too long (max {} bytes)",
            MAX_TEMPLATE_LEN
        )));
    }

    if req.inter_destination_delay_seconds > MAX_INTER_DESTINATION_DELAY_SECONDS {
        return Err(AppError::Validation(format!(
            "inter-destination delay out of range (max {} seconds)",
            MAX_INTER_DESTINATION_DELAY_SECONDS
        )));
    }

    if req.inter_item_delay_minutes > MAX_INTER_ITEM_DELAY_MINUTES {
        return Err(AppError::Validation(format!(
            "inter-item delay out of range (max {} minutes)",
            MAX_INTER_ITEM_DELAY_MINUTES
        )));
    }

    let total = (req.item_ids.len() as u64).saturating_mul(req.destination_ids.len() as u64);
    if total > MAX_TOTAL_UNITS {
        return Err(AppError::Validation(format!(
            "broadcast too large ({} sends, max {})",
            total, MAX_TOTAL_UNITS
        )));
    }

    Ok(())
}

/// Full check: request bounds, then payload rules (non-empty, no duplicates)
pub fn validate(req: StartBroadcast) -> Result<BroadcastPayload> {
    validate_request(&req)?;
    let payload = req.into_payload();
    payload.validate()?;
    Ok(payload)
}
