//! Transport packets.
//!
//! Every WebSocket text frame carries exactly one [`Packet`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::AckId;

// ============================================================================
// Packet
// ============================================================================

/// One frame of the event transport.
///
/// # Format
///
/// Event (optionally requesting an acknowledgement):
/// ```json
/// { "type": "event", "event": "/rpcMethod2", "data": [...], "ackId": 3 }
/// ```
///
/// Acknowledgement:
/// ```json
/// { "type": "ack", "ackId": 3, "data": { "kind": "Plain", "value": 6 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Packet {
    /// Named event.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
        /// Present when the sender waits for an acknowledgement.
        #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
        ack_id: Option<AckId>,
    },

    /// Reply to an event that requested acknowledgement.
    Ack {
        /// Matches the event's `ackId`.
        #[serde(rename = "ackId")]
        ack_id: AckId,
        /// Reply payload.
        #[serde(default)]
        data: Value,
    },
}

impl Packet {
    /// Creates an event packet.
    #[inline]
    #[must_use]
    pub fn event(event: impl Into<String>, data: Value, ack_id: Option<AckId>) -> Self {
        Self::Event {
            event: event.into(),
            data,
            ack_id,
        }
    }

    /// Creates an acknowledgement packet.
    #[inline]
    #[must_use]
    pub fn ack(ack_id: AckId, data: Value) -> Self {
        Self::Ack { ack_id, data }
    }
}

// ============================================================================
// Tests
// ============================================================================
