//! Routing of one inbound frame from a connected sender.

use std::sync::Arc;

use callwire_core::envelope::{error_notice, peer_offline_notice};
use callwire_core::{EnvelopeError, MessageType, SignalEnvelope};
use tracing::debug;

use crate::call_tracker::CallTracker;
use crate::connection::ClientConnection;
use crate::metrics::{
    SIGNAL_MALFORMED_TOTAL, SIGNAL_PEER_OFFLINE_TOTAL, SIGNAL_REJECTED_TOTAL,
    SIGNAL_RELAYED_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// Detail stored on the call record when the recipient was unreachable.
const PEER_OFFLINE_DETAIL: &str = "peer_offline";

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered(MessageType),
    /// Recipient unreachable; the sender got a `peer_offline` notice.
    PeerOffline(MessageType),
    /// The sender got an error notice.
    Rejected(EnvelopeError),
    /// Dropped without a reply.
    Malformed,
}

/// Validates envelopes and forwards them through the registry.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    tracker: CallTracker,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>, tracker: CallTracker) -> Self {
        Self { registry, tracker }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// Handle one text frame from `sender`.
    pub async fn handle_frame(&self, sender: &ClientConnection, text: &str) -> RelayOutcome {
        let timeout = self.registry.send_timeout();

        let envelope = match SignalEnvelope::parse(text) {
            Ok(env) => env,
            Err(err) => {
                let Some(detail) = err.client_detail() else {
                    debug!(user_id = %sender.user_id, error = %err, "dropping malformed frame");
                    metrics::counter!(SIGNAL_MALFORMED_TOTAL).increment(1);
                    return RelayOutcome::Malformed;
                };
                debug!(user_id = %sender.user_id, reason = err.kind(), "rejecting frame");
                metrics::counter!(SIGNAL_REJECTED_TOTAL, "reason" => err.kind()).increment(1);
                let _ = sender.send_json(&error_notice(detail), timeout).await;
                return RelayOutcome::Rejected(err);
            }
        };

        let kind = envelope.kind;
        let to = envelope.to;
        let room_id = envelope.room_id.clone();

        let _ = self.tracker.touch(&room_id, sender.user_id, to, kind).await;

        let outbound = envelope.into_outbound(&sender.user_id);
        if self.registry.send_json(&to, &outbound).await {
            debug!(from = %sender.user_id, to = %to, room_id = %room_id, kind = %kind, "relayed");
            metrics::counter!(SIGNAL_RELAYED_TOTAL, "type" => kind.as_str()).increment(1);
            return RelayOutcome::Delivered(kind);
        }

        debug!(from = %sender.user_id, to = %to, room_id = %room_id, kind = %kind, "peer offline");
        metrics::counter!(SIGNAL_PEER_OFFLINE_TOTAL, "type" => kind.as_str()).increment(1);
        let _ = sender
            .send_json(&peer_offline_notice(&to, &room_id), timeout)
            .await;
        self.tracker
            .note_delivery_miss(&room_id, PEER_OFFLINE_DETAIL)
            .await;
        RelayOutcome::PeerOffline(kind)
    }
}
