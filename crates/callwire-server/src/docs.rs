//! `/docs/signaling` help document.

use serde_json::{json, Value};

/// Static description of the signaling protocol for client developers.
pub fn signaling_help() -> Value {
    json!({
        "websocket_url": "/ws",
        "auth": "Pass JWT token as query parameter: /ws?token=<JWT>",
        "message_envelope": {
            "type": "offer|answer|candidate|hangup",
            "to": "<target_user_id>",
            "roomId": "<string>",
            "...": "payload depends on type (sdp/candidate etc.)",
        },
        "routing": {
            "server_forwards_to_recipient": {
                "from": "<sender_user_id>",
                "roomId": "<roomId>",
                "...": "payload",
            },
            "offline_behavior": {
                "type": "peer_offline",
                "to": "<target_user_id>",
                "roomId": "<roomId>",
            },
        },
    })
}
