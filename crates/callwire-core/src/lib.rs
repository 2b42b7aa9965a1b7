//! # callwire-core
//!
//! Shared vocabulary for the signaling relay:
//!
//! - [`ids`]: user identities and server-generated ids
//! - [`envelope`]: parsing inbound signaling frames and building the
//!   outbound envelopes (relayed message, error notice, offline notice)

pub mod envelope;
pub mod ids;

pub use envelope::{EnvelopeError, MessageType, SignalEnvelope, DEFAULT_ROOM_ID};
pub use ids::{CallSessionId, ConnectionId, UserId};
