pub mod auth;
pub mod call_tracker;
pub mod connection;
pub mod docs;
pub mod errors;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod shutdown;

pub use auth::{AuthError, IdentityResolver, JwtIdentityResolver};
pub use call_tracker::{CallTracker, TouchOutcome};
pub use connection::{ClientConnection, Outbound};
pub use errors::ServerError;
pub use registry::ConnectionRegistry;
pub use relay::{Relay, RelayOutcome};
pub use server::{AppState, SignalingServer};
pub use shutdown::ShutdownCoordinator;
