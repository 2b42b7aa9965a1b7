//! Graceful shutdown coordination via `CancellationToken`.

use tokio_util::sync::CancellationToken;

/// Root cancellation for the listener and every open session.
///
/// Sessions hold child tokens, so cancelling here reaches all of them while a
/// single session can still be cancelled on its own.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled with the root but cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
