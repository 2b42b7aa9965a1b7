use crate::auth::AuthError;

/// Failures while building or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("auth setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("metrics recorder: {0}")]
    Metrics(String),

    #[error("configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let err: ServerError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken").into();
        assert!(matches!(err, ServerError::Io(_)));
        assert!(err.to_string().contains("taken"));
    }

    #[test]
    fn auth_error_converts() {
        let err: ServerError = AuthError::UnsupportedAlgorithm("RS256".into()).into();
        assert!(matches!(err, ServerError::Auth(_)));
        assert!(err.to_string().contains("RS256"));
    }

    #[test]
    fn config_display() {
        let err = ServerError::Config("no jwt secret".into());
        assert_eq!(err.to_string(), "configuration: no jwt secret");
    }
}
