use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Authenticated user identity. Always a UUID on the wire.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse any textual UUID form (hyphenated, simple, braced, urn).
    /// Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(ConnectionId, "conn");
branded_id!(CallSessionId, "call");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_displays_hyphenated() {
        let raw = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";
        let id = UserId::parse(raw).unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn user_id_accepts_other_uuid_forms() {
        let hyphenated = UserId::parse("3f2504e0-4f89-11d3-9a0c-0305e82c3301").unwrap();
        let simple = UserId::parse("3f2504e04f8911d39a0c0305e82c3301").unwrap();
        let braced = UserId::parse("{3f2504e0-4f89-11d3-9a0c-0305e82c3301}").unwrap();
        let urn = UserId::parse("urn:uuid:3f2504e0-4f89-11d3-9a0c-0305e82c3301").unwrap();
        assert_eq!(hyphenated, simple);
        assert_eq!(hyphenated, braced);
        assert_eq!(hyphenated, urn);
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::parse("  3f2504e0-4f89-11d3-9a0c-0305e82c3301\n");
        assert!(id.is_some());
    }

    #[test]
    fn user_id_rejects_garbage() {
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse("bob").is_none());
        assert!(UserId::parse("3f2504e0-4f89-11d3-9a0c").is_none());
        assert!("nope".parse::<UserId>().is_err());
    }

    #[test]
    fn user_id_serde_is_plain_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn call_session_id_has_prefix() {
        let id = CallSessionId::new();
        assert!(id.as_str().starts_with("call_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = CallSessionId::from_raw("call_custom");
        assert_eq!(id.as_str(), "call_custom");
    }
}
