use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh client-side id. Server-assigned ids enter via `from_raw`.
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

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(GameId, "game");
branded_id!(InvitationId, "inv");
branded_id!(UserId, "user");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_id_has_prefix() {
        let id = GameId::new();
        assert!(id.as_str().starts_with("game_"), "got: {id}");
    }

    #[test]
    fn invitation_id_has_prefix() {
        let id = InvitationId::new();
        assert!(id.as_str().starts_with("inv_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = GameId::new();
        let b = GameId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_preserves_server_value() {
        // The persistence service hands out its own ids; we mirror them untouched.
        let id = GameId::from_raw("42");
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = UserId::from_raw("magnus");
        let s = id.to_string();
        let parsed: UserId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_roundtrip() {
        let id = InvitationId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: InvitationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
