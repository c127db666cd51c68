//! Identities used for causal attribution.
//!
//! - [`UserId`]: a player or other account-bearing actor.
//! - [`PluginId`]: third-party logic that schedules work or listens to events.
//! - [`Attribution`]: the creator/notifier pair stamped onto block positions
//!   and spawned entities so later work can be traced back to who started it.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Unique numeric ID for a user (player, console, remote operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// The server console.
    pub const CONSOLE: UserId = UserId(0);
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == UserId::CONSOLE {
            f.write_str("console")
        } else {
            write!(f, "user#{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// PluginId
// ---------------------------------------------------------------------------

/// Identifier of a plugin (e.g. `"landprotect"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

/// Who created a thing and who last caused it to be touched.
///
/// `creator` is the user ultimately responsible (the player who placed the
/// block or triggered the spawn). `notifier` is the user whose action most
/// recently caused an update to reach it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribution {
    pub creator: Option<UserId>,
    pub notifier: Option<UserId>,
}

impl Attribution {
    pub const NONE: Attribution = Attribution {
        creator: None,
        notifier: None,
    };

    pub fn is_empty(&self) -> bool {
        self.creator.is_none() && self.notifier.is_none()
    }

    /// Fill any unset field from `other`. Already-set fields are kept.
    pub fn or(self, other: Attribution) -> Attribution {
        Attribution {
            creator: self.creator.or(other.creator),
            notifier: self.notifier.or(other.notifier),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_constant() {
        assert_eq!(UserId::CONSOLE.0, 0);
        assert_eq!(UserId::CONSOLE.to_string(), "console");
        assert_eq!(UserId(7).to_string(), "user#7");
    }

    #[test]
    fn attribution_or_keeps_existing_fields() {
        let a = Attribution {
            creator: Some(UserId(1)),
            notifier: None,
        };
        let b = Attribution {
            creator: Some(UserId(2)),
            notifier: Some(UserId(3)),
        };
        let merged = a.or(b);
        assert_eq!(merged.creator, Some(UserId(1)));
        assert_eq!(merged.notifier, Some(UserId(3)));
        assert!(Attribution::NONE.is_empty());
        assert!(!merged.is_empty());
    }

    #[test]
    fn plugin_id_serialization_roundtrip() {
        let id = PluginId::new("landprotect");
        let json = serde_json::to_string(&id).unwrap();
        let back: PluginId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert_eq!(back.to_string(), "plugin:landprotect");
    }
}
