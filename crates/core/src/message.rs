//! Turn and role domain types.
//!
//! A turn is the unit recorded in a user's history stream:
//! user sends text → relay records it → backend answers → relay records the answer.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona instructions, only ever the first entry of a context window
    System,
    /// The end user
    User,
    /// The language model (or the apology sent in its place)
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One recorded message of a user's conversation.
///
/// Turns of one `user_id` are ordered by `(timestamp, seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Insertion order assigned by the store; breaks timestamp ties
    pub seq: i64,

    /// The conversation partition this turn belongs to
    pub user_id: String,

    pub role: Role,

    pub content: String,

    /// Seconds, non-decreasing across all appends of the process
    pub timestamp: i64,
}
