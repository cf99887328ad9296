use serde::Deserialize;
use serde::Serialize;

/// The two sides of a task connection.  Which one dials is independent of
/// the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// issues jobs and awaits their outcome.
    Caller,
    /// executes jobs.
    Runner,
}

impl Role {
    /// the only role this role can talk to.
    pub fn counterpart(self) -> Self {
        match self {
            Role::Caller => Role::Runner,
            Role::Runner => Role::Caller,
        }
    }
}

/// Exchanged during connection setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    pub role: Role,
    pub version: String,
    pub instance_id: u64,
}

impl HandshakeData {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            version: env!("CARGO_PKG_VERSION").to_string(),
            instance_id: rand::random(),
        }
    }
}
