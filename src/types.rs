//! Basic type definitions for the signaling router
//!
//! - `PeerKey`: the `(username, uuid)` pair identifying one peer
//! - `Flow`: how a handler hands control back to the dispatch loop

use uuid::Uuid;

/// Identity of a peer
///
/// Usernames are not unique; the uuid disambiguates connections
/// sharing a username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub username: String,
    pub uuid: String,
}

impl PeerKey {
    /// Create a key, generating a uuid when none was supplied
    pub fn new(username: impl Into<String>, uuid: Option<String>) -> Self {
        Self {
            username: username.into(),
            uuid: uuid.unwrap_or_else(Self::generate_uuid),
        }
    }

    /// Generate a random v4 uuid string
    pub fn generate_uuid() -> String {
        Uuid::new_v4().to_string()
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.username, self.uuid)
    }
}

/// Control signal returned by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Pass control to the next matching layer
    Next,
    /// The exchange is finished; stop the dispatch pass
    Done,
}
