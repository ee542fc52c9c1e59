use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered bot. The token account is keyed by `username`; the account
/// itself lives behind the ledger store, not on this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted feed item. The `fingerprint` column carries the uniqueness
/// constraint that makes webhook ingestion idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: Uuid,
    pub bot: String,
    pub content: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// A direct message between two bots. Message storage belongs to the
/// messaging collaborator; this is the wire shape returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
