use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Subscriber,
}

impl Role {
    /// Parse the `type` query parameter sent by the widget. Anything
    /// unrecognized falls back to `User`, matching the widget's default.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("admin") => Role::Admin,
            Some("subscriber") => Role::Subscriber,
            _ => Role::User,
        }
    }
}

/// Metadata snapshot for a live connection, as handed to command handlers
/// and the delivery engine. The outbound channel itself stays inside the
/// registry.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: String,
    pub role: Role,
    pub user_id: String,
    pub email: Option<String>,
    pub is_subscriber: bool,
    pub connected_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
