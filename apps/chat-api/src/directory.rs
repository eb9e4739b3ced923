//! Subscriber directory: the chat core's view of the marketing
//! subscriber list.
//!
//! The real subscriber database (and its encryption) lives in another
//! service; this seam only answers "is this email a known subscriber" and
//! "which emails match a broadcast filter". Lookup failures degrade to
//! "unknown / empty", never to a fatal error.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

/// Recipient filter for admin broadcasts (the `specific` case is resolved
/// from the payload, not the directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientFilter {
    All,
    Verified,
    Subscribed,
}

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn is_known_subscriber(&self, email: &str) -> bool;
    async fn list_emails(&self, filter: RecipientFilter) -> Vec<String>;
}

/// One subscriber record as exported by the email service.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberRecord {
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default = "default_subscribed")]
    pub subscribed: bool,
}

fn default_subscribed() -> bool {
    true
}

/// Directory backed by a JSON snapshot loaded at startup.
pub struct FileDirectory {
    records: Vec<SubscriberRecord>,
}

impl FileDirectory {
    /// Load from a JSON array of subscriber records. A missing or
    /// unparseable file yields an empty directory with a warning; the
    /// chat service must come up regardless.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let records = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "invalid subscribers file");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(?err, path = %path.display(), "subscribers file not readable");
                Vec::new()
            }
        };
        Self { records }
    }

    pub fn from_records(records: Vec<SubscriberRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SubscriberDirectory for FileDirectory {
    async fn is_known_subscriber(&self, email: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.email.eq_ignore_ascii_case(email))
    }

    async fn list_emails(&self, filter: RecipientFilter) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| match filter {
                RecipientFilter::All => true,
                RecipientFilter::Verified => r.verified,
                RecipientFilter::Subscribed => r.subscribed,
            })
            .map(|r| r.email.clone())
            .collect()
    }
}
