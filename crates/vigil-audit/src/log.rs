//! Append-only audit log
//!
//! Entries live in the `auditLogs` collection keyed by their id. Ids are
//! ULIDs issued strictly increasing, so key order is append order and the
//! store's most-recent-N query lists newest first.
//!
//! Appends are serialized by an async mutex holding the chain head. The head
//! only advances after the entry is written, so a failed write leaves the
//! chain intact and the caller may retry.

use crate::entry::{AuditEntry, AuditEvent, GENESIS_HASH};
use crate::error::{AuditError, AuditResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use ulid::Ulid;
use vigil_core::{collections, AuditId, DocumentStore, StoreExt};

/// Default number of entries returned by [`AuditLog::list`]
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest page read from the store while listing
const MAX_LIST_PAGE: usize = 500;

/// Filters for listing entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    /// Maximum entries returned
    pub limit: usize,
    /// Only entries whose subject names this team
    pub team_id: Option<String>,
    /// Only entries with this action
    pub action: Option<String>,
    /// Only entries by this actor uid
    pub actor_uid: Option<String>,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            team_id: None,
            action: None,
            actor_uid: None,
        }
    }
}

impl AuditFilter {
    /// With limit; zero falls back to the default
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit };
        self
    }

    /// With team filter
    #[must_use]
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// With action filter
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// With actor filter
    #[must_use]
    pub fn with_actor(mut self, uid: impl Into<String>) -> Self {
        self.actor_uid = Some(uid.into());
        self
    }

    /// Check if an entry passes every filter
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.team_id
            .as_deref()
            .map_or(true, |t| entry.subject.team_id.as_deref() == Some(t))
            && self.action.as_deref().map_or(true, |a| entry.action == a)
            && self.actor_uid.as_deref().map_or(true, |u| entry.actor.uid == u)
    }
}

#[derive(Debug, Clone)]
struct Head {
    hash: String,
    last_id: Option<Ulid>,
}

/// Hash-chained audit log over a document store
pub struct AuditLog {
    store: Arc<dyn DocumentStore>,
    head: Mutex<Option<Head>>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Create log over a store; the chain head is read on first append
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            head: Mutex::new(None),
        }
    }

    /// Seal and store an event, timestamped now
    ///
    /// # Errors
    /// `Store` if the head cannot be read or the entry cannot be written.
    pub async fn append(&self, event: AuditEvent) -> AuditResult<AuditEntry> {
        self.append_at(event, Utc::now()).await
    }

    /// Seal and store an event with an explicit timestamp
    ///
    /// # Errors
    /// `Store` if the head cannot be read or the entry cannot be written.
    pub async fn append_at(&self, event: AuditEvent, at: DateTime<Utc>) -> AuditResult<AuditEntry> {
        let mut guard = self.head.lock().await;
        let head = match guard.as_ref() {
            Some(head) => head.clone(),
            None => self.load_head().await?,
        };

        let id = next_id(head.last_id, at)?;
        let entry = AuditEntry::seal(event, AuditId(id), at, head.hash);
        let key = entry.id.to_string();

        if let Err(e) = self.store.save(collections::AUDIT_LOGS, &key, &entry).await {
            tracing::error!("Failed to write audit entry {}: {}", key, e);
            return Err(e.into());
        }

        tracing::debug!(
            "Audit {} by {}: {} ({})",
            key,
            entry.actor.uid,
            entry.action,
            entry.outcome
        );
        *guard = Some(Head {
            hash: entry.hash.clone(),
            last_id: Some(id),
        });
        Ok(entry)
    }

    /// Fetch one entry
    ///
    /// # Errors
    /// `Store` on read or decode failure.
    pub async fn get(&self, log_id: &str) -> AuditResult<Option<AuditEntry>> {
        Ok(self.store.load(collections::AUDIT_LOGS, log_id).await?)
    }

    /// Entries matching `filter`, newest first
    ///
    /// The log is read in pages of at most `limit` entries, newest first,
    /// and reading stops once `limit` matches are found.
    ///
    /// # Errors
    /// `Store` on read or decode failure.
    pub async fn list(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let mut found = Vec::new();
        if filter.limit == 0 {
            return Ok(found);
        }
        let page_size = filter.limit.min(MAX_LIST_PAGE);
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .load_recent_before::<AuditEntry>(collections::AUDIT_LOGS, cursor.as_deref(), page_size)
                .await?;
            let exhausted = page.len() < page_size;
            cursor = page.last().map(|(key, _)| key.clone());

            for (_, entry) in page {
                if filter.matches(&entry) {
                    found.push(entry);
                    if found.len() == filter.limit {
                        return Ok(found);
                    }
                }
            }
            if exhausted || cursor.is_none() {
                return Ok(found);
            }
        }
    }

    /// Walk the whole chain oldest first, checking links and hashes
    ///
    /// Returns the number of entries verified.
    ///
    /// # Errors
    /// `IntegrityViolation` at the first broken entry, `Store` on read failure.
    pub async fn verify_integrity(&self) -> AuditResult<usize> {
        let mut entries = self
            .store
            .load_recent::<AuditEntry>(collections::AUDIT_LOGS, usize::MAX)
            .await?;
        entries.reverse();

        let mut prev = GENESIS_HASH.to_string();
        for (key, entry) in &entries {
            if entry.id.to_string() != *key {
                return Err(AuditError::integrity(key, "stored under a different id"));
            }
            if entry.prev_hash != prev {
                return Err(AuditError::integrity(key, "prev_hash does not match predecessor"));
            }
            if entry.compute_hash() != entry.hash {
                return Err(AuditError::integrity(key, "content does not match hash"));
            }
            prev.clone_from(&entry.hash);
        }

        tracing::info!("Audit chain verified: {} entries", entries.len());
        Ok(entries.len())
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    async fn load_head(&self) -> AuditResult<Head> {
        let newest = self
            .store
            .load_recent::<AuditEntry>(collections::AUDIT_LOGS, 1)
            .await?;
        Ok(match newest.into_iter().next() {
            Some((_, entry)) => Head {
                hash: entry.hash,
                last_id: Some(entry.id.0),
            },
            None => Head {
                hash: GENESIS_HASH.to_string(),
                last_id: None,
            },
        })
    }
}

/// Next id: timestamped `at`, but always greater than `last`
fn next_id(last: Option<Ulid>, at: DateTime<Utc>) -> AuditResult<Ulid> {
    let candidate = Ulid::from_datetime(SystemTime::from(at));
    match last {
        Some(last) if candidate <= last => last.increment().ok_or_else(|| AuditError::IdExhausted {
            last: last.to_string(),
        }),
        _ => Ok(candidate),
    }
}
