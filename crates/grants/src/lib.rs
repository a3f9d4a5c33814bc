//! Grant Store (spec §4.2): per-channel map of `path -> (mode, expiry)`,
//! in-memory for fast policy lookups and mirrored to the Durable Store.
//! Expiry is enforced by non-blocking `tokio::time` timers so a revoked
//! grant disappears from the policy engine's view without anyone polling
//! for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use sg_domain::error::Result;
use sg_domain::model::{GrantMode, GrantRecord};
use sg_domain::pathutil::canonicalize_best_effort;
use sg_store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub mode: GrantMode,
    pub expires_at: DateTime<Utc>,
}

type Key = (String, PathBuf);

pub struct GrantStore {
    store: Arc<Store>,
    grants: Mutex<HashMap<Key, Grant>>,
    timers: Mutex<HashMap<Key, JoinHandle<()>>>,
}

impl GrantStore {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            store,
            grants: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Record a grant and (re)schedule its auto-expiry timer.
    pub fn add(
        self: &Arc<Self>,
        channel: &str,
        path: &Path,
        mode: GrantMode,
        ttl_minutes: i64,
    ) -> Result<()> {
        let path = canonicalize_best_effort(path);
        let expires_at = Utc::now() + chrono::Duration::minutes(ttl_minutes);
        let key: Key = (channel.to_string(), path.clone());

        self.store.upsert_grant(&GrantRecord {
            channel: channel.to_string(),
            path: path.clone(),
            mode,
            expires_at,
        })?;

        self.grants.lock().insert(key.clone(), Grant { mode, expires_at });
        self.schedule_timer(key, ttl_minutes.max(0) as u64 * 60);
        Ok(())
    }

    fn schedule_timer(self: &Arc<Self>, key: Key, ttl_secs: u64) {
        if let Some(old) = self.timers.lock().remove(&key) {
            old.abort();
        }
        let this = Arc::clone(self);
        let key_for_task = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(ttl_secs)).await;
            let (channel, path) = key_for_task;
            if let Err(e) = this.revoke(&channel, &path) {
                tracing::warn!(error = %e, channel, path = %path.display(), "auto-expiry revoke failed");
            }
        });
        self.timers.lock().insert(key, handle);
    }

    pub fn revoke(&self, channel: &str, path: &Path) -> Result<()> {
        let path = canonicalize_best_effort(path);
        let key: Key = (channel.to_string(), path.clone());
        if let Some(handle) = self.timers.lock().remove(&key) {
            handle.abort();
        }
        self.grants.lock().remove(&key);
        self.store.revoke_grant(channel, &path)?;
        Ok(())
    }

    pub fn revoke_all(&self, channel: &str) -> Result<()> {
        let keys: Vec<Key> = {
            let grants = self.grants.lock();
            grants
                .keys()
                .filter(|(c, _)| c == channel)
                .cloned()
                .collect()
        };
        for key in &keys {
            if let Some(handle) = self.timers.lock().remove(key) {
                handle.abort();
            }
            self.grants.lock().remove(key);
        }
        for grant in self.store.list_grants(channel)? {
            self.store.revoke_grant(channel, &grant.path)?;
        }
        Ok(())
    }

    /// Active grants for a channel, pruning (in memory only) any entries
    /// whose expiry has already passed — the background sweep owns durable
    /// deletion.
    pub fn active(&self, channel: &str) -> HashMap<PathBuf, Grant> {
        let now = Utc::now();
        let mut grants = self.grants.lock();
        grants.retain(|_, g| g.expires_at > now);
        grants
            .iter()
            .filter(|((c, _), _)| c == channel)
            .map(|((_, path), grant)| (path.clone(), *grant))
            .collect()
    }

    /// Reload grants for a channel from the durable store on startup,
    /// dropping anything already expired and rescheduling timers for the
    /// rest.
    pub fn restore(self: &Arc<Self>, channel: &str) -> Result<()> {
        let now = Utc::now();
        for row in self.store.list_grants(channel)? {
            if row.expires_at <= now {
                continue;
            }
            let key: Key = (row.channel.clone(), row.path.clone());
            self.grants.lock().insert(
                key.clone(),
                Grant {
                    mode: row.mode,
                    expires_at: row.expires_at,
                },
            );
            let ttl_secs = (row.expires_at - now).num_seconds().max(0) as u64;
            self.schedule_timer(key, ttl_secs);
        }
        Ok(())
    }

    /// Periodic background pass removing expired rows from the durable
    /// store (spec §4.7 sweepers). Intended to run once a minute.
    pub fn purge_expired(&self) -> Result<u64> {
        self.store.delete_expired_grants(Utc::now())
    }

    /// Is `path` covered by an unexpired grant for `channel` at `required`
    /// mode or stronger? A grant covers every path inside the directory it
    /// names, not just that exact path.
    pub fn check(&self, channel: &str, path: &Path, required: GrantMode) -> bool {
        let path = canonicalize_best_effort(path);
        let now = Utc::now();
        self.grants.lock().iter().any(|((c, granted_path), g)| {
            c == channel
                && g.expires_at > now
                && g.mode.satisfies(required)
                && (path == *granted_path || path.starts_with(granted_path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<Store> {
        Arc::new(Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn add_then_check_succeeds_within_ttl() {
        let grants = GrantStore::new(store());
        grants.add("chan-1", Path::new("/tmp/widgets/src"), GrantMode::Rw, 10).unwrap();
        assert!(grants.check("chan-1", Path::new("/tmp/widgets/src"), GrantMode::Ro));
        assert!(grants.check("chan-1", Path::new("/tmp/widgets/src"), GrantMode::Rw));
    }

    #[tokio::test]
    async fn ro_grant_does_not_satisfy_rw_requirement() {
        let grants = GrantStore::new(store());
        grants.add("chan-1", Path::new("/tmp/widgets/docs"), GrantMode::Ro, 10).unwrap();
        assert!(grants.check("chan-1", Path::new("/tmp/widgets/docs"), GrantMode::Ro));
        assert!(!grants.check("chan-1", Path::new("/tmp/widgets/docs"), GrantMode::Rw));
    }

    #[tokio::test]
    async fn revoke_removes_grant_immediately() {
        let grants = GrantStore::new(store());
        grants.add("chan-1", Path::new("/tmp/widgets/src"), GrantMode::Rw, 10).unwrap();
        grants.revoke("chan-1", Path::new("/tmp/widgets/src")).unwrap();
        assert!(!grants.check("chan-1", Path::new("/tmp/widgets/src"), GrantMode::Ro));
    }

    #[tokio::test]
    async fn revoke_all_clears_every_grant_for_channel() {
        let grants = GrantStore::new(store());
        grants.add("chan-1", Path::new("/tmp/widgets/a"), GrantMode::Ro, 10).unwrap();
        grants.add("chan-1", Path::new("/tmp/widgets/b"), GrantMode::Rw, 10).unwrap();
        grants.add("chan-2", Path::new("/tmp/other/a"), GrantMode::Ro, 10).unwrap();
        grants.revoke_all("chan-1").unwrap();
        assert!(grants.active("chan-1").is_empty());
        assert_eq!(grants.active("chan-2").len(), 1);
    }

    #[tokio::test]
    async fn restore_skips_already_expired_rows() {
        let backing = store();
        backing
            .upsert_grant(&GrantRecord {
                channel: "chan-1".into(),
                path: PathBuf::from("/tmp/widgets/stale"),
                mode: GrantMode::Ro,
                expires_at: Utc::now() - chrono::Duration::minutes(5),
            })
            .unwrap();
        backing
            .upsert_grant(&GrantRecord {
                channel: "chan-1".into(),
                path: PathBuf::from("/tmp/widgets/fresh"),
                mode: GrantMode::Rw,
                expires_at: Utc::now() + chrono::Duration::minutes(30),
            })
            .unwrap();
        let grants = GrantStore::new(backing);
        grants.restore("chan-1").unwrap();
        let active = grants.active("chan-1");
        assert_eq!(active.len(), 1);
        assert!(active.contains_key(&PathBuf::from("/tmp/widgets/fresh")));
    }

    #[tokio::test]
    async fn purge_expired_deletes_durable_rows() {
        let backing = store();
        backing
            .upsert_grant(&GrantRecord {
                channel: "chan-1".into(),
                path: PathBuf::from("/tmp/widgets/stale"),
                mode: GrantMode::Ro,
                expires_at: Utc::now() - chrono::Duration::minutes(5),
            })
            .unwrap();
        let grants = GrantStore::new(backing);
        let purged = grants.purge_expired().unwrap();
        assert_eq!(purged, 1);
    }
}
