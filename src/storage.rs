use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Result, ClipForgeError};
use crate::session::Session;

/// Persistence seam for session records. The pipeline persists after every
/// phase so a crash leaves a resumable record behind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or fully replace the record for `session.id`.
    async fn upsert(&self, session: &Session) -> Result<()>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// All stored sessions, ordered by id.
    async fn list(&self) -> Result<Vec<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Stores each session as one pretty-printed JSON file under the store
/// directory, named `{id}.json`.
pub struct FileSessionStore {
    store_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.store_dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn upsert(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.store_dir)?;
        let path = self.session_path(&session.id);
        let json = serde_json::to_string_pretty(session)?;

        // Write to a sibling temp file first so a crash mid-write cannot
        // truncate an existing record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Persisted session {} to {}", session.id, path.display());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        let session = serde_json::from_str(&json).map_err(|e| {
            ClipForgeError::Storage(format!(
                "Corrupt session record {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(session))
    }

    async fn list(&self) -> Result<Vec<Session>> {
        if !self.store_dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.store_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Session>(&json) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    return Err(ClipForgeError::Storage(format!(
                        "Corrupt session record {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.session_path(id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use chrono::Utc;

    fn sample(id: &str) -> Session {
        Session::new(
            id.to_string(),
            format!("Session {}", id),
            PathBuf::from(format!("/tmp/{}", id)),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut session = sample("2024-March-Inception");
        session.status = SessionStatus::Transcribing;
        store.upsert(&session).await.unwrap();

        let loaded = store
            .get_by_id("2024-March-Inception")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "Session 2024-March-Inception");
        assert_eq!(loaded.status, SessionStatus::Transcribing);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut session = sample("s1");
        store.upsert(&session).await.unwrap();
        session.status = SessionStatus::Complete;
        store.upsert(&session).await.unwrap();

        let loaded = store.get_by_id("s1").await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Complete);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.upsert(&sample("b")).await.unwrap();
        store.upsert(&sample("a")).await.unwrap();
        store.upsert(&sample("c")).await.unwrap();

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        assert!(matches!(
            store.get_by_id("bad").await,
            Err(ClipForgeError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.upsert(&sample("s1")).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.get_by_id("s1").await.unwrap().is_none());
        // deleting again is a no-op
        store.delete("s1").await.unwrap();
    }
}
