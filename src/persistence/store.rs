//! 文件会话存储：每个会话一个 `<session_dir>/<session_id>.json`
//!
//! 写入先落到同目录的 `<path>.tmp`，再原子 rename 到目标路径；失败时删除临时文件。
//! 同一会话的并发写入是后写者胜出（rename 只保证文件不损坏）。

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use tokio::fs;

use crate::config::PersistenceSection;
use crate::core::PersistenceError;
use crate::persistence::SerializedSession;
use crate::session::CoordinatorSession;

const SESSION_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(section: &PersistenceSection) -> Self {
        Self::new(&section.session_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, PersistenceError> {
        let bad = session_id.is_empty()
            || session_id.contains(['/', '\\'])
            || session_id.starts_with('.');
        if bad {
            return Err(PersistenceError::Invalid {
                id: session_id.to_string(),
                issues: vec!["sessionId: not usable as a file name".to_string()],
            });
        }
        Ok(self.dir.join(format!("{session_id}.{SESSION_EXTENSION}")))
    }

    /// 保存会话，返回最终文件路径；目录不存在时自动创建
    pub async fn save(&self, session: &CoordinatorSession) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(&session.session_id)?;
        let serialized = SerializedSession::from_session(session)?;
        let json = serde_json::to_string_pretty(&serialized).map_err(|source| PersistenceError::Encode {
            id: session.session_id.clone(),
            source,
        })?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = fs::write(&tmp, json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PersistenceError::io(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PersistenceError::io(&path, e));
        }

        tracing::debug!(session_id = %session.session_id, status = %session.status, path = %path.display(), "session saved");
        Ok(path)
    }

    /// 文件不存在返回 Ok(None)；损坏或校验失败返回错误
    pub async fn load(&self, session_id: &str) -> Result<Option<CoordinatorSession>, PersistenceError> {
        let path = self.path_for(session_id)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::io(&path, e)),
        };
        let serialized: SerializedSession =
            serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt {
                id: session_id.to_string(),
                source,
            })?;
        serialized.into_session().map(Some)
    }

    /// 会话 ID 列表，按文件修改时间降序；非会话文件（含 .tmp）忽略
    pub async fn list(&self) -> Result<Vec<String>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut sessions: Vec<(SystemTime, String)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            sessions.push((modified, id.to_string()));
        }

        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(sessions.into_iter().map(|(_, id)| id).collect())
    }

    /// 返回文件是否存在并被删除
    pub async fn delete(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let path = self.path_for(session_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::io(&path, e)),
        }
    }

    /// 删除超过 max_age 的终态会话（按 end_time，缺省用 start_time）；
    /// 非终态会话无论多旧都保留，无法读取的文件跳过。返回实际删除数。
    pub async fn cleanup_old_sessions(&self, max_age: chrono::Duration) -> Result<usize, PersistenceError> {
        let cutoff = Utc::now() - max_age;
        let mut deleted = 0;

        for id in self.list().await? {
            let session = match self.load(&id).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "skipping unreadable session during cleanup");
                    continue;
                }
            };
            if !session.status.is_terminal() {
                continue;
            }
            let reference = session.end_time.unwrap_or(session.start_time);
            if reference >= cutoff {
                continue;
            }
            match self.delete(&id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(session_id = %id, error = %e, "failed to delete expired session"),
            }
        }

        tracing::info!(deleted, dir = %self.dir.display(), "session cleanup finished");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::core::SessionStatus;
    use crate::workers::{WorkerKind, WorkerResult, WorkerState};

    fn aged(status: SessionStatus, days: i64) -> CoordinatorSession {
        let mut session = CoordinatorSession::new("user-1", "household-1");
        session.start_time = Utc::now() - Duration::days(days) - Duration::hours(1);
        session.status = status;
        if status.is_terminal() {
            session.end_time = Some(Utc::now() - Duration::days(days));
        }
        session
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested"));
        let session = CoordinatorSession::new("user-1", "household-1");

        let path = store.save(&session).await.unwrap();
        assert!(path.ends_with(format!("{}.json", session.session_id)));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = store.load(&session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(
            loaded.start_time.timestamp_millis(),
            session.start_time.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_and_invalid_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load("broken").await,
            Err(PersistenceError::Corrupt { .. })
        ));

        let mut serialized = SerializedSession::from_session(&CoordinatorSession::new("u", "h")).unwrap();
        serialized.session_id = "bad-status".into();
        serialized.status = "purchased".into();
        std::fs::write(
            dir.path().join("bad-status.json"),
            serde_json::to_string(&serialized).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            store.load("bad-status").await,
            Err(PersistenceError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_sorted_by_mtime_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let older = CoordinatorSession::new("u", "h").with_id("older");
        let newer = CoordinatorSession::new("u", "h").with_id("newer");

        store.save(&older).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        store.save(&newer).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("half.json.tmp"), "{}").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = CoordinatorSession::new("u", "h");
        store.save(&session).await.unwrap();
        assert!(store.delete(&session.session_id).await.unwrap());
        assert!(!store.delete(&session.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("../escape").await.is_err());
        let session = CoordinatorSession::new("u", "h").with_id("a/b");
        assert!(store.save(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_old_terminal_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let old_done = aged(SessionStatus::Completed, 10).with_id("old-done");
        let fresh_done = aged(SessionStatus::Completed, 1).with_id("fresh-done");
        let old_live = aged(SessionStatus::LoadingCart, 10).with_id("old-live");
        let old_cancelled = aged(SessionStatus::Cancelled, 30).with_id("old-cancelled");
        for session in [&old_done, &fresh_done, &old_live, &old_cancelled] {
            store.save(session).await.unwrap();
        }
        std::fs::write(dir.path().join("garbage.json"), "][").unwrap();

        let deleted = store.cleanup_old_sessions(Duration::days(7)).await.unwrap();
        assert_eq!(deleted, 2);

        let mut remaining = store.list().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["fresh-done", "garbage", "old-live"]);
    }

    #[tokio::test]
    async fn test_opaque_worker_payload_loads_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = aged(SessionStatus::Completed, 10).with_id("opaque");
        let now = Utc::now();
        session.workers.set(
            WorkerKind::SlotScout,
            WorkerResult {
                name: "slot_scout".into(),
                success: true,
                state: WorkerState::Success,
                data: Some(json!({ "summary": null, "deliveryTime": "morning", "leadTime": 3 })),
                error: None,
                duration_ms: 4,
                attempts: 1,
                started_at: now,
                ended_at: now,
                logs: vec![],
                screenshots: vec![],
            },
        );
        store.save(&session).await.unwrap();

        let loaded = store.load("opaque").await.unwrap().unwrap();
        let data = loaded.workers.get(WorkerKind::SlotScout).unwrap().data.clone().unwrap();
        assert_eq!(data["deliveryTime"], "morning");
        assert_eq!(data["leadTime"], 3);

        let retention = PersistenceSection::default().retention();
        assert_eq!(store.cleanup_old_sessions(retention).await.unwrap(), 1);
        assert!(store.load("opaque").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::create_dir(dir.path().join("blocked.json")).unwrap();
        std::fs::write(dir.path().join("blocked.json").join("keep"), "x").unwrap();

        let session = CoordinatorSession::new("u", "h").with_id("blocked");
        assert!(matches!(
            store.save(&session).await,
            Err(PersistenceError::Io { .. })
        ));
        assert!(!dir.path().join("blocked.json.tmp").exists());
        assert!(dir.path().join("blocked.json").is_dir());
    }
}
