//! File-backed session store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{Conversation, SessionStore, StoreError, validate_session_id};
use crate::llm::Message;

/// Stores each conversation as `<base_path>/<session_id>.json`.
///
/// Writes go through a temp file, `fsync` and an atomic rename. A per-session
/// async mutex is held across every read-modify-write, so appends to the same
/// session never interleave while different sessions proceed independently.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    inner: Arc<FileSessionStoreInner>,
}

#[derive(Debug)]
struct FileSessionStoreInner {
    base_path: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileSessionStore {
    /// Create a store rooted at `base_path`. The directory is created lazily.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(FileSessionStoreInner {
                base_path: base_path.into(),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Directory holding the conversation files.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    fn conversation_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.inner.base_path.join(format!("{session_id}.json")))
    }

    fn key_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(guard.entry(session_id.to_string()).or_default())
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    fn release_key_lock(&self, session_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut guard = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard
            .get(session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            guard.remove(session_id);
        }
    }

    async fn load(&self, path: &Path) -> Result<Option<Conversation>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, path: &Path, conversation: &Conversation) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.inner.base_path).await?;

        let content = serde_json::to_vec_pretty(conversation)?;
        let tmp_path = self.inner.base_path.join(format!(
            ".{}.{}.tmp",
            conversation.id,
            uuid::Uuid::new_v4().simple()
        ));

        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&content).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let path = self.conversation_path(session_id)?;
        let lock = self.key_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.load(&path).await
        };
        self.release_key_lock(session_id, lock);
        Ok(result?.map(|c| c.messages).unwrap_or_default())
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<(), StoreError> {
        let path = self.conversation_path(session_id)?;
        let lock = self.key_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            match self.load(&path).await {
                Ok(existing) => {
                    let mut conversation =
                        existing.unwrap_or_else(|| Conversation::new(session_id));
                    conversation.push(message);
                    self.save(&path, &conversation).await
                }
                Err(e) => Err(e),
            }
        };
        self.release_key_lock(session_id, lock);
        result
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.conversation_path(session_id)?;
        let lock = self.key_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::from(e)),
            }
        };
        self.release_key_lock(session_id, lock);
        result
    }
}
