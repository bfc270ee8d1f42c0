use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{CursorStore, CursorStoreError};
use crate::types::ChatId;

/// Cursor store backed by a JSON object of `chat_id -> seq`.
///
/// Every write re-reads the file, applies the single-key change and atomically
/// replaces it, so two processes sharing the file only race per key.
pub struct FileCursorStore {
    path: PathBuf,
    cursors: RwLock<BTreeMap<ChatId, u64>>,
}

impl FileCursorStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CursorStoreError> {
        let path = path.into();
        let cursors = read_cursors(&path)?;
        debug!(path = %path.display(), entries = cursors.len(), "Opened cursor store");
        Ok(Self {
            path,
            cursors: RwLock::new(cursors),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modify(
        &self,
        apply: impl FnOnce(&mut BTreeMap<ChatId, u64>),
    ) -> Result<(), CursorStoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;

        let mut on_disk = read_cursors(&self.path)?;
        apply(&mut on_disk);
        write_cursors(&self.path, &on_disk)?;

        *cursors = on_disk;
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    fn get(&self, chat_id: &ChatId) -> Result<Option<u64>, CursorStoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        Ok(cursors.get(chat_id).copied())
    }

    fn set(&self, chat_id: &ChatId, value: u64) -> Result<(), CursorStoreError> {
        if value == 0 {
            return self.clear(chat_id);
        }
        self.modify(|cursors| {
            cursors.insert(chat_id.clone(), value);
        })
    }

    fn clear(&self, chat_id: &ChatId) -> Result<(), CursorStoreError> {
        self.modify(|cursors| {
            cursors.remove(chat_id);
        })
    }

    fn entries(&self) -> Result<Vec<(ChatId, u64)>, CursorStoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        Ok(cursors.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }
}

fn read_cursors(path: &Path) -> Result<BTreeMap<ChatId, u64>, CursorStoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(CursorStoreError::io(path, e)),
    };

    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str::<BTreeMap<ChatId, u64>>(&contents) {
        Ok(mut cursors) => {
            cursors.retain(|_, v| *v > 0);
            Ok(cursors)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to parse cursor file, starting from an empty store"
            );
            Ok(BTreeMap::new())
        }
    }
}

fn write_cursors(path: &Path, cursors: &BTreeMap<ChatId, u64>) -> Result<(), CursorStoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| CursorStoreError::io(&dir, e))?;

    let json = serde_json::to_string_pretty(cursors)
        .map_err(|e| CursorStoreError::serialization(e.to_string()))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CursorStoreError::io(&dir, e))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| CursorStoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CursorStoreError::io(path, e.error))?;
    Ok(())
}
