use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{to_writer_pretty, Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{apply, select, StateStore, StorageItems, StorageKey, StoreError, StoreResult};

/// Store persisted as a single JSON document.
///
/// Every write rewrites the document into a temp file next to it and renames it
/// into place, so readers see either the old or the new document.
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<Map<String, Value>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|err| StoreError::Internal(err.to_string()))?
    }

    async fn write_document(&self, document: Map<String, Value>) -> StoreResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_document(&path, &document))
            .await
            .map_err(|err| StoreError::Internal(err.to_string()))?
    }
}

fn read_document(path: &Path) -> StoreResult<Map<String, Value>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(err.into()),
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Corrupt(format!(
            "{} does not hold a JSON object",
            path.display()
        ))),
        Err(err) => Err(StoreError::Corrupt(format!("{}: {err}", path.display()))),
    }
}

fn write_document(path: &Path, document: &Map<String, Value>) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut temp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        to_writer_pretty(&mut writer, document).map_err(|err| StoreError::Io(err.to_string()))?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| StoreError::Io(err.error.to_string()))?;
    debug!(target: "state-store", path = %path.display(), "store document written");
    Ok(())
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, keys: &[StorageKey]) -> StoreResult<StorageItems> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(select(&document, keys))
    }

    async fn set(&self, items: StorageItems) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        apply(&mut document, items);
        self.write_document(document).await
    }
}
