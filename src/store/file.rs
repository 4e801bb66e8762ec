//! JSON file backing for the shared store.
//!
//! The whole key map is one JSON object. Writes go to a temp file in the same
//! directory and are renamed over the target, so readers never observe a
//! half-written file. Concurrent writers simply race: the last rename wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;

use super::StoreError;

/// Identity of the file contents last seen by this process.
pub(super) type FileStamp = (SystemTime, u64);

pub(super) struct StoreFile {
    path: PathBuf,
    stamp: Option<FileStamp>,
}

impl StoreFile {
    pub(super) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            stamp: None,
        }
    }

    pub(super) fn with_stamp(mut self, stamp: Option<FileStamp>) -> Self {
        self.stamp = stamp;
        self
    }

    pub(super) fn set_stamp(&mut self, stamp: Option<FileStamp>) {
        self.stamp = stamp;
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    fn current_stamp(&self) -> Result<Option<FileStamp>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let modified = meta
                    .modified()
                    .map_err(|e| StoreError::Io(self.path.clone(), e))?;
                Ok(Some((modified, meta.len())))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(self.path.clone(), e)),
        }
    }

    /// Read the full map. Missing file reads as empty.
    pub(super) fn load(&self) -> Result<(BTreeMap<String, Value>, Option<FileStamp>), StoreError> {
        let stamp = self.current_stamp()?;
        if stamp.is_none() {
            return Ok((BTreeMap::new(), None));
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| StoreError::Io(self.path.clone(), e))?;
        if content.trim().is_empty() {
            return Ok((BTreeMap::new(), stamp));
        }
        let values = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(self.path.clone(), e))?;
        Ok((values, stamp))
    }

    /// Read only if the file changed since the last load or write.
    pub(super) fn load_if_changed(
        &self,
    ) -> Result<Option<(BTreeMap<String, Value>, Option<FileStamp>)>, StoreError> {
        if self.current_stamp()? == self.stamp {
            return Ok(None);
        }
        self.load().map(Some)
    }

    /// Atomically replace the file with `values`.
    pub(super) fn write(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> Result<Option<FileStamp>, StoreError> {
        let io_err = |e| StoreError::Io(self.path.clone(), e);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(values)
            .map_err(|e| StoreError::Encode(self.path.display().to_string(), e))?;

        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        self.current_stamp()
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }
}
