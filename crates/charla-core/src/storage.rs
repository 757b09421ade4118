//! Local key-value storage for named slots

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A client-local key-value medium. Each slot holds one opaque value.
pub trait Storage: Send {
    /// Read a slot's raw bytes. Returns `None` when the slot has never been
    /// written. Decoding is the caller's job.
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite a slot with `value`.
    fn set(&self, slot: &str, value: &[u8]) -> Result<()>;
}

/// Slots stored as `{dir}/{slot}.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{data_dir}/charla`, e.g. `~/.local/share/charla` on Linux
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("charla"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        let name: String = slot
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl Storage for FileStorage {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(slot);
        match fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read slot file: {}", path.display())),
        }
    }

    fn set(&self, slot: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory: {}", self.dir.display()))?;

        let path = self.slot_path(slot);
        fs::write(&path, value)
            .with_context(|| format!("Failed to write slot file: {}", path.display()))?;
        Ok(())
    }
}

/// In-process storage. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(slots.get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &[u8]) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        slots.insert(slot.to_string(), value.to_vec());
        Ok(())
    }
}
