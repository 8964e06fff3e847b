use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use anyhow::Context as _;
use tracing::debug;

use crate::services::SelectionStore;

/// Durable key/value store backed by a single ron file, one per client
/// profile. Writes go to disk immediately; this is only touched on explicit
/// switch/add so there is no write pressure to batch for.
#[derive(Debug)]
pub struct FileSelectionStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileSelectionStore {
    /// A missing file is a fresh profile, not an error
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => {
                ron::from_str(&contents).with_context(|| {
                    format!("selection store at {path:?} is not valid ron")
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no selection store on disk yet, starting empty");
                HashMap::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read selection store at {path:?}"))
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().expect("mutex poisoned")
    }

    fn persist(&self, entries: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create folder for {:?}", self.path))?;
        }
        let contents = ron::to_string(entries).context("failed to serialize selection store")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write selection store at {:?}", self.path))
    }
}

impl SelectionStore for FileSelectionStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }
}
