//! On-disk serialized thumbnail cache
//!
//! One PNG per asset plus an `index.json` mapping full names to files and
//! their dirty flags.

use crate::cache::{CacheError, ObjectThumbnail, ThumbnailCache};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    next_file: u64,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    #[serde(default)]
    dirty: bool,
}

pub struct DiskThumbnailCache {
    root: PathBuf,
    index: Mutex<CacheIndex>,
}

impl DiskThumbnailCache {
    /// Open (or create) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            serde_json::from_slice(&fs::read(&index_path)?)?
        } else {
            CacheIndex::default()
        };

        tracing::debug!(
            root = %root.display(),
            entries = index.entries.len(),
            "opened thumbnail cache"
        );

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self, index: &CacheIndex) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        fs::write(self.root.join(INDEX_FILE), bytes)?;
        Ok(())
    }
}

impl ThumbnailCache for DiskThumbnailCache {
    fn find(&self, full_name: &str) -> Option<ObjectThumbnail> {
        let entry = self.lock().entries.get(full_name).cloned()?;
        let path = self.root.join(&entry.file);

        let loaded = fs::read(&path)
            .map_err(CacheError::from)
            .and_then(|bytes| ObjectThumbnail::from_png(&bytes).map_err(CacheError::from));

        match loaded {
            Ok(mut thumbnail) => {
                if entry.dirty {
                    thumbnail.mark_dirty();
                }
                Some(thumbnail)
            }
            Err(err) => {
                tracing::warn!(asset = full_name, path = %path.display(), "unreadable cached thumbnail: {err}");
                None
            }
        }
    }

    fn store(&self, full_name: &str, thumbnail: ObjectThumbnail) -> Result<(), CacheError> {
        let png = thumbnail.to_png()?;
        let mut index = self.lock();

        let file = match index.entries.get(full_name) {
            Some(existing) => existing.file.clone(),
            None => {
                let file = format!("thumb_{:06}.png", index.next_file);
                index.next_file += 1;
                file
            }
        };

        fs::write(self.root.join(&file), png)?;
        index.entries.insert(
            full_name.to_string(),
            IndexEntry {
                file,
                dirty: thumbnail.is_dirty(),
            },
        );
        self.write_index(&index)
    }

    fn mark_dirty(&self, full_name: &str) -> bool {
        let mut index = self.lock();
        let Some(entry) = index.entries.get_mut(full_name) else {
            return false;
        };
        entry.dirty = true;

        if let Err(err) = self.write_index(&index) {
            tracing::warn!(asset = full_name, "failed to persist dirty flag: {err}");
        }
        true
    }

    fn dirty_names(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
