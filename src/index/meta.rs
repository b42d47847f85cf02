//! Index metadata sidecar.
//!
//! The bucket file alone does not record how it was built. The sidecar
//! `<index_file>.meta` stores the layout parameters and the overflow
//! allocation counter as JSON so an index can be reopened safely.

use crate::config::KeyMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted description of an index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Number of home buckets
    pub bucket_count: u32,
    /// Key layout
    pub key_mode: KeyMode,
    /// Next overflow block number to allocate
    pub next_block: u32,
}

impl IndexMeta {
    /// Path of the sidecar belonging to `index_file`.
    pub fn path_for(index_file: &Path) -> PathBuf {
        let mut name = OsString::from(index_file.as_os_str());
        name.push(".meta");
        PathBuf::from(name)
    }

    /// Load the sidecar of `index_file`, if one exists.
    pub fn load(index_file: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(index_file);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(&path)?;
        let meta: IndexMeta = serde_json::from_slice(&raw)
            .map_err(|e| Error::corruption(format!("Failed to parse {:?}: {}", path, e)))?;
        Ok(Some(meta))
    }

    /// Write the sidecar of `index_file`, replacing any previous one.
    pub fn store(&self, index_file: &Path) -> Result<()> {
        let path = Self::path_for(index_file);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
