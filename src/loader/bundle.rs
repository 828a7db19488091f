//! In-memory index over a packed configuration bundle.
//!
//! Bundles are gzip-compressed tar archives. Unpacking builds a fresh index;
//! loaders swap the whole index, so readers never observe a half-unpacked bundle.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;

use crate::loader::{normalize_path, Resource};

/// Upper bound on buffer capacity reserved from an entry's header size.
/// Header sizes are untrusted; larger entries grow as they are read.
const MAX_PREALLOCATION: u64 = 64 * 1024;

/// Immutable path → bytes index of one bundle.
#[derive(Debug, Default)]
pub struct BundleIndex {
    origin: String,
    entries: HashMap<String, Arc<[u8]>>,
}

impl BundleIndex {
    /// Unpack a `.tar.gz` byte bundle. `origin` prefixes resource locations.
    pub fn unpack(bytes: &[u8], origin: impl Into<String>) -> std::io::Result<Self> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut entries = HashMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let raw_path = entry.path()?.to_string_lossy().into_owned();
            let Some(path) = normalize_path(&raw_path) else {
                tracing::warn!(entry = %raw_path, "Skipping bundle entry outside bundle root");
                continue;
            };
            let declared = entry.size();
            let mut data = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
            entry.read_to_end(&mut data)?;
            if data.len() as u64 != declared {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "bundle entry {raw_path} declares {declared} bytes but holds {}",
                        data.len()
                    ),
                ));
            }
            entries.insert(path, Arc::from(data));
        }

        Ok(Self {
            origin: origin.into(),
            entries,
        })
    }

    pub fn get(&self, path: &str) -> Option<Resource> {
        self.entries.get(path).map(|data| {
            Resource::new(path, format!("{}!/{}", self.origin, path), Arc::clone(data))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
