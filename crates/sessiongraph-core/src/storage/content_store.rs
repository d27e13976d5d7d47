//! Content Store
//!
//! Versioned, immutable node records on disk, partitioned by
//! `<nodes_dir>/<YYYY>/<MM>/<id>-v<version>.json`. Writes are atomic
//! (write to a temp file in the same directory, fsync, rename) so a crash
//! leaves a reader observing either the previous complete file or nothing,
//! never a torn write.

use crate::error::{Result, StorageError};
use crate::memory::Node;
use chrono::{Datelike, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A parsed content-store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecordPath {
    pub id: String,
    pub version: u32,
    pub year: u32,
    pub month: u32,
}

/// Parse and validate a content-store record path against the layout in
/// `<YYYY>/<MM>/<16hex-id>-v<ver>.json`. Returns `None` for anything that
/// doesn't match, rather than erroring — callers scanning a directory tree
/// should simply skip non-record files.
pub fn parse_record_path(path: &Path) -> Option<ParsedRecordPath> {
    let file_stem = path.file_stem()?.to_str()?;
    let ext_ok = path.extension().and_then(|e| e.to_str()) == Some("json");
    if !ext_ok {
        return None;
    }

    let (id_part, version_part) = file_stem.rsplit_once("-v")?;
    if !crate::id::is_valid_node_id(id_part) {
        return None;
    }
    let version: u32 = version_part.parse().ok()?;
    if version == 0 {
        return None;
    }

    let month_dir = path.parent()?;
    let month_str = month_dir.file_name()?.to_str()?;
    if month_str.len() != 2 || !month_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = month_str.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }

    let year_dir = month_dir.parent()?;
    let year_str = year_dir.file_name()?.to_str()?;
    if year_str.len() != 4 || !year_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: u32 = year_str.parse().ok()?;

    Some(ParsedRecordPath {
        id: id_part.to_string(),
        version,
        year,
        month,
    })
}

/// A single record version on disk.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub version: u32,
    pub path: PathBuf,
}

/// Versioned JSON content store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, node: &Node) -> PathBuf {
        let year = node.metadata.timestamp.year();
        let month = node.metadata.timestamp.month();
        self.root.join(format!("{year:04}")).join(format!("{month:02}"))
    }

    fn path_for(&self, node: &Node) -> PathBuf {
        self.dir_for(node)
            .join(format!("{}-v{}.json", node.id, node.version))
    }

    /// Write a node to its version-addressed path. Atomic: writes to a
    /// sibling temp file, fsyncs, then renames over the final path.
    pub fn write(&self, node: &Node) -> Result<PathBuf> {
        let dir = self.dir_for(node);
        fs::create_dir_all(&dir)?;
        let final_path = self.path_for(node);
        let tmp_path = dir.join(format!(".{}-v{}.json.tmp", node.id, node.version));

        let json = serde_json::to_vec_pretty(node)?;
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        Ok(final_path)
    }

    /// Read a record from an exact path, validating its shape.
    pub fn read_from_path(&self, path: &Path) -> Result<Node> {
        let bytes = fs::read(path)
            .map_err(|_| StorageError::NotFound(path.display().to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
    }

    /// Read a specific version, given the timestamp used to derive its
    /// year/month partition (normally the node's own `metadata.timestamp`).
    pub fn read(&self, id: &str, version: u32, timestamp: chrono::DateTime<Utc>) -> Result<Node> {
        let dir = self
            .root
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()));
        let path = dir.join(format!("{id}-v{version}.json"));
        self.read_from_path(&path)
    }

    pub fn exists(&self, id: &str, version: u32, timestamp: chrono::DateTime<Utc>) -> bool {
        self.read(id, version, timestamp).is_ok()
    }

    /// List every version of `id` present on disk, ascending by version.
    /// Scans the whole tree since a node's year/month partition is derived
    /// from its own timestamp and may span more than one if it was
    /// re-versioned across a month boundary.
    pub fn list_versions(&self, id: &str) -> Result<Vec<VersionEntry>> {
        let mut out = Vec::new();
        for path in self.list_all()? {
            if let Some(parsed) = parse_record_path(&path) {
                if parsed.id == id {
                    out.push(VersionEntry {
                        version: parsed.version,
                        path,
                    });
                }
            }
        }
        out.sort_by_key(|e| e.version);
        Ok(out)
    }

    /// Every record path under the store root, recursively.
    pub fn list_all(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for year_entry in fs::read_dir(&self.root)? {
            let year_entry = year_entry?;
            if !year_entry.file_type()?.is_dir() {
                continue;
            }
            for month_entry in fs::read_dir(year_entry.path())? {
                let month_entry = month_entry?;
                if !month_entry.file_type()?.is_dir() {
                    continue;
                }
                for file_entry in fs::read_dir(month_entry.path())? {
                    let file_entry = file_entry?;
                    let path = file_entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("json") {
                        out.push(path);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn get_latest_version(&self, id: &str) -> Result<Option<u32>> {
        Ok(self.list_versions(id)?.into_iter().map(|e| e.version).max())
    }

    pub fn read_latest(&self, id: &str) -> Result<Option<Node>> {
        let versions = self.list_versions(id)?;
        match versions.last() {
            Some(entry) => Ok(Some(self.read_from_path(&entry.path)?)),
            None => Ok(None),
        }
    }

    /// Bump `existing` to `existing.version + 1`, chaining `previousVersions`,
    /// apply `patch`, persist, and return the new node.
    pub fn create_new_version(&self, existing: &Node, patch: Node) -> Result<Node> {
        let mut next = patch;
        next.id = existing.id.clone();
        next.version = existing.version + 1;
        let mut previous = existing.previous_versions.clone();
        previous.push(format!("{}-v{}", existing.id, existing.version));
        next.previous_versions = previous;
        next.metadata.analyzed_at = Utc::now();
        self.write(&next)?;
        Ok(next)
    }
}
