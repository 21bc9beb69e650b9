//! Control node access
//!
//! Every hardware write the engine issues goes through [`NodeWriter`]. Control nodes are
//! plain sysfs/devfs files: a write is a single open/write/close of an ASCII string.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::node::INDEXED_MARKERS;
use crate::error::{BoostError, Result};

/// Access to filesystem-backed control nodes
#[cfg_attr(test, mockall::automock)]
pub trait NodeWriter: Send + Sync {
    /// Whether the node exists on this SKU
    fn exists(&self, path: &Path) -> bool;

    /// Write `value` to the node in one shot
    fn write(&self, path: &Path, value: &str) -> Result<()>;

    /// Read the whole node
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Production writer backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysfsWriter;

impl NodeWriter for SysfsWriter {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        fs::write(path, value).map_err(|source| BoostError::FileWrite {
            path: path.to_path_buf(),
            value: value.to_string(),
            source,
        })
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|source| BoostError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// In-memory node tree that records every write in order
///
/// Backs `perfboostd --dry-run` and the arbitration tests.
#[derive(Debug, Default)]
pub struct MemoryNodes {
    present: Mutex<HashSet<PathBuf>>,
    contents: Mutex<Vec<(PathBuf, String)>>,
    writes: Mutex<Vec<(PathBuf, String)>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as present
    pub fn add_node(&self, path: impl Into<PathBuf>) {
        self.present.lock().insert(path.into());
    }

    /// Mark a node as present with readable content
    pub fn add_node_with_content(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        self.present.lock().insert(path.clone());
        self.contents.lock().push((path, content.into()));
    }

    /// Make writes to an existing node fail with an I/O error
    pub fn fail_writes(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// All writes so far, oldest first
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.lock().clone()
    }

    /// Values written to one node, oldest first
    pub fn writes_to(&self, path: &Path) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

impl NodeWriter for MemoryNodes {
    fn exists(&self, path: &Path) -> bool {
        self.present.lock().contains(path)
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        if !self.exists(path) {
            return Err(BoostError::NodeMissing(path.to_path_buf()));
        }
        if self.failing.lock().contains(path) {
            return Err(BoostError::FileWrite {
                path: path.to_path_buf(),
                value: value.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "write rejected"),
            });
        }
        debug!("dry-run write {} <- {:?}", path.display(), value);
        self.writes.lock().push((path.to_path_buf(), value.to_string()));
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.contents
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| BoostError::NodeMissing(path.to_path_buf()))
    }
}

/// Whether a node takes one indexed write per whitespace-separated token
pub fn is_indexed_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| INDEXED_MARKERS.iter().any(|m| name.contains(m)))
        .unwrap_or(false)
}

/// Write a member value, splitting it into `"<index> <token>"` writes for
/// overflow/underflow nodes
///
/// Returns the number of successful writes. Every token is attempted even if an
/// earlier one fails; the first error is returned after the sweep.
pub fn write_member_value(nodes: &dyn NodeWriter, path: &Path, value: &str) -> Result<usize> {
    if !is_indexed_node(path) {
        nodes.write(path, value)?;
        debug!("set {}: {}", path.display(), value);
        return Ok(1);
    }

    let mut written = 0;
    let mut first_error = None;
    for (index, token) in value.split_whitespace().enumerate() {
        match nodes.write(path, &format!("{} {}", index, token)) {
            Ok(()) => written += 1,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    debug!("set {} (indexed, {} tokens): {}", path.display(), written, value);

    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}
