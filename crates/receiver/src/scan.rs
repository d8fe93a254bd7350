//! Local enumeration of the destination tree.

use std::fs;
use std::path::{Path, PathBuf};

use logging::debug_log;

use crate::error::{ReceiverError, ReceiverResult};

/// One entry found under the destination root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalEntry {
    /// Path relative to the root.
    pub path: PathBuf,
    /// The entry is a directory (symlinks are never followed).
    pub is_dir: bool,
}

/// Walks `root` depth-first, parents before children, names sorted bytewise.
///
/// The root itself is not included. A missing root yields an empty list.
pub fn scan_destination(root: &Path) -> ReceiverResult<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    match fs::symlink_metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(entries),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(err) => return Err(ReceiverError::filesystem("scan", root, err)),
    }

    debug_log!(Flist, 1, "scanning local files under {}", root.display());
    visit(root, Path::new(""), &mut entries)?;
    debug_log!(Flist, 2, "found {} local entries", entries.len());
    Ok(entries)
}

fn visit(dir: &Path, relative: &Path, out: &mut Vec<LocalEntry>) -> ReceiverResult<()> {
    let read = fs::read_dir(dir).map_err(|err| ReceiverError::filesystem("scan", dir, err))?;
    let mut children = Vec::new();
    for child in read {
        let child = child.map_err(|err| ReceiverError::filesystem("scan", dir, err))?;
        children.push(child.file_name());
    }
    children.sort();

    for name in children {
        let full = dir.join(&name);
        let rel = relative.join(&name);
        let meta =
            fs::symlink_metadata(&full).map_err(|err| ReceiverError::filesystem("scan", &full, err))?;
        let is_dir = meta.is_dir();
        debug_log!(Flist, 4, "local entry: {}", rel.display());
        out.push(LocalEntry {
            path: rel.clone(),
            is_dir,
        });
        if is_dir {
            visit(&full, &rel, out)?;
        }
    }
    Ok(())
}
