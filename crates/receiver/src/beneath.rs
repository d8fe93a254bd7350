//! Path resolution that cannot leave the destination root.
//!
//! Entry paths are walked one component at a time from the root descriptor,
//! opening each intermediate directory with `O_NOFOLLOW`. A symlink anywhere
//! above the final component fails the walk with `ELOOP` (or `ENOTDIR`)
//! instead of redirecting it. The final component is then handed to a
//! `*at` call together with the parent descriptor, and those calls are made
//! with `AT_SYMLINK_NOFOLLOW` or `O_NOFOLLOW` where they take one.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Component, Path};

use rustix::fs::{Mode, OFlags, openat};

fn escapes(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{}: path leaves the destination root", path.display()),
    )
}

fn open_child(dir: BorrowedFd<'_>, name: &OsStr) -> io::Result<OwnedFd> {
    openat(
        dir,
        name,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(io::Error::from)
}

/// Splits `path` into its normal components, rejecting anything else.
fn normal_components(path: &Path) -> io::Result<Vec<&OsStr>> {
    let mut names = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => names.push(name),
            Component::CurDir => {}
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(escapes(path));
            }
        }
    }
    Ok(names)
}

fn walk<'a>(
    root: BorrowedFd<'_>,
    names: impl IntoIterator<Item = &'a OsStr>,
) -> io::Result<OwnedFd> {
    let mut dir = root.try_clone_to_owned()?;
    for name in names {
        dir = open_child(dir.as_fd(), name)?;
    }
    Ok(dir)
}

/// Opens the directory at `path` beneath `root`.
pub fn open_dir_beneath(root: BorrowedFd<'_>, path: &Path) -> io::Result<OwnedFd> {
    walk(root, normal_components(path)?)
}

/// Opens the parent of `path` beneath `root` and returns it with the final
/// component.
///
/// A path naming the root itself yields the root and `"."`.
pub fn parent_beneath(root: BorrowedFd<'_>, path: &Path) -> io::Result<(OwnedFd, OsString)> {
    let mut names = normal_components(path)?;
    let Some(last) = names.pop() else {
        return Ok((root.try_clone_to_owned()?, OsString::from(".")));
    };
    Ok((walk(root, names)?, last.to_os_string()))
}
