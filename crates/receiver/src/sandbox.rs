//! Process capability restriction and filesystem confinement.
//!
//! The receiver restricts itself once, before it touches the destination, and
//! confines itself to the destination root before the event loop starts.
//!
//! [`ProcessSandbox`] enforces neither call with a kernel primitive beyond
//! `no_new_privs`. Confinement to the root holds because every filesystem
//! operation resolves its path component by component from the root
//! descriptor without following symlinks (see `beneath`), and the run
//! itself only performs the operations its [`CapabilityMode`] allows.

use std::io;
use std::path::{Path, PathBuf};

use logging::debug_log;

use crate::config::ReceiverConfig;

/// Capabilities the receiver still needs after restriction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CapabilityMode {
    /// Create files and directories.
    pub create: bool,
    /// Write file content.
    pub write: bool,
    /// Change times and modes.
    pub set_attributes: bool,
    /// Remove entries.
    pub unlink: bool,
}

impl CapabilityMode {
    /// Capabilities needed by a run with `config`.
    ///
    /// A dry run needs none of them.
    pub const fn for_config(config: &ReceiverConfig) -> Self {
        let writes = !config.dry_run;
        Self {
            create: writes,
            write: writes,
            // New files and directories always get a mode fixup.
            set_attributes: writes,
            unlink: writes && config.deletion_enabled(),
        }
    }
}

/// Restriction hooks invoked by the orchestrator.
pub trait Sandbox {
    /// Restricts the process to the capabilities in `mode`. Called exactly
    /// once, first.
    fn restrict_capabilities(&mut self, mode: CapabilityMode) -> io::Result<()>;

    /// Confines filesystem visibility to `root`.
    fn confine_to(&mut self, root: &Path) -> io::Result<()>;
}

/// Sandbox for the current process.
///
/// On Linux, restriction sets `no_new_privs` so nothing executed later can
/// regain privileges. The requested [`CapabilityMode`] and the confinement
/// root are only recorded; no syscall filter is installed for them.
#[derive(Debug, Default)]
pub struct ProcessSandbox {
    mode: Option<CapabilityMode>,
    root: Option<PathBuf>,
}

impl ProcessSandbox {
    /// Capabilities recorded by [`Sandbox::restrict_capabilities`].
    pub const fn mode(&self) -> Option<CapabilityMode> {
        self.mode
    }

    /// Root recorded by [`Sandbox::confine_to`].
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

impl Sandbox for ProcessSandbox {
    fn restrict_capabilities(&mut self, mode: CapabilityMode) -> io::Result<()> {
        if self.mode.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "capabilities already restricted",
            ));
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        rustix::thread::set_no_new_privs(true).map_err(io::Error::from)?;

        debug_log!(Proto, 1, "restricted capabilities: {:?}", mode);
        self.mode = Some(mode);
        Ok(())
    }

    fn confine_to(&mut self, root: &Path) -> io::Result<()> {
        if self.mode.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "confinement requested before capability restriction",
            ));
        }
        debug_log!(Proto, 1, "confined to {}", root.display());
        self.root = Some(root.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlink_only_when_deleting() {
        let plain = CapabilityMode::for_config(&ReceiverConfig::default());
        assert!(!plain.unlink);
        assert!(plain.create && plain.write && plain.set_attributes);

        let deleting = CapabilityMode::for_config(
            &ReceiverConfig::default()
                .with_delete(true)
                .with_recursive(true),
        );
        assert!(deleting.unlink);

        let dry = CapabilityMode::for_config(
            &ReceiverConfig::default()
                .with_delete(true)
                .with_recursive(true)
                .with_dry_run(true),
        );
        assert_eq!(dry, CapabilityMode::default());
    }

    #[test]
    fn restriction_happens_once_and_before_confinement() {
        let mut sandbox = ProcessSandbox::default();
        assert!(sandbox.confine_to(Path::new("/dest")).is_err());

        sandbox
            .restrict_capabilities(CapabilityMode::default())
            .unwrap();
        assert!(sandbox
            .restrict_capabilities(CapabilityMode::default())
            .is_err());

        sandbox.confine_to(Path::new("/dest")).unwrap();
        assert_eq!(sandbox.root(), Some(Path::new("/dest")));
        assert_eq!(sandbox.mode(), Some(CapabilityMode::default()));
    }
}
