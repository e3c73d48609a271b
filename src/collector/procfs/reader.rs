//! Maps source kinds to files under a `/proc` root.

use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::{FileSystem, SourceReader};
use crate::storage::model::SourceKind;

/// Default mount point of the proc filesystem.
pub const DEFAULT_PROC_PATH: &str = "/proc";

/// Reads source kinds from a proc filesystem tree.
///
/// The root is configurable so the same reader works against a chroot,
/// a container's `/host/proc` mount, or a [`MockFs`](crate::collector::MockFs).
#[derive(Debug, Clone)]
pub struct ProcfsReader<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> ProcfsReader<F> {
    /// Creates a new reader.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `root` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Full path of the file backing `source`.
    pub fn path_for(&self, source: SourceKind) -> PathBuf {
        let relative = match source {
            SourceKind::Cpu => "stat",
            SourceKind::Memory => "meminfo",
            SourceKind::Network => "net/dev",
            SourceKind::Disk => "diskstats",
        };
        self.root.join(relative)
    }
}

impl<F: FileSystem> SourceReader for ProcfsReader<F> {
    fn read(&self, source: SourceKind) -> io::Result<String> {
        let path = self.path_for(source);
        self.fs.read_to_string(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })
    }
}
