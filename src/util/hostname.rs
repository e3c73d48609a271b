//! Host identity lookup.

use std::path::Path;

use crate::collector::UNKNOWN_HOST;
use crate::collector::traits::FileSystem;

/// Resolves the host id stamped on snapshots.
///
/// Tries `<proc_root>/sys/kernel/hostname`, then the `HOSTNAME` environment
/// variable, then falls back to `unknown`.
pub fn resolve_host<F: FileSystem>(fs: &F, proc_root: &Path) -> String {
    resolve_host_from(fs, proc_root, std::env::var("HOSTNAME").ok())
}

fn resolve_host_from<F: FileSystem>(fs: &F, proc_root: &Path, env: Option<String>) -> String {
    let from_proc = fs
        .read_to_string(&proc_root.join("sys/kernel/hostname"))
        .ok()
        .map(|s| s.trim().to_string());

    from_proc
        .into_iter()
        .chain(env.map(|s| s.trim().to_string()))
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
