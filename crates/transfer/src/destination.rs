//! Preparation of the local destination file.
//!
//! [`ensure_distinct`] runs first for local sources, so replacing the
//! destination can never delete the data about to be read.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use tracing::debug;

/// Removes any existing file at `path` and creates a new empty one.
///
/// A missing file is not an error. Anything else that prevents removal, such
/// as `path` naming a directory, is returned unchanged.
pub fn prepare_destination(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: "fetchpipe::io", path = %path.display(), "removed existing destination");
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    debug!(target: "fetchpipe::io", path = %path.display(), "created destination");
    Ok(())
}

/// Fails with [`io::ErrorKind::InvalidInput`] when `source` and
/// `destination` name the same file.
///
/// A path that cannot be inspected never matches; opening it later reports
/// the real problem. A destination that is a symbolic link is compared as the
/// link itself, since replacing it leaves the target untouched.
pub fn ensure_distinct(source: &Path, destination: &Path) -> io::Result<()> {
    let (Ok(source_meta), Ok(destination_meta)) =
        (fs::metadata(source), fs::symlink_metadata(destination))
    else {
        return Ok(());
    };
    if same_file(source, &source_meta, destination, &destination_meta) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "source and destination are the same file: {}",
                destination.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn same_file(_: &Path, source: &fs::Metadata, _: &Path, destination: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    source.dev() == destination.dev() && source.ino() == destination.ino()
}

#[cfg(not(unix))]
fn same_file(
    source: &Path,
    _: &fs::Metadata,
    destination: &Path,
    destination_meta: &fs::Metadata,
) -> bool {
    if destination_meta.file_type().is_symlink() {
        return false;
    }
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}
