//! File upload, file download and cached static-file serving.
//!
//! Every handler here resolves client-supplied names the same conservative
//! way: anything containing `..` is rejected, and what remains is reduced to
//! its final path component and joined onto the configured root. Only
//! immediate children of the root are reachable.

mod download;
mod mime;
mod static_resource;
mod upload;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

pub use self::download::FileDownloader;
pub use self::mime::default_content_types;
pub use self::static_resource::{StaticResourceBuilder, StaticResourceHandler};
pub use self::upload::{FileHeader, FileUploader};

/// `join(root, basename(name))`, refusing any name containing `..`.
pub(crate) fn confine(root: &Path, name: &str) -> Result<PathBuf, Error> {
    if name.contains("..") {
        return Err(Error::PathTraversal(name.to_owned()));
    }
    Ok(match Path::new(name).file_name() {
        Some(base) => root.join(base),
        None => root.to_path_buf(),
    })
}

/// Maps filesystem failures onto the file-serving error kinds.
pub(crate) fn io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound,
        io::ErrorKind::PermissionDenied => Error::Forbidden,
        _ => Error::Io(e),
    }
}

pub(crate) fn unix_secs(t: io::Result<SystemTime>) -> u64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}
