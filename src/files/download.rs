//! Attachment downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};

use super::{confine, io_error};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::response::ContentType;

/// Sends `?file=<name>` from a directory as an attachment.
///
/// Missing or `..`-bearing names answer `400`, absent files `404`, permission
/// failures `403`, and directories or any other I/O failure `500`.
#[derive(Clone)]
pub struct FileDownloader {
    dir: Arc<PathBuf>,
}

impl FileDownloader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: Arc::new(dir.as_ref().to_path_buf()) }
    }
}

async fn download(dir: &Path, ctx: &mut Context) -> Result<(), Error> {
    let name = ctx.query_value("file").string()?;
    let path = confine(dir, &name)?;

    let meta = tokio::fs::metadata(&path).await.map_err(io_error)?;
    if meta.is_dir() {
        return Err(Error::Io(std::io::Error::other("path is a directory")));
    }
    let bytes = tokio::fs::read(&path).await.map_err(io_error)?;

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', ""))
        .unwrap_or_default();
    ctx.set_status(StatusCode::OK);
    ctx.set_content_type(ContentType::OctetStream);
    ctx.set_header(CONTENT_DISPOSITION.as_str(), &format!("attachment; filename=\"{base}\""));
    ctx.set_header(CONTENT_LENGTH.as_str(), &bytes.len().to_string());
    ctx.write_bytes(bytes);
    Ok(())
}

impl Handler for FileDownloader {
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a> {
        let dir = Arc::clone(&self.dir);
        Box::pin(async move {
            if let Err(e) = download(&dir, ctx).await {
                ctx.resp_error(&e);
            }
        })
    }
}
