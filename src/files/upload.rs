//! Multipart uploads.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::HeaderMap;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::response::ContentType;

/// What the client said about an uploaded file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub file_name: String,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
}

type DstPathFn = Arc<dyn Fn(&FileHeader) -> PathBuf + Send + Sync>;
type FileNameFn = Arc<dyn Fn(&FileHeader) -> String + Send + Sync>;

struct Inner {
    field: String,
    dst_path: DstPathFn,
    file_name: Option<FileNameFn>,
}

/// Writes one multipart file field to disk.
///
/// ```rust,no_run
/// use weft::files::FileUploader;
///
/// let uploader = FileUploader::new("myfile", |h| format!("./uploads/{}", h.file_name).into())
///     .file_name_fn(|h| h.file_name.to_lowercase());
/// ```
///
/// A request without the field answers `400`; failing to create the parent
/// directory, open the destination or copy the stream answers `500`.
#[derive(Clone)]
pub struct FileUploader {
    inner: Arc<Inner>,
}

impl FileUploader {
    /// Uploads the form field `field` to the path `dst_path` computes.
    pub fn new(
        field: impl Into<String>,
        dst_path: impl Fn(&FileHeader) -> PathBuf + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { field: field.into(), dst_path: Arc::new(dst_path), file_name: None }),
        }
    }

    /// Renames the file before the destination path is computed.
    pub fn file_name_fn(self, f: impl Fn(&FileHeader) -> String + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                field: self.inner.field.clone(),
                dst_path: Arc::clone(&self.inner.dst_path),
                file_name: Some(Arc::new(f)),
            }),
        }
    }
}

impl Inner {
    async fn upload(&self, ctx: &mut Context) -> Result<PathBuf, UploadError> {
        let boundary = ctx
            .header(CONTENT_TYPE.as_str())
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| self.missing())?;
        let body = ctx.body().clone();
        let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut field = loop {
            match multipart.next_field().await {
                Ok(Some(f)) if f.name() == Some(self.field.as_str()) => break f,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Err(self.missing()),
            }
        };

        let mut header = FileHeader {
            file_name: field.file_name().unwrap_or_default().to_owned(),
            content_type: field.content_type().map(|m| m.to_string()),
            headers: field.headers().clone(),
        };
        if let Some(rename) = &self.file_name {
            header.file_name = rename(&header);
        }
        let dst = (self.dst_path)(&header);

        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dirs(parent).await.map_err(UploadError::Server)?;
        }
        let mut file = open_dst(&dst).await.map_err(UploadError::Server)?;
        while let Some(chunk) = field.chunk().await.map_err(|e| UploadError::Server(Error::Storage(e.to_string())))? {
            file.write_all(&chunk).await.map_err(|e| UploadError::Server(e.into()))?;
        }
        file.flush().await.map_err(|e| UploadError::Server(e.into()))?;
        Ok(dst)
    }

    fn missing(&self) -> UploadError {
        UploadError::Client(Error::MissingParameter(self.field.clone()))
    }
}

enum UploadError {
    Client(Error),
    Server(Error),
}

async fn create_dirs(dir: &Path) -> Result<(), Error> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder.create(dir).await.map_err(Error::from)
}

async fn open_dst(path: &Path) -> Result<tokio::fs::File, Error> {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o666);
    opts.open(path).await.map_err(Error::from)
}

impl Handler for FileUploader {
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            match inner.upload(ctx).await {
                Ok(dst) => {
                    debug!(dst = %dst.display(), "upload stored");
                    ctx.set_status(StatusCode::OK);
                    ctx.set_content_type(ContentType::Text);
                    ctx.write_string("upload success");
                }
                Err(UploadError::Client(e)) => ctx.resp_error(&e),
                Err(UploadError::Server(e)) => {
                    error!(error = %e, "upload failed");
                    ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    ctx.set_content_type(ContentType::Text);
                    ctx.write_string("upload failed");
                }
            }
        })
    }
}
