//! Static files with an in-memory LRU.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::StatusCode;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use lru::LruCache;
use tracing::debug;

use super::{confine, default_content_types, io_error, unix_secs};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler};

const DEFAULT_PATH_PARAM: &str = "file";
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
const DEFAULT_MAX_ENTRIES: usize = 1000;
const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000";

#[derive(Clone)]
struct CacheEntry {
    size: u64,
    content_type: String,
    bytes: Bytes,
    mtime: u64,
}

struct Inner {
    root: PathBuf,
    path_param: String,
    max_file_size: u64,
    content_types: HashMap<String, String>,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

/// Configures a [`StaticResourceHandler`].
pub struct StaticResourceBuilder {
    root: PathBuf,
    path_param: String,
    max_file_size: u64,
    max_entries: usize,
    content_types: HashMap<String, String>,
}

impl StaticResourceBuilder {
    /// Path parameter carrying the file name. Defaults to `file`.
    pub fn path_param(mut self, name: impl Into<String>) -> Self {
        self.path_param = name.into();
        self
    }

    /// Files of this size or larger are never cached. Defaults to 1 MiB.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Cache capacity in entries. Defaults to 1000; zero is treated as one.
    pub fn max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Adds or overrides the content type served for `ext` (no dot).
    pub fn extension_content_type(mut self, ext: &str, content_type: impl Into<String>) -> Self {
        self.content_types.insert(ext.to_ascii_lowercase(), content_type.into());
        self
    }

    pub fn build(self) -> StaticResourceHandler {
        let capacity = NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN);
        StaticResourceHandler {
            inner: Arc::new(Inner {
                root: self.root,
                path_param: self.path_param,
                max_file_size: self.max_file_size,
                content_types: self.content_types,
                cache: Mutex::new(LruCache::new(capacity)),
            }),
        }
    }
}

/// Serves immediate children of a root directory.
///
/// Register it on a route with a parameter named as configured:
///
/// ```rust,no_run
/// use weft::{Server, files::StaticResourceHandler};
///
/// let mut server = Server::new();
/// server.get("/static/{file}", StaticResourceHandler::new("./public")).unwrap();
/// ```
#[derive(Clone)]
pub struct StaticResourceHandler {
    inner: Arc<Inner>,
}

impl StaticResourceHandler {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::builder(root).build()
    }

    pub fn builder(root: impl AsRef<Path>) -> StaticResourceBuilder {
        StaticResourceBuilder {
            root: root.as_ref().to_path_buf(),
            path_param: DEFAULT_PATH_PARAM.to_owned(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
            content_types: default_content_types(),
        }
    }

    /// Number of cached files.
    pub fn cached_len(&self) -> usize {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether `name` is currently cached. Does not touch recency.
    pub fn is_cached(&self, name: &str) -> bool {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner).contains(name)
    }
}

impl Inner {
    async fn serve(&self, ctx: &mut Context) -> Result<(), Error> {
        let name = ctx.path_value(&self.path_param).string()?;
        let path = confine(&self.root, &name)?;
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::MissingParameter(self.path_param.clone()))?;
        let content_type = self.content_type(&path).ok_or_else(|| Error::UnsupportedFileType(key.clone()))?;

        let cached = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key).cloned();
        let entry = match cached {
            Some(entry) => {
                debug!(file = %key, "static cache hit");
                entry
            }
            None => {
                let entry = self.load(&path, content_type).await?;
                if entry.size < self.max_file_size {
                    debug!(file = %key, size = entry.size, "static cache fill");
                    self.cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .put(key, entry.clone());
                }
                entry
            }
        };

        write_entry(ctx, &entry);
        Ok(())
    }

    fn content_type(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.content_types.get(&ext).cloned()
    }

    async fn load(&self, path: &Path, content_type: String) -> Result<CacheEntry, Error> {
        let meta = tokio::fs::metadata(path).await.map_err(io_error)?;
        if meta.is_dir() {
            return Err(Error::Io(std::io::Error::other("path is a directory")));
        }
        let bytes = tokio::fs::read(path).await.map_err(io_error)?;
        Ok(CacheEntry {
            size: bytes.len() as u64,
            content_type,
            bytes: Bytes::from(bytes),
            mtime: unix_secs(meta.modified()),
        })
    }
}

fn write_entry(ctx: &mut Context, entry: &CacheEntry) {
    ctx.set_status(StatusCode::OK);
    ctx.set_header(CONTENT_TYPE.as_str(), &entry.content_type);
    ctx.set_header(CONTENT_LENGTH.as_str(), &entry.size.to_string());
    ctx.set_header(LAST_MODIFIED.as_str(), &entry.mtime.to_string());
    ctx.set_header(CACHE_CONTROL.as_str(), CACHE_CONTROL_VALUE);
    ctx.write_bytes(entry.bytes.clone());
}

impl Handler for StaticResourceHandler {
    fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if let Err(e) = inner.serve(ctx).await {
                ctx.resp_error(&e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    async fn get(handler: &StaticResourceHandler, name: &str) -> Context {
        let mut params = HashMap::new();
        params.insert("file".to_owned(), name.to_owned());
        let mut ctx = Context::new(http::Request::new(Bytes::new())).with_path_params(params);
        handler.call(&mut ctx).await;
        ctx
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("big.js"), "x".repeat(64)).unwrap();
        std::fs::write(dir.path().join("notes.unknownext"), "?").unwrap();
        std::fs::create_dir(dir.path().join("sub.css")).unwrap();
        dir
    }

    #[tokio::test]
    async fn serves_with_cache_headers() {
        let dir = fixture();
        let h = StaticResourceHandler::new(dir.path());
        let ctx = get(&h, "small.css").await;
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert_eq!(ctx.resp_data(), b"body{}");
        let headers = ctx.resp_headers();
        assert_eq!(headers["content-type"], "text/css; charset=utf-8");
        assert_eq!(headers["content-length"], "6");
        assert_eq!(headers["cache-control"], "public, max-age=31536000");
        assert!(headers["last-modified"].to_str().unwrap().parse::<u64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn hit_is_served_from_memory() {
        let dir = fixture();
        let h = StaticResourceHandler::new(dir.path());
        get(&h, "small.css").await;
        assert!(h.is_cached("small.css"));

        std::fs::remove_file(dir.path().join("small.css")).unwrap();
        let ctx = get(&h, "small.css").await;
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert_eq!(ctx.resp_data(), b"body{}");
    }

    #[tokio::test]
    async fn files_at_the_size_cap_bypass_the_cache() {
        let dir = fixture();
        let h = StaticResourceHandler::builder(dir.path()).max_file_size(64).build();
        let ctx = get(&h, "big.js").await;
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert!(!h.is_cached("big.js"));

        let h = StaticResourceHandler::builder(dir.path()).max_file_size(65).build();
        get(&h, "big.js").await;
        assert!(h.is_cached("big.js"));
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let dir = fixture();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let h = StaticResourceHandler::builder(dir.path()).max_entries(2).build();
        get(&h, "small.css").await;
        get(&h, "big.js").await;
        get(&h, "small.css").await;
        get(&h, "a.txt").await;
        assert_eq!(h.cached_len(), 2);
        assert!(h.is_cached("small.css"));
        assert!(!h.is_cached("big.js"));
    }

    #[tokio::test]
    async fn rejects_traversal_unknown_types_and_missing() {
        let dir = fixture();
        let h = StaticResourceHandler::new(dir.path());
        assert_eq!(get(&h, "../secret.css").await.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(get(&h, "notes.unknownext").await.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(get(&h, "absent.css").await.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(get(&h, "sub.css").await.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn overlay_enables_extensions() {
        let dir = fixture();
        let h = StaticResourceHandler::builder(dir.path())
            .extension_content_type("unknownext", "text/x-notes")
            .build();
        let ctx = get(&h, "notes.unknownext").await;
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert_eq!(ctx.resp_headers()["content-type"], "text/x-notes");
    }

    #[tokio::test]
    async fn subdirectory_names_are_flattened() {
        let dir = fixture();
        let h = StaticResourceHandler::new(dir.path());
        let ctx = get(&h, "nested/small.css").await;
        assert_eq!(ctx.resp_data(), b"body{}");
    }
}
