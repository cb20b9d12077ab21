//! Named template sets.
//!
//! [`TemplateEngine`] is the capability the [`Context`](crate::Context) needs:
//! render a template by name. [`JinjaEngine`] is the bundled implementation,
//! backed by `minijinja`, loading its set once from an explicit file list, a
//! glob pattern, or a [`VirtualFs`]. Templates are named by file name
//! (`templates/page.html` → `page.html`).

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{Environment, ErrorKind};
use tracing::debug;

use crate::error::Error;

/// Renders a named template into bytes.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Vec<u8>, Error>;
}

/// A read-only in-process filesystem templates can be loaded from.
pub trait VirtualFs {
    /// Every file path the filesystem contains.
    fn paths(&self) -> Vec<String>;
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;
}

/// [`VirtualFs`] over an in-memory map, for embedded or generated templates.
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl VirtualFs for MemoryFs {
    fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

/// `minijinja`-backed template set.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    /// Loads each file in `paths`.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        let mut engine = Self { env: Environment::new() };
        for path in paths {
            engine.load_file(path.as_ref())?;
        }
        Ok(engine)
    }

    /// Loads every file matching the glob `pattern`, e.g. `templates/*.html`.
    pub fn from_glob(pattern: &str) -> Result<Self, Error> {
        let paths = glob::glob(pattern).map_err(|e| Error::Template(e.to_string()))?;
        let mut engine = Self { env: Environment::new() };
        let mut loaded = 0;
        for path in paths {
            let path = path.map_err(|e| Error::Template(e.to_string()))?;
            if path.is_file() {
                engine.load_file(&path)?;
                loaded += 1;
            }
        }
        if loaded == 0 {
            return Err(Error::Template(format!("pattern `{pattern}` matches no files")));
        }
        Ok(engine)
    }

    /// Loads every file of `fs` whose path matches the glob `pattern`.
    pub fn from_vfs(fs: &dyn VirtualFs, pattern: &str) -> Result<Self, Error> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| Error::Template(e.to_string()))?;
        let mut engine = Self { env: Environment::new() };
        for path in fs.paths().into_iter().filter(|p| pattern.matches(p)) {
            let source = fs.read(&path)?;
            engine.add(template_name(Path::new(&path)), source)?;
        }
        Ok(engine)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), Error> {
        let source = std::fs::read(path)?;
        self.add(template_name(path), source)
    }

    fn add(&mut self, name: String, source: Vec<u8>) -> Result<(), Error> {
        let source = String::from_utf8(source)
            .map_err(|_| Error::Template(format!("template `{name}` is not UTF-8")))?;
        debug!(template = %name, "template loaded");
        self.env
            .add_template_owned(name, source)
            .map_err(|e| Error::Template(e.to_string()))
    }
}

fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Vec<u8>, Error> {
        let tmpl = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => Error::TemplateNotFound(name.to_owned()),
            _ => Error::Template(e.to_string()),
        })?;
        let out = tmpl
            .render(minijinja::Value::from_serialize(data))
            .map_err(|e| Error::Template(e.to_string()))?;
        Ok(out.into_bytes())
    }
}
