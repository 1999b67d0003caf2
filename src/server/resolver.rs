//! Resource resolution.
//!
//! The protocol engine never touches storage directly: it asks a
//! [`ResourceResolver`] what a request target refers to and hands uploads to
//! it. [`FsResolver`] is the filesystem-backed implementation used by the
//! binary: GET targets are served from a public directory, POST targets name
//! directories under a receive directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::config::ServerConfig;
use crate::http::headers::HeaderMap;
use crate::http::mime;
use crate::http::request::Method;

/// What a request target refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub exists: bool,
    pub is_directory: bool,
    /// The target is the top of the served tree.
    pub is_root: bool,
    pub content_type: String,
    pub last_modified: SystemTime,
    pub body: Vec<u8>,
}

impl Resolution {
    pub fn absent() -> Self {
        Self {
            exists: false,
            is_directory: false,
            is_root: false,
            content_type: String::new(),
            last_modified: UNIX_EPOCH,
            body: Vec::new(),
        }
    }

    pub fn directory(is_root: bool) -> Self {
        Self {
            exists: true,
            is_directory: true,
            is_root,
            ..Self::absent()
        }
    }

    pub fn file(content_type: impl Into<String>, last_modified: SystemTime, body: Vec<u8>) -> Self {
        Self {
            exists: true,
            content_type: content_type.into(),
            last_modified,
            body,
            ..Self::absent()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no such resource: {0}")]
    NotFound(String),
    #[error("not a writable directory: {0}")]
    WriteConflict(String),
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

/// The storage collaborator of the protocol engine.
pub trait ResourceResolver: Send + Sync {
    /// Describes the resource a request targets.
    fn resolve(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Resolution, ResolveError>;

    /// Stores an already decoded upload under the directory `path` names and
    /// returns the stored location as a request target.
    fn write(&self, path: &str, content_type: &str, body: &[u8]) -> Result<String, ResolveError>;
}

/// Serves files from `public_dir` and stores uploads under `receive_dir`.
#[derive(Debug, Clone)]
pub struct FsResolver {
    public_dir: PathBuf,
    receive_dir: PathBuf,
}

impl FsResolver {
    pub fn new(public_dir: impl Into<PathBuf>, receive_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
            receive_dir: receive_dir.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.public_dir, &config.receive_dir)
    }

    pub fn receive_dir(&self) -> &Path {
        &self.receive_dir
    }

    /// Creates the receive directory if it does not exist yet.
    pub fn ensure_receive_dir(&self) -> io::Result<()> {
        if !self.receive_dir.exists() {
            fs::create_dir_all(&self.receive_dir)?;
            info!(dir = %self.receive_dir.display(), "created receive directory");
        }
        Ok(())
    }

    fn resolve_get(&self, path: &str) -> Result<Resolution, ResolveError> {
        let Some(relative) = relative_path(path) else {
            return Ok(Resolution::absent());
        };
        let full = self.public_dir.join(&relative);

        let metadata = match fs::metadata(&full) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Resolution::absent()),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            return Ok(Resolution::directory(relative.as_os_str().is_empty()));
        }

        let last_modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        let body = fs::read(&full)?;
        Ok(Resolution::file(
            mime::content_type_for_path(&full),
            last_modified,
            body,
        ))
    }

    fn resolve_post(&self, path: &str) -> Result<Resolution, ResolveError> {
        self.ensure_receive_dir()?;

        let Some(relative) = relative_path(path) else {
            return Ok(Resolution::absent());
        };
        let full = self.receive_dir.join(&relative);

        match fs::metadata(&full) {
            Ok(metadata) if metadata.is_dir() => {
                Ok(Resolution::directory(relative.as_os_str().is_empty()))
            }
            Ok(metadata) => Ok(Resolution::file(
                mime::content_type_for_path(&full),
                metadata.modified().unwrap_or_else(|_| SystemTime::now()),
                Vec::new(),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Resolution::absent()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps a request target onto a relative path, dropping any query string.
///
/// Returns `None` for targets that would escape the served tree.
fn relative_path(target: &str) -> Option<PathBuf> {
    let path = target.split(['?', '#']).next().unwrap_or_default();

    let mut relative = PathBuf::new();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(relative)
}

/// Milliseconds since the epoch, used to name uploads.
fn received_at_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

impl ResourceResolver for FsResolver {
    fn resolve(
        &self,
        method: Method,
        path: &str,
        _headers: &HeaderMap,
    ) -> Result<Resolution, ResolveError> {
        match method {
            Method::GET => self.resolve_get(path),
            Method::POST => self.resolve_post(path),
        }
    }

    fn write(&self, path: &str, content_type: &str, body: &[u8]) -> Result<String, ResolveError> {
        self.ensure_receive_dir()?;

        let relative = relative_path(path).ok_or_else(|| ResolveError::NotFound(path.to_string()))?;
        let dir = self.receive_dir.join(&relative);
        if !dir.exists() {
            return Err(ResolveError::NotFound(path.to_string()));
        }
        if !dir.is_dir() {
            return Err(ResolveError::WriteConflict(path.to_string()));
        }

        let stamp = received_at_millis();
        let extension = mime::extension_for_content_type(content_type);

        let mut attempt = 0u32;
        let (filename, mut file) = loop {
            let filename = if attempt == 0 {
                format!("{stamp}.{extension}")
            } else {
                format!("{stamp}-{attempt}.{extension}")
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&filename))
            {
                Ok(file) => break (filename, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        file.write_all(body)?;
        file.sync_all()?;

        let stored = dir.join(&filename);
        info!(file = %stored.display(), bytes = body.len(), "stored upload");

        let base = path.split(['?', '#']).next().unwrap_or_default().trim_end_matches('/');
        Ok(format!("{base}/{filename}"))
    }
}
