//! Source files handed to the pipeline.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// A named binary blob that can be read fully into memory.
pub trait SourceFile: Send + Sync {
    fn name(&self) -> &str;

    /// Declared media type, e.g. `application/pdf`.
    fn media_type(&self) -> &str;

    fn read_bytes(&self) -> BoxFuture<'_, io::Result<Vec<u8>>>;
}

/// What a caller hands to [`Extractor::extract_text`](crate::Extractor::extract_text).
#[derive(Clone)]
pub enum Input {
    File(Arc<dyn SourceFile>),
    /// A handle that is not file-like (a directory, a stream, ...).
    Other { description: String },
}

impl Input {
    pub fn file(file: impl SourceFile + 'static) -> Self {
        Input::File(Arc::new(file))
    }

    /// Classify a filesystem path.
    ///
    /// Directories and other non-regular entries become [`Input::Other`].
    /// Paths that cannot be inspected are still treated as files so that the
    /// read step reports the storage failure.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Input::Other {
                description: format!("{} is a directory", path.display()),
            },
            Ok(meta) if !meta.is_file() => Input::Other {
                description: format!("{} is not a regular file", path.display()),
            },
            _ => Input::file(LocalFile::new(path)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Input::File(file) => file.name(),
            Input::Other { description } => description,
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::File(file) => f
                .debug_struct("File")
                .field("name", &file.name())
                .field("media_type", &file.media_type())
                .finish(),
            Input::Other { description } => f
                .debug_struct("Other")
                .field("description", description)
                .finish(),
        }
    }
}

/// A file on the local filesystem, read asynchronously.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    media_type: String,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = guess_media_type(&path);
        Self {
            path,
            name,
            media_type,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn read_bytes(&self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        Box::pin(tokio::fs::read(&self.path))
    }
}

/// A file whose contents are already in memory.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl MemoryFile {
    /// Media type is guessed from `name`.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let media_type = guess_media_type(Path::new(&name));
        Self {
            name,
            media_type,
            bytes: bytes.into(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }
}

impl SourceFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn read_bytes(&self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        let bytes = self.bytes.to_vec();
        Box::pin(async move { Ok(bytes) })
    }
}

fn guess_media_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
