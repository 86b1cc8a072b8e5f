use std::fmt;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Deterministic upload identifier for a local file.
///
/// Derived from the `(name, size, mtime)` triple as
/// `"{name}-{size}-{mtime}"`. The derivation is pure: the same triple always
/// yields the same identifier, across calls and process restarts. It is not
/// a content hash, so two different files sharing name, size and mtime get
/// the same identifier. The server may still assign its own canonical data
/// id on upload; callers must use the returned one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    /// Derive the identifier from the file's metadata on disk.
    ///
    /// # Errors
    ///
    /// Fails if the path has no file name component or its metadata can't
    /// be read.
    pub fn for_path(path: &Path) -> Result<Self, io::Error> {
        let name = file_name(path)?;
        let metadata = path.metadata()?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Ok(Self::from_parts(name, metadata.len(), mtime))
    }

    /// Pure core of the derivation, usable without touching the filesystem.
    #[must_use]
    pub fn from_parts(name: &str, size: u64, mtime_seconds: f64) -> Self {
        Self(format!("{name}-{size}-{mtime_seconds}"))
    }
}

/// UTF-8 file name component of a path.
///
/// # Errors
///
/// Fails with [`io::ErrorKind::InvalidInput`] when the path has no file
/// name component or it is not valid UTF-8.
pub fn file_name(path: &Path) -> Result<&str, io::Error> {
    path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {}", path.display()),
        )
    })
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}
