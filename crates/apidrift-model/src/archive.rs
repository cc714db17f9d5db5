//! Definition of input archives and APIs.

use std::io::Read;
use std::sync::Arc;

/// An input artifact contributing elements to an API.
///
/// The kernel never interprets archive contents; archive analyzers read the
/// byte source to build a forest.
pub trait Archive: Send + Sync {
    /// Gets the logical name of the archive.
    ///
    /// The name is the archive's stable identity within a run and is recorded
    /// as element provenance.
    fn name(&self) -> &str;

    /// Opens the archive for reading.
    fn open(&self) -> std::io::Result<Box<dyn Read + '_>>;
}

/// An in-memory archive.
#[derive(Debug, Clone)]
pub struct BytesArchive {
    /// The logical name of the archive.
    name: String,
    /// The contents of the archive.
    bytes: Vec<u8>,
}

impl BytesArchive {
    /// Creates a new in-memory archive with the given name and contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl Archive for BytesArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.bytes.as_slice()))
    }
}

/// The role an archive plays within an API.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveRole {
    /// The archive is part of the API surface being compared.
    Primary,
    /// The archive only resolves references and is not itself part of the
    /// API.
    Supplementary,
}

/// Provenance information about an archive recorded in a forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// The logical name of the archive.
    name: String,
    /// The role of the archive.
    role: ArchiveRole,
}

impl ArchiveInfo {
    /// Creates new archive provenance information.
    pub fn new(name: impl Into<String>, role: ArchiveRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// Gets the logical name of the archive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the role of the archive.
    pub fn role(&self) -> ArchiveRole {
        self.role
    }
}

/// One side of a comparison: a set of primary archives plus a set of
/// supplementary archives used only to resolve references.
#[derive(Clone, Default)]
pub struct Api {
    /// The primary archives of the API.
    archives: Vec<Arc<dyn Archive>>,
    /// The supplementary archives of the API.
    supplementary: Vec<Arc<dyn Archive>>,
}

impl Api {
    /// Creates a new API with no archives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primary archive to the API.
    pub fn with_archive(mut self, archive: impl Archive + 'static) -> Self {
        self.archives.push(Arc::new(archive));
        self
    }

    /// Adds a supplementary archive to the API.
    pub fn with_supplementary(mut self, archive: impl Archive + 'static) -> Self {
        self.supplementary.push(Arc::new(archive));
        self
    }

    /// Gets the primary archives of the API.
    pub fn archives(&self) -> &[Arc<dyn Archive>] {
        &self.archives
    }

    /// Gets the supplementary archives of the API.
    pub fn supplementary(&self) -> &[Arc<dyn Archive>] {
        &self.supplementary
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field(
                "archives",
                &self.archives.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field(
                "supplementary",
                &self
                    .supplementary
                    .iter()
                    .map(|a| a.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
