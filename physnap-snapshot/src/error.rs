use std::error::Error;

use physnap_dna::DnaError;
use thiserror::Error;

/// The kind of a [`SnapshotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SnapshotErrorKind {
    /// The output buffer cannot hold the requested chunk.
    #[error("snapshot buffer capacity exceeded")]
    CapacityExceeded,

    /// A chunk was finalized with a struct type missing from the catalog.
    #[error("struct type not found in catalog")]
    UnknownStructType,

    /// The session has not been started.
    #[error("snapshot session not started")]
    SessionNotStarted,

    /// The session was started twice.
    #[error("snapshot session already started")]
    SessionAlreadyStarted,

    /// The session has already been ended.
    #[error("snapshot session already finished")]
    SessionFinished,

    /// The previously allocated chunk has not been finalized.
    #[error("previous chunk was not finalized")]
    UnfinalizedChunk,

    /// The chunk handle does not belong to the pending chunk of this serializer.
    #[error("chunk handle does not refer to the pending chunk")]
    ForeignChunk,

    /// The chunk code is reserved for the catalog trailer.
    #[error("reserved chunk code")]
    ReservedChunkCode,

    /// A length or count does not fit the chunk header.
    #[error("value too large for chunk header")]
    ValueTooLarge,

    /// An original address does not fit the pointer model of the snapshot.
    #[error("original address exceeds the pointer width")]
    AddressTooWide,

    /// The catalog does not match the pointer model or byte order of the snapshot.
    #[error("catalog does not match snapshot layout")]
    CatalogMismatch,

    /// The catalog could not be loaded.
    #[error("invalid catalog")]
    Catalog,

    /// The snapshot header is malformed.
    #[error("invalid snapshot header")]
    BadHeader,

    /// A chunk header or payload is malformed or truncated.
    #[error("invalid chunk")]
    BadChunk,

    /// Writing the snapshot failed.
    #[error("failed to write snapshot")]
    WriteFailed,
}

/// An error returned when writing or inspecting a snapshot.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct SnapshotError {
    pub(crate) kind: SnapshotErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl SnapshotError {
    /// Creates a new snapshot error from a known kind of error as well as an arbitrary error
    /// payload.
    pub fn new<E>(kind: SnapshotErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`SnapshotErrorKind`] for this error.
    pub fn kind(&self) -> SnapshotErrorKind {
        self.kind
    }
}

impl From<SnapshotErrorKind> for SnapshotError {
    fn from(kind: SnapshotErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<DnaError> for SnapshotError {
    fn from(source: DnaError) -> Self {
        Self::new(SnapshotErrorKind::Catalog, source)
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(source: std::io::Error) -> Self {
        Self::new(SnapshotErrorKind::WriteFailed, source)
    }
}

impl From<scroll::Error> for SnapshotError {
    fn from(source: scroll::Error) -> Self {
        Self::new(SnapshotErrorKind::BadChunk, source)
    }
}
