use std::error::Error;

use thiserror::Error;

/// The kind of a [`DnaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DnaErrorKind {
    /// A section tag is missing or does not match the expected section.
    #[error("missing or mismatched section tag")]
    BadTag,
    /// The catalog ends in the middle of a section.
    #[error("catalog data is truncated")]
    Truncated,
    /// A type or field name is not a valid name.
    #[error("invalid name in catalog")]
    BadString,
    /// A section count is negative.
    #[error("invalid section count")]
    BadCount,
    /// A struct descriptor refers to a type that does not exist.
    #[error("type index out of range")]
    BadTypeIndex,
    /// A struct descriptor refers to a field name that does not exist.
    #[error("field name index out of range")]
    BadNameIndex,
    /// A field was declared with a type that is not part of the catalog.
    #[error("unknown field type")]
    UnknownType,
    /// A type was declared twice.
    #[error("duplicate type")]
    DuplicateType,
    /// The fields of a struct do not add up to its declared length.
    #[error("struct length does not match its fields")]
    BadStructLength,
    /// A size, index or count does not fit the catalog format.
    #[error("value too large for catalog format")]
    ValueTooLarge,
    /// The catalog was produced for a different pointer model.
    #[error("catalog does not match the pointer width")]
    PointerWidthMismatch,
    /// Writing the catalog failed.
    #[error("failed to write catalog")]
    WriteFailed,
}

/// An error encountered while parsing or building a [`Catalog`](crate::Catalog).
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DnaError {
    pub(crate) kind: DnaErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DnaError {
    /// Creates a new catalog error from a known kind of error as well as an arbitrary error
    /// payload.
    pub fn new<E>(kind: DnaErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DnaErrorKind`] for this error.
    pub fn kind(&self) -> DnaErrorKind {
        self.kind
    }
}

impl From<DnaErrorKind> for DnaError {
    fn from(kind: DnaErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<scroll::Error> for DnaError {
    fn from(source: scroll::Error) -> Self {
        Self::new(DnaErrorKind::Truncated, source)
    }
}

impl From<std::io::Error> for DnaError {
    fn from(source: std::io::Error) -> Self {
        Self::new(DnaErrorKind::WriteFailed, source)
    }
}
