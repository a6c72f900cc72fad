//! Defines the [`SnapshotHeader`] opening every snapshot.

use std::fmt;

use physnap_common::{Endianness, PointerWidth, Precision};

use crate::raw::{HEADER_LENGTH, VERSION};
use crate::{SnapshotError, SnapshotErrorKind};

/// The fixed header opening every snapshot.
///
/// The twelve header bytes are fully determined by the numeric precision, the pointer model and
/// the byte order of the snapshot.
///
/// # Example
///
/// ```
/// use physnap_common::{Endianness, PointerWidth, Precision};
/// use physnap_snapshot::SnapshotHeader;
///
/// let header = SnapshotHeader::new(Precision::Single, PointerWidth::Eight, Endianness::Little);
/// assert_eq!(&header.to_bytes(), b"BULLETf-v276");
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SnapshotHeader {
    /// Numeric precision of the serialized simulation.
    pub precision: Precision,
    /// Pointer model of the producing process.
    pub pointer_width: PointerWidth,
    /// Byte order of all integers in the snapshot.
    pub endianness: Endianness,
}

impl SnapshotHeader {
    /// Creates a new header.
    pub fn new(precision: Precision, pointer_width: PointerWidth, endianness: Endianness) -> Self {
        Self {
            precision,
            pointer_width,
            endianness,
        }
    }

    /// Returns the header bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut bytes = [0u8; HEADER_LENGTH];
        bytes[..7].copy_from_slice(self.precision.format_tag());
        bytes[7] = self.pointer_width.marker();
        bytes[8] = self.endianness.marker();
        bytes[9..].copy_from_slice(&VERSION);
        bytes
    }

    /// Parses the header at the start of a snapshot.
    pub fn parse(data: &[u8]) -> Result<Self, SnapshotError> {
        let bytes = data
            .get(..HEADER_LENGTH)
            .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::BadHeader, "header truncated"))?;

        let precision = Precision::from_format_tag(&bytes[..7])
            .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::BadHeader, "bad format tag"))?;
        let pointer_width = PointerWidth::from_marker(bytes[7]).ok_or_else(|| {
            SnapshotError::new(SnapshotErrorKind::BadHeader, "bad pointer width marker")
        })?;
        let endianness = Endianness::from_marker(bytes[8]).ok_or_else(|| {
            SnapshotError::new(SnapshotErrorKind::BadHeader, "bad endianness marker")
        })?;

        if bytes[9..] != VERSION {
            return Err(SnapshotError::new(
                SnapshotErrorKind::BadHeader,
                format!(
                    "unsupported version `{}`",
                    String::from_utf8_lossy(&bytes[9..])
                ),
            ));
        }

        Ok(Self {
            precision,
            pointer_width,
            endianness,
        })
    }
}

impl fmt::Display for SnapshotHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} precision, {} pointers, {} endian, version {}",
            self.precision,
            self.pointer_width,
            self.endianness,
            String::from_utf8_lossy(&VERSION)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let cases = [
            (
                Precision::Single,
                PointerWidth::Eight,
                Endianness::Little,
                b"BULLETf-v276",
            ),
            (
                Precision::Double,
                PointerWidth::Four,
                Endianness::Big,
                b"BULLETd_V276",
            ),
            (
                Precision::Single,
                PointerWidth::Four,
                Endianness::Little,
                b"BULLETf_v276",
            ),
        ];

        for (precision, width, endianness, expected) in cases {
            let header = SnapshotHeader::new(precision, width, endianness);
            assert_eq!(&header.to_bytes(), expected);
            assert_eq!(SnapshotHeader::parse(expected).unwrap(), header);
        }
    }

    #[test]
    fn test_parse_errors() {
        for data in [
            &b"BULLETf-v27"[..],
            b"BULLETx-v276",
            b"BULLETf*v276",
            b"BULLETf-x276",
            b"BULLETf-v275",
        ] {
            let err = SnapshotHeader::parse(data).unwrap_err();
            assert_eq!(err.kind(), SnapshotErrorKind::BadHeader);
        }
    }

    #[test]
    fn test_display() {
        let header = SnapshotHeader::new(Precision::Double, PointerWidth::Four, Endianness::Big);
        insta::assert_snapshot!(header.to_string(), @"double precision, 4-byte pointers, big endian, version 276");
    }
}
