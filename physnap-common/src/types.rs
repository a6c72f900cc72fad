//! Common types and errors used in `physnap`.

use std::fmt;
use std::str;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Numeric precision of the simulation whose state is being written.
///
/// The precision is part of the snapshot format tag, so a loader can tell `float` snapshots apart
/// from `double` snapshots before looking at any chunk.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Precision {
    /// 32-bit floating point scalars.
    #[default]
    Single = 0,
    /// 64-bit floating point scalars.
    Double = 1,
}

impl Precision {
    /// Returns the 7-byte format tag written at the start of every snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use physnap_common::Precision;
    ///
    /// assert_eq!(Precision::Single.format_tag(), b"BULLETf");
    /// assert_eq!(Precision::Double.format_tag(), b"BULLETd");
    /// ```
    pub fn format_tag(self) -> &'static [u8; 7] {
        match self {
            Precision::Single => b"BULLETf",
            Precision::Double => b"BULLETd",
        }
    }

    /// Resolves a format tag back to its precision.
    pub fn from_format_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"BULLETf" => Some(Precision::Single),
            b"BULLETd" => Some(Precision::Double),
            _ => None,
        }
    }

    /// Returns the canonical name of this precision.
    pub fn name(self) -> &'static str {
        match self {
            Precision::Single => "single",
            Precision::Double => "double",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error returned for an invalid [`Precision`].
#[derive(Debug)]
pub struct UnknownPrecisionError;

impl fmt::Display for UnknownPrecisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown precision")
    }
}

impl std::error::Error for UnknownPrecisionError {}

impl str::FromStr for Precision {
    type Err = UnknownPrecisionError;

    fn from_str(string: &str) -> Result<Precision, UnknownPrecisionError> {
        Ok(match string.to_ascii_lowercase().as_str() {
            "single" | "float" | "f32" => Precision::Single,
            "double" | "f64" => Precision::Double,
            _ => return Err(UnknownPrecisionError),
        })
    }
}

/// The size of addresses in the pointer model a snapshot was written for.
///
/// The pointer width decides which catalog variant describes the struct layouts, and how wide the
/// original-address field of every chunk header is.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub enum PointerWidth {
    /// 4-byte addresses.
    Four = 4,
    /// 8-byte addresses.
    Eight = 8,
}

impl PointerWidth {
    /// Returns the pointer width of the running process.
    pub fn host() -> Self {
        if std::mem::size_of::<usize>() == 8 {
            PointerWidth::Eight
        } else {
            PointerWidth::Four
        }
    }

    /// Returns the number of bytes in an address.
    ///
    /// # Examples
    ///
    /// ```
    /// use physnap_common::PointerWidth;
    ///
    /// assert_eq!(PointerWidth::Four.bytes(), 4);
    /// assert_eq!(PointerWidth::Eight.bytes(), 8);
    /// ```
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Returns the header marker byte for this pointer width.
    pub fn marker(self) -> u8 {
        match self {
            PointerWidth::Four => b'_',
            PointerWidth::Eight => b'-',
        }
    }

    /// Resolves a header marker byte back to its pointer width.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'_' => Some(PointerWidth::Four),
            b'-' => Some(PointerWidth::Eight),
            _ => None,
        }
    }

    /// Returns the largest address representable in this pointer model.
    pub fn max_address(self) -> u64 {
        match self {
            PointerWidth::Four => u64::from(u32::MAX),
            PointerWidth::Eight => u64::MAX,
        }
    }
}

impl fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-byte", self.bytes())
    }
}

/// An error returned for an invalid [`PointerWidth`].
#[derive(Debug)]
pub struct UnknownPointerWidthError;

impl fmt::Display for UnknownPointerWidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown pointer width")
    }
}

impl std::error::Error for UnknownPointerWidthError {}

impl TryFrom<u8> for PointerWidth {
    type Error = UnknownPointerWidthError;

    fn try_from(bytes: u8) -> Result<Self, Self::Error> {
        match bytes {
            4 => Ok(PointerWidth::Four),
            8 => Ok(PointerWidth::Eight),
            _ => Err(UnknownPointerWidthError),
        }
    }
}

impl From<PointerWidth> for u8 {
    fn from(width: PointerWidth) -> Self {
        width as u8
    }
}

impl str::FromStr for PointerWidth {
    type Err = UnknownPointerWidthError;

    fn from_str(string: &str) -> Result<PointerWidth, UnknownPointerWidthError> {
        Ok(match string.to_ascii_lowercase().as_str() {
            "4" | "32" | "4-byte" => PointerWidth::Four,
            "8" | "64" | "8-byte" => PointerWidth::Eight,
            "host" => PointerWidth::host(),
            _ => return Err(UnknownPointerWidthError),
        })
    }
}

/// Byte order of all multi-byte integers in a snapshot and its catalog.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endianness {
    /// Returns the byte order of the running process.
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Returns the header marker byte for this byte order.
    pub fn marker(self) -> u8 {
        match self {
            Endianness::Little => b'v',
            Endianness::Big => b'V',
        }
    }

    /// Resolves a header marker byte back to its byte order.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'v' => Some(Endianness::Little),
            b'V' => Some(Endianness::Big),
            _ => None,
        }
    }

    /// Returns the canonical name of this byte order.
    pub fn name(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl From<Endianness> for scroll::Endian {
    fn from(endianness: Endianness) -> Self {
        match endianness {
            Endianness::Little => scroll::LE,
            Endianness::Big => scroll::BE,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error returned for an invalid [`Endianness`].
#[derive(Debug)]
pub struct UnknownEndiannessError;

impl fmt::Display for UnknownEndiannessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown endianness")
    }
}

impl std::error::Error for UnknownEndiannessError {}

impl str::FromStr for Endianness {
    type Err = UnknownEndiannessError;

    fn from_str(string: &str) -> Result<Endianness, UnknownEndiannessError> {
        Ok(match string.to_ascii_lowercase().as_str() {
            "little" | "le" => Endianness::Little,
            "big" | "be" => Endianness::Big,
            "host" => Endianness::host(),
            _ => return Err(UnknownEndiannessError),
        })
    }
}

/// A four character code labeling a chunk.
///
/// Chunk codes are written so that their bytes spell the four characters in file order,
/// regardless of the byte order of the snapshot.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChunkCode([u8; 4]);

impl ChunkCode {
    /// A collision object without dynamics.
    pub const COLLISION_OBJECT: ChunkCode = ChunkCode(*b"COBJ");
    /// A rigid body.
    pub const RIGID_BODY: ChunkCode = ChunkCode(*b"RBDY");
    /// A box collision shape.
    pub const BOX_SHAPE: ChunkCode = ChunkCode(*b"BOXS");
    /// Any other collision shape.
    pub const SHAPE: ChunkCode = ChunkCode(*b"SHAP");
    /// A plain array of elements referenced by another chunk.
    pub const ARRAY: ChunkCode = ChunkCode(*b"ARAY");
    /// A constraint between rigid bodies.
    pub const CONSTRAINT: ChunkCode = ChunkCode(*b"CONS");
    /// The tag opening the catalog trailer. Never valid as the code of a chunk.
    pub const DNA: ChunkCode = ChunkCode(*b"SDNA");

    /// Creates a chunk code from its four characters.
    pub const fn new(code: [u8; 4]) -> Self {
        ChunkCode(code)
    }

    /// Returns the four characters of this code.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Returns the integer form of this code for the given byte order.
    ///
    /// Writing the returned value with the same byte order yields the code's characters in
    /// order.
    ///
    /// # Examples
    ///
    /// ```
    /// use physnap_common::{ChunkCode, Endianness};
    ///
    /// let code = ChunkCode::BOX_SHAPE;
    /// assert_eq!(code.to_u32(Endianness::Little).to_le_bytes(), *b"BOXS");
    /// assert_eq!(code.to_u32(Endianness::Big).to_be_bytes(), *b"BOXS");
    /// ```
    pub fn to_u32(self, endianness: Endianness) -> u32 {
        match endianness {
            Endianness::Little => u32::from_le_bytes(self.0),
            Endianness::Big => u32::from_be_bytes(self.0),
        }
    }

    /// Restores a code from its integer form in the given byte order.
    pub fn from_u32(value: u32, endianness: Endianness) -> Self {
        match endianness {
            Endianness::Little => ChunkCode(value.to_le_bytes()),
            Endianness::Big => ChunkCode(value.to_be_bytes()),
        }
    }

    /// Returns `true` if this code may not label a chunk.
    pub fn is_reserved(&self) -> bool {
        *self == ChunkCode::DNA
    }
}

impl fmt::Display for ChunkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkCode(\"{}\")", self)
    }
}

impl From<[u8; 4]> for ChunkCode {
    fn from(code: [u8; 4]) -> Self {
        ChunkCode(code)
    }
}

/// An error returned for an invalid [`ChunkCode`].
#[derive(Debug)]
pub struct ParseChunkCodeError;

impl fmt::Display for ParseChunkCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk codes must be exactly four ASCII characters")
    }
}

impl std::error::Error for ParseChunkCodeError {}

impl str::FromStr for ChunkCode {
    type Err = ParseChunkCodeError;

    fn from_str(string: &str) -> Result<ChunkCode, ParseChunkCodeError> {
        let code: [u8; 4] = string
            .as_bytes()
            .try_into()
            .map_err(|_| ParseChunkCodeError)?;

        if !code.is_ascii() {
            return Err(ParseChunkCodeError);
        }

        Ok(ChunkCode(code))
    }
}
