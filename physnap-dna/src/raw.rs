//! The raw catalog binary format internals.
//!
//! A catalog is a sequence of tagged sections. All integers use the byte order of the snapshot
//! the catalog belongs to:
//!
//! ```text
//! "SDNA"                            (optional, always followed by "NAME")
//! "NAME" <i32 count> <cstr>...      field names, padded to 4 bytes
//! "TYPE" <i32 count> <cstr>...      type names, padded to 4 bytes
//! "TLEN" <u16 len>...               one length per type, padded to 4 bytes
//! "STRC" <i32 count> <descriptor>...
//! ```
//!
//! Each descriptor is a run of `u16`: the type of the struct, the number of fields, then a
//! `(field type, field name)` pair per field.

use physnap_common::PointerWidth;
use scroll::{Endian, Pread};

use crate::{DnaError, DnaErrorKind};

/// The optional tag opening a catalog.
pub const SDNA_TAG: [u8; 4] = *b"SDNA";
/// The tag of the field name section.
pub const NAME_TAG: [u8; 4] = *b"NAME";
/// The tag of the type name section.
pub const TYPE_TAG: [u8; 4] = *b"TYPE";
/// The tag of the type length section.
pub const TLEN_TAG: [u8; 4] = *b"TLEN";
/// The tag of the struct descriptor section.
pub const STRC_TAG: [u8; 4] = *b"STRC";

/// Sections following a variable-length section start on this boundary.
pub const SECTION_ALIGNMENT: usize = 4;

/// Returns the number of padding bytes needed to move `offset` onto the next multiple of
/// `alignment`.
pub fn padding(offset: usize, alignment: usize) -> usize {
    let remainder = offset % alignment;
    if remainder == 0 {
        remainder
    } else {
        alignment - remainder
    }
}

/// Computes the byte size of a field from its decorated name.
///
/// Names starting with `*` (pointers) or `(` (function pointers) occupy one address of the
/// given pointer model. Every `[N]` suffix multiplies the size by `N`.
pub fn field_size(name: &str, type_len: usize, pointer_width: PointerWidth) -> Option<usize> {
    let (declarator, mut dims) = match name.find('[') {
        Some(index) => name.split_at(index),
        None => (name, ""),
    };

    if field_ident(declarator).is_empty() {
        return None;
    }

    let element = if declarator.starts_with('*') || declarator.starts_with('(') {
        pointer_width.bytes()
    } else {
        type_len
    };

    let mut count = 1usize;
    while !dims.is_empty() {
        let inner = dims.strip_prefix('[')?;
        let end = inner.find(']')?;
        let dim: usize = inner.get(..end)?.parse().ok()?;
        count = count.checked_mul(dim)?;
        dims = inner.get(end + 1..)?;
    }

    element.checked_mul(count)
}

/// Strips pointer and array decorations from a field name.
///
/// # Examples
///
/// ```
/// use physnap_dna::raw::field_ident;
///
/// assert_eq!(field_ident("*m_name"), "m_name");
/// assert_eq!(field_ident("m_floats[4]"), "m_floats");
/// assert_eq!(field_ident("(*m_callback)()"), "m_callback");
/// ```
pub fn field_ident(name: &str) -> &str {
    let name = name.trim_start_matches(['*', '(']);
    match name.find(['[', ')']) {
        Some(end) => &name[..end],
        None => name,
    }
}

/// A bounds-checked cursor over catalog bytes.
pub(crate) struct DnaReader<'data> {
    data: &'data [u8],
    offset: usize,
    endian: Endian,
}

impl<'data> DnaReader<'data> {
    pub fn new(data: &'data [u8], endian: Endian) -> Self {
        Self {
            data,
            offset: 0,
            endian,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn peek_tag(&self, tag: &[u8; 4]) -> bool {
        self.data.get(self.offset..self.offset + tag.len()) == Some(&tag[..])
    }

    pub fn expect_tag(&mut self, tag: &[u8; 4]) -> Result<(), DnaError> {
        if !self.peek_tag(tag) {
            return Err(DnaError::new(
                DnaErrorKind::BadTag,
                format!(
                    "expected `{}` at offset {}",
                    String::from_utf8_lossy(tag),
                    self.offset
                ),
            ));
        }

        self.offset += tag.len();
        Ok(())
    }

    pub fn read_count(&mut self) -> Result<usize, DnaError> {
        let count: i32 = self.data.gread_with(&mut self.offset, self.endian)?;
        usize::try_from(count).map_err(|_| DnaErrorKind::BadCount.into())
    }

    pub fn read_u16(&mut self) -> Result<u16, DnaError> {
        Ok(self.data.gread_with(&mut self.offset, self.endian)?)
    }

    pub fn read_cstr(&mut self) -> Result<&'data str, DnaError> {
        let rest = self.data.get(self.offset..).unwrap_or_default();
        let len = rest
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(DnaErrorKind::Truncated)?;

        let string = std::str::from_utf8(&rest[..len])
            .map_err(|e| DnaError::new(DnaErrorKind::BadString, e))?;

        self.offset += len + 1;
        Ok(string)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'data [u8], DnaError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DnaErrorKind::Truncated)?;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(DnaErrorKind::Truncated)?;

        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DnaError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn align(&mut self) -> Result<(), DnaError> {
        self.skip(padding(self.offset, SECTION_ALIGNMENT))
    }
}
