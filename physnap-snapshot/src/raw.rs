//! The raw snapshot binary format internals.
//!
//! ```text
//! header   <7 byte format tag> <pointer marker> <endian marker> <3 byte version>
//! chunk    <u32 code> <i32 length> <address> <i32 struct index> <i32 count> <payload>
//! ...
//! trailer  the catalog, starting with "SDNA"
//! ```
//!
//! The address of a chunk header has the size of the snapshot's pointer model, so chunk headers
//! are 20 bytes long for 4-byte pointers and 24 bytes long for 8-byte pointers.

use physnap_common::{ChunkCode, Endianness, PointerWidth};
use scroll::ctx::{SizeWith, TryFromCtx, TryIntoCtx};
use scroll::{Endian, Pread, Pwrite};

/// The length of the snapshot header in bytes.
pub const HEADER_LENGTH: usize = 12;

/// The format version written into every snapshot header.
pub const VERSION: [u8; 3] = *b"276";

/// Layout parameters needed to read or write a [`ChunkHeader`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkCtx {
    /// The pointer model deciding the width of the address field.
    pub pointer_width: PointerWidth,
    /// The byte order of all integer fields.
    pub endianness: Endianness,
}

impl ChunkCtx {
    /// Creates a new chunk context.
    pub fn new(pointer_width: PointerWidth, endianness: Endianness) -> Self {
        Self {
            pointer_width,
            endianness,
        }
    }

    /// Returns the byte length of a chunk header in this layout.
    pub fn header_len(self) -> usize {
        ChunkHeader::size_with(&self)
    }

    fn endian(self) -> Endian {
        self.endianness.into()
    }
}

/// The header preceding the payload of every chunk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChunkHeader {
    /// The code labeling the chunk's contents.
    pub code: ChunkCode,
    /// The byte length of the payload.
    pub length: i32,
    /// The address of the source object in the memory of the producing process.
    pub old_ptr: u64,
    /// The catalog struct index of the payload's elements, or `-1`.
    pub dna_nr: i32,
    /// The number of elements in the payload.
    pub number: i32,
}

impl SizeWith<ChunkCtx> for ChunkHeader {
    fn size_with(ctx: &ChunkCtx) -> usize {
        16 + ctx.pointer_width.bytes()
    }
}

impl TryFromCtx<'_, ChunkCtx> for ChunkHeader {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: ChunkCtx) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        let endian = ctx.endian();

        let code = ChunkCode::from_u32(from.gread_with(offset, endian)?, ctx.endianness);
        let length = from.gread_with(offset, endian)?;
        let old_ptr = match ctx.pointer_width {
            PointerWidth::Four => u64::from(from.gread_with::<u32>(offset, endian)?),
            PointerWidth::Eight => from.gread_with(offset, endian)?,
        };
        let dna_nr = from.gread_with(offset, endian)?;
        let number = from.gread_with(offset, endian)?;

        let header = Self {
            code,
            length,
            old_ptr,
            dna_nr,
            number,
        };

        Ok((header, *offset))
    }
}

impl TryIntoCtx<ChunkCtx> for &'_ ChunkHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, into: &mut [u8], ctx: ChunkCtx) -> Result<usize, Self::Error> {
        let offset = &mut 0;
        let endian = ctx.endian();

        into.gwrite_with(self.code.to_u32(ctx.endianness), offset, endian)?;
        into.gwrite_with(self.length, offset, endian)?;
        match ctx.pointer_width {
            PointerWidth::Four => {
                let old_ptr = u32::try_from(self.old_ptr).map_err(|_| scroll::Error::BadInput {
                    size: *offset,
                    msg: "address does not fit 4 bytes",
                })?;
                into.gwrite_with(old_ptr, offset, endian)?;
            }
            PointerWidth::Eight => {
                into.gwrite_with(self.old_ptr, offset, endian)?;
            }
        }
        into.gwrite_with(self.dna_nr, offset, endian)?;
        into.gwrite_with(self.number, offset, endian)?;

        Ok(*offset)
    }
}
