//! Defines the read-only [`Snapshot`] inspector.

use std::fmt;

use physnap_common::ChunkCode;
use physnap_dna::Catalog;
use scroll::Pread;

use crate::raw::{ChunkCtx, ChunkHeader, HEADER_LENGTH};
use crate::{SnapshotError, SnapshotErrorKind, SnapshotHeader};

/// A chunk of a parsed [`Snapshot`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk<'data> {
    offset: usize,
    header: ChunkHeader,
    payload: &'data [u8],
}

impl<'data> Chunk<'data> {
    /// Returns the offset of the chunk header within the snapshot.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the chunk header.
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Returns the chunk code.
    pub fn code(&self) -> ChunkCode {
        self.header.code
    }

    /// Returns the catalog struct index of the payload, or `None` if it was not resolved.
    pub fn struct_index(&self) -> Option<usize> {
        usize::try_from(self.header.dna_nr).ok()
    }

    /// Returns the number of elements in the payload.
    pub fn count(&self) -> usize {
        usize::try_from(self.header.number).unwrap_or_default()
    }

    /// Returns the original address recorded for this chunk.
    pub fn original_address(&self) -> u64 {
        self.header.old_ptr
    }

    /// Returns the raw payload bytes.
    pub fn payload(&self) -> &'data [u8] {
        self.payload
    }
}

/// A parsed snapshot.
///
/// Parsing validates the header, walks all chunks and loads the catalog trailer. Pointer fields
/// inside payloads are left as they are.
///
/// ```
/// use physnap_dna::Catalog;
/// use physnap_snapshot::{Serializer, SerializerOptions, Snapshot};
///
/// let catalog = Catalog::host()?;
/// let mut serializer = Serializer::new(catalog, SerializerOptions::for_catalog(catalog))?;
/// serializer.start_session()?;
/// serializer.end_session()?;
///
/// let snapshot = Snapshot::parse(serializer.as_bytes())?;
/// assert!(snapshot.chunks().is_empty());
/// assert_eq!(snapshot.catalog().structs().len(), catalog.structs().len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Snapshot<'data> {
    data: &'data [u8],
    header: SnapshotHeader,
    chunks: Vec<Chunk<'data>>,
    catalog: Catalog<'data>,
}

impl<'data> Snapshot<'data> {
    /// Parses a complete snapshot.
    #[tracing::instrument(level = "trace", name = "Snapshot::parse", skip_all, fields(len = data.len()))]
    pub fn parse(data: &'data [u8]) -> Result<Self, SnapshotError> {
        let header = SnapshotHeader::parse(data)?;
        let ctx = ChunkCtx::new(header.pointer_width, header.endianness);

        let mut chunks = Vec::new();
        let mut offset = HEADER_LENGTH;
        while data.get(offset..offset + 4) != Some(&ChunkCode::DNA.as_bytes()[..]) {
            if offset >= data.len() {
                return Err(SnapshotError::new(
                    SnapshotErrorKind::BadChunk,
                    "missing catalog trailer",
                ));
            }

            let chunk_header: ChunkHeader = data.pread_with(offset, ctx)?;
            let length = usize::try_from(chunk_header.length).map_err(|_| {
                SnapshotError::new(
                    SnapshotErrorKind::BadChunk,
                    format!("negative payload length at offset {}", offset),
                )
            })?;

            let start = offset + ctx.header_len();
            let payload = start
                .checked_add(length)
                .and_then(|end| data.get(start..end))
                .ok_or_else(|| {
                    SnapshotError::new(
                        SnapshotErrorKind::BadChunk,
                        format!("payload at offset {} is truncated", start),
                    )
                })?;

            chunks.push(Chunk {
                offset,
                header: chunk_header,
                payload,
            });
            offset = start + length;
        }

        let catalog = Catalog::parse(&data[offset..], header.pointer_width, header.endianness)?;
        tracing::trace!(chunks = chunks.len(), "parsed snapshot");

        Ok(Self {
            data,
            header,
            chunks,
            catalog,
        })
    }

    /// Returns the raw snapshot bytes.
    pub fn as_bytes(&self) -> &'data [u8] {
        self.data
    }

    /// Returns the snapshot header.
    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// Returns all chunks in file order.
    pub fn chunks(&self) -> &[Chunk<'data>] {
        &self.chunks
    }

    /// Returns an iterator over the chunks labeled with the given code.
    pub fn chunks_with_code(&self, code: ChunkCode) -> impl Iterator<Item = &Chunk<'data>> + '_ {
        self.chunks.iter().filter(move |chunk| chunk.code() == code)
    }

    /// Returns the catalog trailer.
    pub fn catalog(&self) -> &Catalog<'data> {
        &self.catalog
    }

    /// Returns the struct name of a chunk's payload.
    pub fn struct_name(&self, chunk: &Chunk<'_>) -> Option<&'data str> {
        self.catalog.struct_name(chunk.struct_index()?)
    }
}

impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("header", &self.header)
            .field("chunks", &self.chunks.len())
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physnap_common::{Endianness, PointerWidth, Precision};
    use physnap_dna::CatalogBuilder;
    use scroll::Pwrite;

    fn tiny_snapshot(endianness: Endianness) -> Vec<u8> {
        let mut builder = CatalogBuilder::with_primitives(PointerWidth::Four);
        builder.add_struct("Pair", [("int", "m_a"), ("int", "m_b")]).unwrap();
        let catalog = builder.to_bytes(endianness).unwrap();

        let header = SnapshotHeader::new(Precision::Single, PointerWidth::Four, endianness);
        let chunk = ChunkHeader {
            code: ChunkCode::ARRAY,
            length: 8,
            old_ptr: 0xabc,
            dna_nr: 0,
            number: 1,
        };

        let mut data = header.to_bytes().to_vec();
        let mut chunk_bytes = [0u8; 20];
        chunk_bytes
            .pwrite_with(&chunk, 0, ChunkCtx::new(PointerWidth::Four, endianness))
            .unwrap();
        data.extend_from_slice(&chunk_bytes);
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data.extend_from_slice(&catalog);
        data
    }

    #[test]
    fn test_parse() {
        let data = tiny_snapshot(Endianness::Big);
        let snapshot = Snapshot::parse(&data).unwrap();

        assert_eq!(snapshot.header().endianness, Endianness::Big);
        assert_eq!(snapshot.chunks().len(), 1);

        let chunk = &snapshot.chunks()[0];
        assert_eq!(chunk.offset(), 12);
        assert_eq!(chunk.code(), ChunkCode::ARRAY);
        assert_eq!(chunk.original_address(), 0xabc);
        assert_eq!(chunk.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(snapshot.struct_name(chunk), Some("Pair"));
        assert_eq!(snapshot.chunks_with_code(ChunkCode::RIGID_BODY).count(), 0);
    }

    #[test]
    fn test_truncated_payload() {
        let data = tiny_snapshot(Endianness::Little);
        let err = Snapshot::parse(&data[..36]).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::BadChunk);
    }

    #[test]
    fn test_missing_trailer() {
        let data = tiny_snapshot(Endianness::Little);
        let err = Snapshot::parse(&data[..40]).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::BadChunk);
    }

    #[test]
    fn test_negative_length() {
        let mut data = tiny_snapshot(Endianness::Little);
        data[16..20].copy_from_slice(&(-8i32).to_le_bytes());
        let err = Snapshot::parse(&data).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::BadChunk);
    }

    #[test]
    fn test_bad_catalog() {
        let mut data = tiny_snapshot(Endianness::Little);
        // corrupt the "TYPE" tag following the names
        let type_tag = data
            .windows(4)
            .position(|window| window == b"TYPE")
            .unwrap();
        data[type_tag] = b'X';
        let err = Snapshot::parse(&data).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::Catalog);
    }
}
