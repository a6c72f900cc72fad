//! Defines the [`Serializer`] and its configuration.

use std::fmt;
use std::io::Write;

use physnap_common::{ChunkCode, Endianness, PointerWidth, Precision};
use physnap_dna::raw::{NAME_TAG, SDNA_TAG};
use physnap_dna::{Catalog, INVALID_STRUCT_INDEX};
use scroll::Pwrite;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::raw::{ChunkCtx, ChunkHeader, HEADER_LENGTH};
use crate::{SnapshotError, SnapshotErrorKind, SnapshotHeader};

/// The default size of the output buffer, 5 MiB.
pub const DEFAULT_CAPACITY: usize = 5 * 1024 * 1024;

/// Configuration of a [`Serializer`].
///
/// The pointer width and endianness default to those of the running process, which matches the
/// catalog returned by [`Catalog::host`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SerializerOptions {
    /// Numeric precision recorded in the header.
    pub precision: Precision,
    /// Pointer model of chunk headers. Must match the catalog.
    pub pointer_width: PointerWidth,
    /// Byte order of all integers. Must match the catalog.
    pub endianness: Endianness,
    /// Total size of the output buffer in bytes, including header and catalog trailer.
    pub capacity: usize,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            pointer_width: PointerWidth::host(),
            endianness: Endianness::host(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl SerializerOptions {
    /// Creates options with the layout of the given catalog.
    pub fn for_catalog(catalog: &Catalog<'_>) -> Self {
        Self {
            pointer_width: catalog.pointer_width(),
            endianness: catalog.endianness(),
            ..Self::default()
        }
    }

    /// Sets the numeric precision.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the pointer model.
    pub fn with_pointer_width(mut self, pointer_width: PointerWidth) -> Self {
        self.pointer_width = pointer_width;
        self
    }

    /// Sets the byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Sets the size of the output buffer.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// The address of a serialized object in the memory of the producing process.
///
/// The address is recorded in the chunk header as an opaque key. A loader matches pointer fields
/// against these keys to restore references between objects. It is never dereferenced.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OriginalAddress(u64);

impl OriginalAddress {
    /// The null address.
    pub const NULL: OriginalAddress = OriginalAddress(0);

    /// Creates an address key from its integer value.
    pub const fn new(address: u64) -> Self {
        OriginalAddress(address)
    }

    /// Creates an address key from the location of a live object.
    pub fn of<T: ?Sized>(value: &T) -> Self {
        OriginalAddress(value as *const T as *const () as usize as u64)
    }

    /// Returns the integer value of this address.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for OriginalAddress {
    fn from(address: u64) -> Self {
        OriginalAddress(address)
    }
}

impl From<OriginalAddress> for u64 {
    fn from(address: OriginalAddress) -> Self {
        address.0
    }
}

impl fmt::Display for OriginalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A chunk reserved by [`Serializer::allocate`] that has not been finalized yet.
///
/// The handle grants access to the chunk's payload through [`Serializer::payload_mut`] and is
/// redeemed by [`Serializer::finalize_chunk`]. It becomes stale once the chunk is finalized.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "chunks must be finalized"]
pub struct ChunkHandle {
    index: usize,
    offset: usize,
    payload_len: usize,
}

impl ChunkHandle {
    /// Returns the position of the chunk in the serializer's chunk list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the buffer offset of the chunk header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the byte length of the payload.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

/// Bookkeeping for a chunk written by a [`Serializer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkRecord {
    /// Buffer offset of the chunk header.
    pub offset: usize,
    /// The chunk header as written into the buffer.
    pub header: ChunkHeader,
}

impl ChunkRecord {
    /// Returns the original address recorded for this chunk.
    pub fn original_address(&self) -> OriginalAddress {
        OriginalAddress(self.header.old_ptr)
    }

    /// Returns the catalog struct index, or `None` if the chunk is unresolved.
    pub fn struct_index(&self) -> Option<usize> {
        usize::try_from(self.header.dna_nr).ok()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Idle,
    Open,
    Finished,
}

/// Writes a snapshot into a capacity-checked buffer.
///
/// A session starts with [`start_session`](Self::start_session), which writes the header. Every
/// object is then written as a chunk: [`allocate`](Self::allocate) reserves the chunk, the caller
/// fills its payload via [`payload_mut`](Self::payload_mut), and
/// [`finalize_chunk`](Self::finalize_chunk) labels it with its struct type, chunk code and
/// original address. [`end_session`](Self::end_session) appends the catalog, after which
/// [`as_bytes`](Self::as_bytes) holds the complete snapshot.
///
/// The buffer never grows on its own. When a chunk or the catalog does not fit, the operation
/// fails with [`SnapshotErrorKind::CapacityExceeded`] and leaves the buffer untouched, so the
/// caller can [`grow`](Self::grow) it and retry.
///
/// # Example
///
/// ```
/// use physnap_common::ChunkCode;
/// use physnap_dna::Catalog;
/// use physnap_snapshot::{Serializer, SerializerOptions};
///
/// let catalog = Catalog::host()?;
/// let mut serializer = Serializer::new(catalog, SerializerOptions::for_catalog(catalog))?;
/// serializer.start_session()?;
///
/// let index = catalog.lookup_struct("btVector3FloatData").unwrap();
/// let handle = serializer.allocate(catalog.struct_len(index).unwrap(), 1)?;
/// serializer.payload_mut(&handle)?[..4].copy_from_slice(&1.0f32.to_ne_bytes());
/// serializer.finalize_chunk(&handle, "btVector3FloatData", ChunkCode::ARRAY, 0x1000u64)?;
///
/// serializer.end_session()?;
/// assert_eq!(&serializer.as_bytes()[..6], b"BULLET");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Serializer<'a> {
    catalog: &'a Catalog<'a>,
    options: SerializerOptions,
    ctx: ChunkCtx,
    buffer: Vec<u8>,
    state: SessionState,
    pending: Option<usize>,
    chunks: Vec<ChunkRecord>,
}

impl<'a> Serializer<'a> {
    /// Creates a serializer writing chunks described by the given catalog.
    ///
    /// Fails with [`SnapshotErrorKind::CatalogMismatch`] if the catalog was produced for another
    /// pointer model or byte order than the options request, and with
    /// [`SnapshotErrorKind::CapacityExceeded`] if the buffer cannot be allocated.
    pub fn new(catalog: &'a Catalog<'a>, options: SerializerOptions) -> Result<Self, SnapshotError> {
        catalog
            .ensure_pointer_width(options.pointer_width)
            .map_err(|e| SnapshotError::new(SnapshotErrorKind::CatalogMismatch, e))?;

        if catalog.endianness() != options.endianness {
            return Err(SnapshotError::new(
                SnapshotErrorKind::CatalogMismatch,
                format!(
                    "catalog is {} endian, expected {} endian",
                    catalog.endianness(),
                    options.endianness
                ),
            ));
        }

        let mut buffer = Vec::new();
        reserve(&mut buffer, options.capacity)?;

        Ok(Self {
            catalog,
            options,
            ctx: ChunkCtx::new(options.pointer_width, options.endianness),
            buffer,
            state: SessionState::Idle,
            pending: None,
            chunks: Vec::new(),
        })
    }

    /// Returns the catalog of this serializer.
    pub fn catalog(&self) -> &'a Catalog<'a> {
        self.catalog
    }

    /// Returns the options of this serializer.
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Returns the header written at the start of the session.
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader::new(
            self.options.precision,
            self.options.pointer_width,
            self.options.endianness,
        )
    }

    /// Returns the byte length of a chunk header in this serializer's layout.
    pub fn chunk_header_len(&self) -> usize {
        self.ctx.header_len()
    }

    /// Writes the snapshot header and opens the session.
    #[tracing::instrument(level = "trace", name = "Serializer::start_session", skip_all)]
    pub fn start_session(&mut self) -> Result<(), SnapshotError> {
        match self.state {
            SessionState::Idle => (),
            SessionState::Open => return Err(SnapshotErrorKind::SessionAlreadyStarted.into()),
            SessionState::Finished => return Err(SnapshotErrorKind::SessionFinished.into()),
        }

        self.ensure_capacity(HEADER_LENGTH)?;
        let header = self.header().to_bytes();
        self.buffer.extend_from_slice(&header);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Reserves a chunk for `count` elements of `element_size` bytes each.
    ///
    /// The chunk header is written immediately with struct index `-1` and an empty code. The
    /// payload is zeroed. The chunk must be finalized before the next allocation.
    pub fn allocate(
        &mut self,
        element_size: usize,
        count: usize,
    ) -> Result<ChunkHandle, SnapshotError> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(SnapshotErrorKind::UnfinalizedChunk.into());
        }

        let payload_len = element_size
            .checked_mul(count)
            .ok_or(SnapshotErrorKind::ValueTooLarge)?;
        let length = i32::try_from(payload_len).map_err(|_| {
            SnapshotError::new(
                SnapshotErrorKind::ValueTooLarge,
                format!("payload of {} bytes", payload_len),
            )
        })?;
        let number = i32::try_from(count).map_err(|_| {
            SnapshotError::new(
                SnapshotErrorKind::ValueTooLarge,
                format!("{} elements", count),
            )
        })?;

        let total = self
            .chunk_header_len()
            .checked_add(payload_len)
            .ok_or(SnapshotErrorKind::ValueTooLarge)?;
        self.ensure_capacity(total)?;

        let offset = self.buffer.len();
        let header = ChunkHeader {
            code: ChunkCode::default(),
            length,
            old_ptr: 0,
            dna_nr: INVALID_STRUCT_INDEX,
            number,
        };

        self.buffer.resize(offset + total, 0);
        self.write_chunk_header(offset, &header)?;

        let index = self.chunks.len();
        self.chunks.push(ChunkRecord { offset, header });
        self.pending = Some(index);

        tracing::trace!(offset, payload_len, count, "allocated chunk");
        Ok(ChunkHandle {
            index,
            offset,
            payload_len,
        })
    }

    /// Returns the payload of a chunk that has not been finalized yet.
    pub fn payload_mut(&mut self, handle: &ChunkHandle) -> Result<&mut [u8], SnapshotError> {
        self.check_pending(handle)?;
        let start = handle.offset + self.chunk_header_len();
        Ok(&mut self.buffer[start..start + handle.payload_len])
    }

    /// Labels the pending chunk and closes it.
    ///
    /// Looks up `struct_type` in the catalog and stamps its struct index, the chunk code and the
    /// original address into the chunk header. Returns the struct index.
    ///
    /// If the struct type is not part of the catalog, the chunk is still closed with struct index
    /// `-1` and [`SnapshotErrorKind::UnknownStructType`] is returned. The caller may skip the
    /// object and continue the session. On any other error the chunk stays pending.
    pub fn finalize_chunk<A>(
        &mut self,
        handle: &ChunkHandle,
        struct_type: &str,
        code: ChunkCode,
        original_address: A,
    ) -> Result<usize, SnapshotError>
    where
        A: Into<OriginalAddress>,
    {
        self.check_pending(handle)?;

        if code.is_reserved() {
            return Err(SnapshotError::new(
                SnapshotErrorKind::ReservedChunkCode,
                format!("`{}` may not label a chunk", code),
            ));
        }

        let original_address = original_address.into();
        if original_address.get() > self.options.pointer_width.max_address() {
            return Err(SnapshotError::new(
                SnapshotErrorKind::AddressTooWide,
                format!(
                    "{} does not fit {} pointers",
                    original_address, self.options.pointer_width
                ),
            ));
        }

        let struct_index = self.catalog.lookup_struct(struct_type);
        let dna_nr = match struct_index {
            Some(index) => i32::try_from(index).map_err(|_| SnapshotErrorKind::ValueTooLarge)?,
            None => INVALID_STRUCT_INDEX,
        };

        let record = &mut self.chunks[handle.index];
        record.header.code = code;
        record.header.old_ptr = original_address.get();
        record.header.dna_nr = dna_nr;
        let (offset, header) = (record.offset, record.header);

        self.write_chunk_header(offset, &header)?;
        self.pending = None;

        match struct_index {
            Some(index) => Ok(index),
            None => {
                tracing::warn!(struct_type, %code, "finalized chunk with unknown struct type");
                Err(SnapshotError::new(
                    SnapshotErrorKind::UnknownStructType,
                    format!("`{}`", struct_type),
                ))
            }
        }
    }

    /// Appends the catalog and closes the session.
    #[tracing::instrument(level = "trace", name = "Serializer::end_session", skip_all)]
    pub fn end_session(&mut self) -> Result<(), SnapshotError> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(SnapshotErrorKind::UnfinalizedChunk.into());
        }

        // loaders find the trailer by its tag, which catalogs may omit
        let trailer = self.catalog.as_bytes();
        let tags: &[[u8; 4]] = if trailer.starts_with(&SDNA_TAG) {
            &[]
        } else {
            &[SDNA_TAG, NAME_TAG]
        };

        self.ensure_capacity(tags.len() * 4 + trailer.len())?;
        for tag in tags {
            self.buffer.extend_from_slice(tag);
        }
        self.buffer.extend_from_slice(trailer);
        self.state = SessionState::Finished;

        tracing::debug!(
            chunks = self.chunks.len(),
            len = self.buffer.len(),
            "finished snapshot"
        );
        Ok(())
    }

    /// Returns `true` once the catalog has been appended.
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Returns the bytes written so far.
    ///
    /// The bytes form a complete snapshot only after [`end_session`](Self::end_session).
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes the bytes written so far into the given [`Write`].
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), SnapshotError> {
        if !self.is_finished() {
            tracing::warn!(len = self.buffer.len(), "writing an unfinished snapshot");
        }
        writer.write_all(&self.buffer)?;
        writer.flush()?;
        Ok(())
    }

    /// Consumes the serializer and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the total size of the output buffer.
    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    /// Returns the number of bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.options.capacity.saturating_sub(self.buffer.len())
    }

    /// Returns all chunks allocated in this session, in buffer order.
    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    /// Resizes the output buffer to `new_capacity` bytes, preserving its contents.
    ///
    /// The capacity cannot drop below the number of bytes already written.
    pub fn grow(&mut self, new_capacity: usize) -> Result<(), SnapshotError> {
        if new_capacity < self.buffer.len() {
            return Err(SnapshotError::new(
                SnapshotErrorKind::CapacityExceeded,
                format!(
                    "cannot shrink below the {} bytes written",
                    self.buffer.len()
                ),
            ));
        }

        reserve(&mut self.buffer, new_capacity)?;
        tracing::debug!(
            from = self.options.capacity,
            to = new_capacity,
            "resized snapshot buffer"
        );
        self.options.capacity = new_capacity;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SnapshotError> {
        match self.state {
            SessionState::Idle => Err(SnapshotErrorKind::SessionNotStarted.into()),
            SessionState::Open => Ok(()),
            SessionState::Finished => Err(SnapshotErrorKind::SessionFinished.into()),
        }
    }

    fn ensure_capacity(&self, len: usize) -> Result<(), SnapshotError> {
        if len > self.remaining() {
            return Err(SnapshotError::new(
                SnapshotErrorKind::CapacityExceeded,
                format!(
                    "{} bytes requested, {} bytes remaining",
                    len,
                    self.remaining()
                ),
            ));
        }
        Ok(())
    }

    fn check_pending(&self, handle: &ChunkHandle) -> Result<(), SnapshotError> {
        let is_pending = self.pending == Some(handle.index)
            && self
                .chunks
                .get(handle.index)
                .map_or(false, |record| record.offset == handle.offset);

        if is_pending {
            Ok(())
        } else if self.pending.is_none() && self.state == SessionState::Finished {
            Err(SnapshotErrorKind::SessionFinished.into())
        } else {
            Err(SnapshotErrorKind::ForeignChunk.into())
        }
    }

    fn write_chunk_header(
        &mut self,
        offset: usize,
        header: &ChunkHeader,
    ) -> Result<(), SnapshotError> {
        self.buffer
            .pwrite_with(header, offset, self.ctx)
            .map_err(|e| SnapshotError::new(SnapshotErrorKind::BadChunk, e))?;
        Ok(())
    }
}

/// Reserves room for `capacity` bytes in total.
fn reserve(buffer: &mut Vec<u8>, capacity: usize) -> Result<(), SnapshotError> {
    let additional = capacity.saturating_sub(buffer.len());
    buffer.try_reserve_exact(additional).map_err(|e| {
        SnapshotError::new(
            SnapshotErrorKind::CapacityExceeded,
            format!("cannot allocate {} bytes: {}", capacity, e),
        )
    })
}

impl fmt::Debug for Serializer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("len", &self.buffer.len())
            .field("chunks", &self.chunks.len())
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SerializerOptions::default();
        assert_eq!(options.precision, Precision::Single);
        assert_eq!(options.pointer_width, PointerWidth::host());
        assert_eq!(options.endianness, Endianness::host());
        assert_eq!(options.capacity, 5 * 1024 * 1024);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_options_serde() {
        let options: SerializerOptions =
            serde_json::from_str(r#"{"precision": "double", "pointer_width": 4}"#).unwrap();
        assert_eq!(options.precision, Precision::Double);
        assert_eq!(options.pointer_width, PointerWidth::Four);
        assert_eq!(options.endianness, Endianness::host());
        assert_eq!(options.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_original_address() {
        let value = 42u32;
        let address = OriginalAddress::of(&value);
        assert_eq!(address.get(), &value as *const u32 as usize as u64);
        assert_eq!(OriginalAddress::from(0x1000u64).to_string(), "0x1000");
        assert_eq!(OriginalAddress::default(), OriginalAddress::NULL);
    }

    #[test]
    fn test_catalog_mismatch() {
        let catalog = Catalog::builtin(PointerWidth::Four).unwrap();

        let options =
            SerializerOptions::for_catalog(catalog).with_pointer_width(PointerWidth::Eight);
        let err = Serializer::new(catalog, options).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::CatalogMismatch);

        let foreign = match Endianness::host() {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        };
        let options = SerializerOptions::for_catalog(catalog).with_endianness(foreign);
        let err = Serializer::new(catalog, options).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::CatalogMismatch);
    }

    #[test]
    fn test_pending_chunk_header() {
        let catalog = Catalog::builtin(PointerWidth::Eight).unwrap();
        let mut serializer =
            Serializer::new(catalog, SerializerOptions::for_catalog(catalog)).unwrap();
        serializer.start_session().unwrap();

        let handle = serializer.allocate(16, 2).unwrap();
        assert_eq!(handle.offset(), HEADER_LENGTH);
        assert_eq!(handle.payload_len(), 32);
        assert_eq!(serializer.len(), HEADER_LENGTH + 24 + 32);

        let record = serializer.chunks()[0];
        assert_eq!(record.header.code, ChunkCode::default());
        assert_eq!(record.header.dna_nr, -1);
        assert_eq!(record.header.number, 2);
        assert_eq!(record.struct_index(), None);
        assert_eq!(&serializer.as_bytes()[12..16], &[0; 4]);
    }

    #[test]
    fn test_debug() {
        let catalog = Catalog::builtin(PointerWidth::Eight).unwrap();
        let options = SerializerOptions::for_catalog(catalog).with_capacity(1024);
        let serializer = Serializer::new(catalog, options).unwrap();
        let debug = format!("{:?}", serializer);
        assert!(debug.starts_with("Serializer {"));
        assert!(debug.contains("state: Idle"));
    }
}
