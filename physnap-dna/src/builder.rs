//! Defines the [`CatalogBuilder`].

use std::io::Write;

use indexmap::{IndexMap, IndexSet};
use physnap_common::{Endianness, PointerWidth};
use scroll::{Endian, IOwrite};

use crate::raw;
use crate::{DnaError, DnaErrorKind};

/// The primitive types every catalog starts with, with their byte lengths.
pub const PRIMITIVE_TYPES: &[(&str, u16)] = &[
    ("char", 1),
    ("uchar", 1),
    ("short", 2),
    ("ushort", 2),
    ("int", 4),
    ("long", 4),
    ("ulong", 4),
    ("float", 4),
    ("double", 8),
    ("void", 0),
];

/// The largest index or length representable in a catalog.
const MAX_ID: usize = i16::MAX as usize;

#[derive(Debug)]
struct StructEntry {
    type_id: u16,
    fields: Vec<(u16, u16)>,
}

/// Compiles struct declarations into catalog bytes.
///
/// Types are declared in order: primitives with a fixed length, then structs whose fields refer
/// to previously declared types. A struct may point to itself. The byte length of each struct is
/// computed for the builder's pointer model.
///
/// # Example
///
/// ```
/// use physnap_common::{Endianness, PointerWidth};
/// use physnap_dna::{Catalog, CatalogBuilder};
///
/// let mut builder = CatalogBuilder::with_primitives(PointerWidth::Four);
/// builder.add_struct("Body", [("float", "m_mass"), ("Body", "*m_next")])?;
///
/// let bytes = builder.to_bytes(Endianness::Little)?;
/// let catalog = Catalog::parse(&bytes, PointerWidth::Four, Endianness::Little)?;
/// assert_eq!(catalog.struct_len(0), Some(8));
/// # Ok::<(), physnap_dna::DnaError>(())
/// ```
#[derive(Debug)]
pub struct CatalogBuilder {
    pointer_width: PointerWidth,
    names: IndexSet<String>,
    types: IndexMap<String, u16>,
    structs: Vec<StructEntry>,
}

impl CatalogBuilder {
    /// Creates an empty builder for the given pointer model.
    pub fn new(pointer_width: PointerWidth) -> Self {
        Self {
            pointer_width,
            names: IndexSet::new(),
            types: IndexMap::new(),
            structs: Vec::new(),
        }
    }

    /// Creates a builder with all [`PRIMITIVE_TYPES`] declared.
    pub fn with_primitives(pointer_width: PointerWidth) -> Self {
        let mut builder = Self::new(pointer_width);
        for &(name, len) in PRIMITIVE_TYPES {
            builder.types.insert(name.to_owned(), len);
        }
        builder
    }

    /// Returns the pointer model struct lengths are computed for.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// Returns the number of declared structs.
    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    /// Declares a type without fields and returns its type index.
    pub fn add_primitive(&mut self, name: &str, len: u16) -> Result<u16, DnaError> {
        self.insert_type(name, len)
    }

    /// Declares a struct and returns its struct index.
    ///
    /// Each field is given as `(type name, decorated field name)`, for instance
    /// `("btVector3FloatData", "m_origin")`, `("char", "*m_name")` or `("float", "m_floats[4]")`.
    pub fn add_struct<'a, I>(&mut self, name: &str, fields: I) -> Result<usize, DnaError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.types.contains_key(name) {
            return Err(DnaError::new(
                DnaErrorKind::DuplicateType,
                format!("type `{}` is declared twice", name),
            ));
        }
        let type_id = self.types.len();

        let mut len = 0usize;
        let mut entries = Vec::new();
        for (field_type, field_name) in fields {
            let (field_type_id, type_len) = match self.types.get_full(field_type) {
                Some((index, _, &type_len)) => (index, usize::from(type_len)),
                // only pointers may refer to the struct being declared
                None if field_type == name && field_name.starts_with('*') => (type_id, 0),
                None => {
                    return Err(DnaError::new(
                        DnaErrorKind::UnknownType,
                        format!(
                            "field `{}` of `{}` has unknown type `{}`",
                            field_name, name, field_type
                        ),
                    ))
                }
            };

            let size = raw::field_size(field_name, type_len, self.pointer_width)
                .ok_or_else(|| {
                    DnaError::new(
                        DnaErrorKind::BadString,
                        format!("malformed field name `{}`", field_name),
                    )
                })?;

            len = len.checked_add(size).ok_or(DnaErrorKind::ValueTooLarge)?;
            let (name_id, _) = self.names.insert_full(field_name.to_owned());
            entries.push((to_id(field_type_id)?, to_id(name_id)?));
        }

        let len = u16::try_from(len).map_err(|_| {
            DnaError::new(
                DnaErrorKind::ValueTooLarge,
                format!("struct `{}` is {} bytes long", name, len),
            )
        })?;

        let type_id = self.insert_type(name, len)?;
        self.structs.push(StructEntry {
            type_id,
            fields: entries,
        });

        Ok(self.structs.len() - 1)
    }

    fn insert_type(&mut self, name: &str, len: u16) -> Result<u16, DnaError> {
        if name.is_empty() || name.contains('\0') {
            return Err(DnaErrorKind::BadString.into());
        }

        if self.types.contains_key(name) {
            return Err(DnaError::new(
                DnaErrorKind::DuplicateType,
                format!("type `{}` is declared twice", name),
            ));
        }

        let (index, _) = self.types.insert_full(name.to_owned(), len);
        to_id(index)
    }

    /// Serializes the catalog into the given [`Write`].
    #[tracing::instrument(level = "trace", name = "CatalogBuilder::serialize", skip_all)]
    pub fn serialize<W: Write>(
        &self,
        writer: &mut W,
        endianness: Endianness,
    ) -> Result<(), DnaError> {
        let mut writer = WriteWrapper::new(writer, endianness.into());

        writer.write_bytes(&raw::SDNA_TAG)?;
        writer.write_bytes(&raw::NAME_TAG)?;
        writer.write_count(self.names.len())?;
        for name in &self.names {
            writer.write_cstr(name)?;
        }
        writer.align()?;

        writer.write_bytes(&raw::TYPE_TAG)?;
        writer.write_count(self.types.len())?;
        for name in self.types.keys() {
            writer.write_cstr(name)?;
        }
        writer.align()?;

        writer.write_bytes(&raw::TLEN_TAG)?;
        for &len in self.types.values() {
            writer.write_u16(len)?;
        }
        writer.align()?;

        writer.write_bytes(&raw::STRC_TAG)?;
        writer.write_count(self.structs.len())?;
        for entry in &self.structs {
            writer.write_u16(entry.type_id)?;
            writer.write_u16(to_id(entry.fields.len())?)?;
            for &(type_id, name_id) in &entry.fields {
                writer.write_u16(type_id)?;
                writer.write_u16(name_id)?;
            }
        }

        tracing::trace!(len = writer.position, "serialized catalog");
        Ok(())
    }

    /// Serializes the catalog into a new buffer.
    pub fn to_bytes(&self, endianness: Endianness) -> Result<Vec<u8>, DnaError> {
        let mut buffer = Vec::new();
        self.serialize(&mut buffer, endianness)?;
        Ok(buffer)
    }
}

fn to_id(index: usize) -> Result<u16, DnaError> {
    if index > MAX_ID {
        return Err(DnaErrorKind::ValueTooLarge.into());
    }
    Ok(index as u16)
}

struct WriteWrapper<W> {
    writer: W,
    position: usize,
    endian: Endian,
}

impl<W: Write> WriteWrapper<W> {
    fn new(writer: W, endian: Endian) -> Self {
        Self {
            writer,
            position: 0,
            endian,
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len();
        Ok(())
    }

    fn write_cstr(&mut self, string: &str) -> std::io::Result<()> {
        self.write_bytes(string.as_bytes())?;
        self.write_bytes(&[0])
    }

    fn write_u16(&mut self, value: u16) -> std::io::Result<()> {
        self.writer.iowrite_with(value, self.endian)?;
        self.position += 2;
        Ok(())
    }

    fn write_count(&mut self, count: usize) -> Result<(), DnaError> {
        let count = i32::try_from(count).map_err(|_| DnaErrorKind::ValueTooLarge)?;
        self.writer.iowrite_with(count, self.endian)?;
        self.position += 4;
        Ok(())
    }

    fn align(&mut self) -> std::io::Result<()> {
        let len = raw::padding(self.position, raw::SECTION_ALIGNMENT);
        self.write_bytes(&[0u8; raw::SECTION_ALIGNMENT][..len])
    }
}
