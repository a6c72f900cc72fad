//! Parsing and lookups on the struct catalog.

use std::collections::HashMap;
use std::fmt;
use std::slice::ChunksExact;

use physnap_common::{Endianness, PointerWidth};
use scroll::{Endian, Pread};

use crate::raw::{self, DnaReader};
use crate::{DnaError, DnaErrorKind};

/// The struct index written into chunks whose struct type is not part of the catalog.
pub const INVALID_STRUCT_INDEX: i32 = -1;

/// A reference to one field of a [`StructDescriptor`], as stored in the catalog.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FieldRef {
    /// Index of the field's type.
    pub type_id: u16,
    /// Index of the field's decorated name.
    pub name_id: u16,
}

/// The description of one serializable struct.
///
/// Descriptors point into the catalog bytes they were parsed from and decode their fields on
/// access.
#[derive(Clone, Copy)]
pub struct StructDescriptor<'data> {
    type_id: u16,
    fields: &'data [u8],
    endian: Endian,
}

impl<'data> StructDescriptor<'data> {
    /// Returns the type index of this struct.
    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    /// Returns the number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len() / 4
    }

    /// Returns an iterator over the raw field references.
    pub fn field_refs(&self) -> impl Iterator<Item = FieldRef> + 'data {
        let endian = self.endian;
        self.fields.chunks_exact(4).filter_map(move |pair| {
            Some(FieldRef {
                type_id: pair.pread_with(0, endian).ok()?,
                name_id: pair.pread_with(2, endian).ok()?,
            })
        })
    }
}

impl fmt::Debug for StructDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDescriptor")
            .field("type_id", &self.type_id)
            .field("fields", &self.field_count())
            .finish()
    }
}

/// A field of a struct with its resolved names and placement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field<'data> {
    /// Index of the field's type.
    pub type_id: u16,
    /// Name of the field's type.
    pub type_name: &'data str,
    /// Decorated field name, including pointer and array markers.
    pub name: &'data str,
    /// Byte offset of the field within its struct.
    pub offset: usize,
    /// Byte size of the field.
    pub size: usize,
}

impl<'data> Field<'data> {
    /// Returns the field name without pointer and array decorations.
    pub fn ident(&self) -> &'data str {
        raw::field_ident(self.name)
    }

    /// Returns `true` if this field holds an address.
    pub fn is_pointer(&self) -> bool {
        self.name.starts_with('*') || self.name.starts_with('(')
    }
}

/// Iterator over the [`Field`]s of a struct.
pub struct Fields<'c, 'data> {
    catalog: &'c Catalog<'data>,
    pairs: ChunksExact<'data, u8>,
    offset: usize,
}

impl<'data> Iterator for Fields<'_, 'data> {
    type Item = Field<'data>;

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.pairs.next()?;
        let endian = Endian::from(self.catalog.endianness);
        let type_id: u16 = pair.pread_with(0, endian).ok()?;
        let name_id: u16 = pair.pread_with(2, endian).ok()?;

        // descriptors are validated during parsing
        let type_name = self.catalog.type_name(type_id)?;
        let name = self.catalog.name(name_id)?;
        let type_len = usize::from(self.catalog.type_len(type_id)?);
        let size = raw::field_size(name, type_len, self.catalog.pointer_width)?;

        let field = Field {
            type_id,
            type_name,
            name,
            offset: self.offset,
            size,
        };

        self.offset = self.offset.checked_add(size)?;
        Some(field)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pairs.size_hint()
    }
}

/// The parsed struct catalog.
///
/// The catalog lists every type known to a snapshot together with its byte size, and describes
/// the fields of every serializable struct. A catalog is tied to one pointer model and one byte
/// order. It is immutable once parsed and can be shared freely between serializer sessions.
///
/// Use [`Catalog::parse`] for catalog bytes from an external source, or
/// [`Catalog::builtin`](crate::Catalog::builtin) for the physics schema shipped with this crate.
pub struct Catalog<'data> {
    data: &'data [u8],
    pointer_width: PointerWidth,
    endianness: Endianness,
    names: Vec<&'data str>,
    types: Vec<&'data str>,
    type_lengths: Vec<u16>,
    structs: Vec<StructDescriptor<'data>>,
    struct_reverse: HashMap<u16, usize>,
    type_lookup: HashMap<&'data str, usize>,
}

impl<'data> Catalog<'data> {
    /// Parses catalog bytes produced for the given pointer model and byte order.
    ///
    /// Parsing stops after the struct descriptor section; the consumed prefix is available via
    /// [`as_bytes`](Self::as_bytes). A malformed catalog is rejected as a whole.
    #[tracing::instrument(level = "trace", name = "Catalog::parse", skip_all, fields(len = data.len()))]
    pub fn parse(
        data: &'data [u8],
        pointer_width: PointerWidth,
        endianness: Endianness,
    ) -> Result<Self, DnaError> {
        let endian = Endian::from(endianness);
        let mut reader = DnaReader::new(data, endian);

        if reader.peek_tag(&raw::SDNA_TAG) {
            reader.expect_tag(&raw::SDNA_TAG)?;
            reader.expect_tag(&raw::NAME_TAG)?;
        }

        let num_names = reader.read_count()?;
        let mut names = Vec::with_capacity(num_names.min(reader.remaining()));
        for _ in 0..num_names {
            names.push(reader.read_cstr()?);
        }
        reader.align()?;

        reader.expect_tag(&raw::TYPE_TAG)?;
        let num_types = reader.read_count()?;
        if num_types > usize::from(u16::MAX) {
            return Err(DnaErrorKind::BadCount.into());
        }
        let mut types = Vec::with_capacity(num_types.min(reader.remaining()));
        for _ in 0..num_types {
            types.push(reader.read_cstr()?);
        }
        reader.align()?;

        reader.expect_tag(&raw::TLEN_TAG)?;
        let mut type_lengths = Vec::with_capacity(types.len());
        for _ in 0..types.len() {
            type_lengths.push(reader.read_u16()?);
        }
        // an odd number of lengths leaves the cursor two bytes short of the next tag
        if types.len() % 2 == 1 {
            reader.skip(2)?;
        }

        reader.expect_tag(&raw::STRC_TAG)?;
        let num_structs = reader.read_count()?;
        let mut structs = Vec::with_capacity(num_structs.min(reader.remaining()));
        for _ in 0..num_structs {
            let type_id = reader.read_u16()?;
            let num_fields = usize::from(reader.read_u16()?);
            let fields = reader.read_bytes(num_fields * 4)?;

            let descriptor = StructDescriptor {
                type_id,
                fields,
                endian,
            };
            validate_descriptor(&descriptor, &names, &types, &type_lengths, pointer_width)?;
            structs.push(descriptor);
        }

        let mut struct_reverse = HashMap::with_capacity(structs.len());
        let mut type_lookup = HashMap::with_capacity(structs.len());
        for (index, descriptor) in structs.iter().enumerate() {
            struct_reverse.insert(descriptor.type_id, index);
            type_lookup.insert(types[usize::from(descriptor.type_id)], index);
        }

        let data = &data[..reader.offset()];
        tracing::trace!(
            names = names.len(),
            types = types.len(),
            structs = structs.len(),
            len = data.len(),
            "parsed catalog"
        );

        Ok(Self {
            data,
            pointer_width,
            endianness,
            names,
            types,
            type_lengths,
            structs,
            struct_reverse,
            type_lookup,
        })
    }

    /// Returns the raw catalog bytes, exactly as they are appended to a snapshot.
    pub fn as_bytes(&self) -> &'data [u8] {
        self.data
    }

    /// Checks that the catalog was produced for the given pointer model.
    pub fn ensure_pointer_width(&self, pointer_width: PointerWidth) -> Result<(), DnaError> {
        if self.pointer_width != pointer_width {
            return Err(DnaError::new(
                DnaErrorKind::PointerWidthMismatch,
                format!(
                    "catalog uses the {} pointer model, expected {}",
                    self.pointer_width, pointer_width
                ),
            ));
        }
        Ok(())
    }

    /// Returns the byte length of the catalog.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the catalog has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the pointer model this catalog describes.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// Returns the byte order of the catalog's integers.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Returns the number of field names.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Returns the decorated field name with the given index.
    pub fn name(&self, name_id: u16) -> Option<&'data str> {
        self.names.get(usize::from(name_id)).copied()
    }

    /// Returns the number of types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Returns the name of the type with the given index.
    pub fn type_name(&self, type_id: u16) -> Option<&'data str> {
        self.types.get(usize::from(type_id)).copied()
    }

    /// Returns the byte length of the type with the given index.
    pub fn type_len(&self, type_id: u16) -> Option<u16> {
        self.type_lengths.get(usize::from(type_id)).copied()
    }

    /// Returns all struct descriptors in catalog order.
    pub fn structs(&self) -> &[StructDescriptor<'data>] {
        &self.structs
    }

    /// Returns the struct descriptor with the given index.
    pub fn struct_descriptor(&self, index: usize) -> Option<&StructDescriptor<'data>> {
        self.structs.get(index)
    }

    /// Returns the type name of the struct with the given index.
    pub fn struct_name(&self, index: usize) -> Option<&'data str> {
        self.type_name(self.structs.get(index)?.type_id)
    }

    /// Returns the byte length of the struct with the given index.
    pub fn struct_len(&self, index: usize) -> Option<usize> {
        self.type_len(self.structs.get(index)?.type_id)
            .map(usize::from)
    }

    /// Looks up the struct index for a struct type name.
    ///
    /// Names are matched byte for byte.
    pub fn lookup_struct(&self, name: &str) -> Option<usize> {
        self.type_lookup.get(name).copied()
    }

    /// Looks up the struct index for a type index.
    pub fn struct_for_type(&self, type_id: u16) -> Option<usize> {
        self.struct_reverse.get(&type_id).copied()
    }

    /// Returns an iterator over the fields of the struct with the given index.
    pub fn fields(&self, index: usize) -> Option<Fields<'_, 'data>> {
        let descriptor = self.structs.get(index)?;
        Some(Fields {
            catalog: self,
            pairs: descriptor.fields.chunks_exact(4),
            offset: 0,
        })
    }

    /// Finds a field of a struct by its name, with or without decorations.
    pub fn field(&self, index: usize, name: &str) -> Option<Field<'data>> {
        self.fields(index)?
            .find(|field| field.name == name || field.ident() == name)
    }
}

fn validate_descriptor(
    descriptor: &StructDescriptor<'_>,
    names: &[&str],
    types: &[&str],
    type_lengths: &[u16],
    pointer_width: PointerWidth,
) -> Result<(), DnaError> {
    if usize::from(descriptor.type_id) >= types.len() {
        return Err(DnaError::new(
            DnaErrorKind::BadTypeIndex,
            format!("struct type {} is not declared", descriptor.type_id),
        ));
    }

    let struct_name = types[usize::from(descriptor.type_id)];
    let mut total = 0usize;
    for field in descriptor.field_refs() {
        let type_len = type_lengths
            .get(usize::from(field.type_id))
            .ok_or(DnaErrorKind::BadTypeIndex)?;
        let name = names
            .get(usize::from(field.name_id))
            .ok_or(DnaErrorKind::BadNameIndex)?;

        let size = raw::field_size(name, usize::from(*type_len), pointer_width).ok_or_else(|| {
            DnaError::new(
                DnaErrorKind::BadString,
                format!("malformed field name `{}`", name),
            )
        })?;

        total = total.checked_add(size).ok_or_else(|| {
            DnaError::new(
                DnaErrorKind::ValueTooLarge,
                format!("fields of `{}` overflow the address space", struct_name),
            )
        })?;
    }

    let declared = type_lengths
        .get(usize::from(descriptor.type_id))
        .map(|&len| usize::from(len))
        .ok_or(DnaErrorKind::BadTypeIndex)?;
    if total != declared {
        return Err(DnaError::new(
            DnaErrorKind::BadStructLength,
            format!(
                "fields of `{}` span {} bytes, its length is {}",
                struct_name, total, declared
            ),
        ));
    }

    Ok(())
}

impl fmt::Debug for Catalog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("pointer_width", &self.pointer_width)
            .field("endianness", &self.endianness)
            .field("names", &self.names.len())
            .field("types", &self.types.len())
            .field("structs", &self.structs.len())
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A catalog with one self-referencing struct, assembled by hand:
    ///
    /// ```c
    /// struct Node { int m_a; struct Node *next; float m_v[2]; };
    /// ```
    ///
    /// Every variable-length section ends off a 4-byte boundary and the type count is odd, so
    /// each padding rule is exercised.
    fn node_catalog_le() -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"SDNANAME");
        blob.extend_from_slice(&3i32.to_le_bytes());
        blob.extend_from_slice(b"m_a\0*next\0m_v[2]\0");
        blob.extend_from_slice(&[0; 3]);
        blob.extend_from_slice(b"TYPE");
        blob.extend_from_slice(&3i32.to_le_bytes());
        blob.extend_from_slice(b"int\0float\0Node\0");
        blob.extend_from_slice(&[0; 1]);
        blob.extend_from_slice(b"TLEN");
        for len in [4u16, 4, 20] {
            blob.extend_from_slice(&len.to_le_bytes());
        }
        blob.extend_from_slice(&[0; 2]);
        blob.extend_from_slice(b"STRC");
        blob.extend_from_slice(&1i32.to_le_bytes());
        for value in [2u16, 3, 0, 0, 2, 1, 1, 2] {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        blob
    }

    #[test]
    fn test_parse_node_catalog() {
        let blob = node_catalog_le();
        assert_eq!(blob.len(), 92);

        let catalog = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap();
        assert_eq!(catalog.len(), 92);
        assert_eq!(catalog.name_count(), 3);
        assert_eq!(catalog.type_count(), 3);
        assert_eq!(catalog.type_name(2), Some("Node"));
        assert_eq!(catalog.type_len(2), Some(20));
        assert_eq!(catalog.lookup_struct("Node"), Some(0));
        assert_eq!(catalog.lookup_struct("node"), None);
        assert_eq!(catalog.lookup_struct("int"), None);
        assert_eq!(catalog.struct_for_type(2), Some(0));
        assert_eq!(catalog.struct_len(0), Some(20));

        let fields: Vec<_> = catalog
            .fields(0)
            .unwrap()
            .map(|f| (f.ident(), f.offset, f.size))
            .collect();
        assert_eq!(fields, [("m_a", 0, 4), ("next", 4, 8), ("m_v", 12, 8)]);
    }

    #[test]
    fn test_builder_matches_hand_assembled() {
        let mut builder = crate::CatalogBuilder::new(PointerWidth::Eight);
        builder.add_primitive("int", 4).unwrap();
        builder.add_primitive("float", 4).unwrap();
        builder
            .add_struct("Node", [("int", "m_a"), ("Node", "*next"), ("float", "m_v[2]")])
            .unwrap();

        let built = builder.to_bytes(Endianness::Little).unwrap();
        similar_asserts::assert_eq!(built, node_catalog_le());
    }

    #[test]
    fn test_parse_without_sdna_tag() {
        let blob = node_catalog_le();
        // dropping "SDNANAME" shifts every section by 8 bytes, which keeps the padding intact
        let catalog = Catalog::parse(&blob[8..], PointerWidth::Eight, Endianness::Little).unwrap();
        assert_eq!(catalog.len(), 84);
        assert_eq!(catalog.lookup_struct("Node"), Some(0));
    }

    #[test]
    fn test_ignores_trailing_data() {
        let mut blob = node_catalog_le();
        blob.extend_from_slice(b"trailing");
        let catalog = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap();
        assert_eq!(catalog.as_bytes(), &blob[..92]);
    }

    #[test]
    fn test_bad_tag() {
        let mut blob = node_catalog_le();
        blob[32..36].copy_from_slice(b"TYPX");
        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadTag);
    }

    #[test]
    fn test_missing_padding() {
        let mut blob = node_catalog_le();
        // remove the padding after the names
        blob.drain(29..32);
        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadTag);
    }

    #[test]
    fn test_truncated() {
        let blob = node_catalog_le();
        for len in [0, 6, 20, 50, 70, 90] {
            let result = Catalog::parse(&blob[..len], PointerWidth::Eight, Endianness::Little);
            assert!(result.is_err(), "parsed truncated catalog of {} bytes", len);
        }
    }

    #[test]
    fn test_bad_type_index() {
        let mut blob = node_catalog_le();
        // the struct's own type id
        blob[76..78].copy_from_slice(&9u16.to_le_bytes());
        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadTypeIndex);
    }

    #[test]
    fn test_bad_name_index() {
        let mut blob = node_catalog_le();
        // the name of the last field
        blob[90..92].copy_from_slice(&3u16.to_le_bytes());
        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadNameIndex);
    }

    /// Assembles a little endian catalog from raw sections.
    fn assemble_le(names: &[&str], types: &[(&str, u16)], structs: &[&[u16]]) -> Vec<u8> {
        fn pad(blob: &mut Vec<u8>) {
            blob.resize(blob.len() + raw::padding(blob.len(), 4), 0);
        }

        let mut blob = Vec::new();
        blob.extend_from_slice(b"SDNANAME");
        blob.extend_from_slice(&(names.len() as i32).to_le_bytes());
        for name in names {
            blob.extend_from_slice(name.as_bytes());
            blob.push(0);
        }
        pad(&mut blob);

        blob.extend_from_slice(b"TYPE");
        blob.extend_from_slice(&(types.len() as i32).to_le_bytes());
        for (name, _) in types {
            blob.extend_from_slice(name.as_bytes());
            blob.push(0);
        }
        pad(&mut blob);

        blob.extend_from_slice(b"TLEN");
        for (_, len) in types {
            blob.extend_from_slice(&len.to_le_bytes());
        }
        pad(&mut blob);

        blob.extend_from_slice(b"STRC");
        blob.extend_from_slice(&(structs.len() as i32).to_le_bytes());
        for descriptor in structs {
            for value in descriptor.iter() {
                blob.extend_from_slice(&value.to_le_bytes());
            }
        }
        blob
    }

    #[test]
    fn test_assembled_matches_node_catalog() {
        let blob = assemble_le(
            &["m_a", "*next", "m_v[2]"],
            &[("int", 4), ("float", 4), ("Node", 20)],
            &[&[2, 3, 0, 0, 2, 1, 1, 2]],
        );
        assert_eq!(blob, node_catalog_le());
    }

    #[test]
    fn test_struct_length_overflow() {
        let first = format!("m_a[{}]", usize::MAX);
        let second = format!("m_b[{}]", usize::MAX);
        let blob = assemble_le(
            &[first.as_str(), second.as_str()],
            &[("char", 1), ("Huge", 0)],
            &[&[1, 2, 0, 0, 0, 1]],
        );

        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::ValueTooLarge);
    }

    #[test]
    fn test_struct_length_mismatch() {
        let mut blob = node_catalog_le();
        // the length of `Node`
        blob[64..66].copy_from_slice(&24u16.to_le_bytes());
        let err = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadStructLength);

        // pointers are four bytes narrower in the other pointer model
        let blob = node_catalog_le();
        let err = Catalog::parse(&blob, PointerWidth::Four, Endianness::Little).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::BadStructLength);
    }

    #[test]
    fn test_pointer_width_mismatch() {
        let blob = node_catalog_le();
        let catalog = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap();
        assert!(catalog.ensure_pointer_width(PointerWidth::Eight).is_ok());

        let err = catalog.ensure_pointer_width(PointerWidth::Four).unwrap_err();
        assert_eq!(err.kind(), DnaErrorKind::PointerWidthMismatch);
    }

    #[test]
    fn test_debug() {
        let blob = node_catalog_le();
        let catalog = Catalog::parse(&blob, PointerWidth::Eight, Endianness::Little).unwrap();
        insta::assert_debug_snapshot!(catalog, @r###"
        Catalog {
            pointer_width: Eight,
            endianness: Little,
            names: 3,
            types: 3,
            structs: 1,
            len: 92,
        }
        "###);
    }
}
