use std::sync::{Arc, Barrier};
use std::thread;

use physnap_common::{Endianness, PointerWidth};
use physnap_dna::{bullet_builder, Catalog, BULLET_STRUCTS};

type Error = Box<dyn std::error::Error>;

#[test]
fn test_both_pointer_models() -> Result<(), Error> {
    for width in [PointerWidth::Four, PointerWidth::Eight] {
        let catalog = Catalog::builtin(width)?;
        assert_eq!(catalog.pointer_width(), width);
        assert_eq!(catalog.endianness(), Endianness::host());
        assert_eq!(catalog.structs().len(), BULLET_STRUCTS.len());
        assert_eq!(catalog.len() % 4, 0);
        assert_eq!(&catalog.as_bytes()[..8], b"SDNANAME");
    }

    Ok(())
}

#[test]
fn test_concurrent_first_use() -> Result<(), Error> {
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                Catalog::builtin(PointerWidth::Four).map_err(|e| e.to_string())
            })
        })
        .collect();

    let mut catalogs = Vec::new();
    for handle in handles {
        let catalog = handle.join().map_err(|_| "thread panicked")??;
        catalogs.push(catalog);
    }

    let first = catalogs[0];
    for catalog in &catalogs {
        assert!(std::ptr::eq(first, *catalog));
    }
    assert!(std::ptr::eq(first, Catalog::builtin(PointerWidth::Four)?));

    Ok(())
}

#[test]
fn test_pointer_sized_fields() -> Result<(), Error> {
    let four = Catalog::builtin(PointerWidth::Four)?;
    let eight = Catalog::builtin(PointerWidth::Eight)?;

    let expected = [
        ("btVector3FloatData", 16, 16),
        ("btVector3DoubleData", 32, 32),
        ("btTransformFloatData", 64, 64),
        ("btCollisionShapeData", 12, 16),
        ("btConvexInternalShapeData", 52, 56),
        ("btCompoundShapeChildData", 76, 80),
        ("btTypedConstraintData", 44, 56),
    ];

    for (name, len_four, len_eight) in expected {
        let index = four.lookup_struct(name).ok_or("missing struct")?;
        assert_eq!(four.struct_len(index), Some(len_four), "{}", name);
        assert_eq!(eight.lookup_struct(name), Some(index));
        assert_eq!(eight.struct_len(index), Some(len_eight), "{}", name);
    }

    Ok(())
}

#[test]
fn test_lookup_round_trip() -> Result<(), Error> {
    let catalog = Catalog::builtin(PointerWidth::Eight)?;

    for (index, descriptor) in catalog.structs().iter().enumerate() {
        let name = catalog
            .type_name(descriptor.type_id())
            .ok_or("missing type name")?;
        assert_eq!(catalog.lookup_struct(name), Some(index));
        assert_eq!(catalog.struct_for_type(descriptor.type_id()), Some(index));
    }

    assert_eq!(catalog.lookup_struct("btSoftBodyFloatData"), None);
    Ok(())
}

#[test]
fn test_field_offsets() -> Result<(), Error> {
    let catalog = Catalog::builtin(PointerWidth::Eight)?;
    let index = catalog
        .lookup_struct("btRigidBodyFloatData")
        .ok_or("missing struct")?;

    let object = catalog
        .field(index, "m_collisionObjectData")
        .ok_or("missing field")?;
    assert_eq!(object.offset, 0);
    assert_eq!(object.type_name, "btCollisionObjectFloatData");

    let mass = catalog
        .field(index, "m_inverseMass")
        .ok_or("missing field")?;
    let gravity = catalog.field(index, "m_gravity").ok_or("missing field")?;
    assert_eq!(mass.size, 4);
    assert_eq!(gravity.size, 16);
    assert!(gravity.offset < mass.offset);

    let total: usize = catalog.fields(index).ok_or("missing struct")?.map(|f| f.size).sum();
    assert_eq!(catalog.struct_len(index), Some(total));

    Ok(())
}

#[test]
fn test_foreign_byte_order() -> Result<(), Error> {
    let foreign = match Endianness::host() {
        Endianness::Little => Endianness::Big,
        Endianness::Big => Endianness::Little,
    };

    let bytes = bullet_builder(PointerWidth::Four)?.to_bytes(foreign)?;
    let catalog = Catalog::parse(&bytes, PointerWidth::Four, foreign)?;
    let builtin = Catalog::builtin(PointerWidth::Four)?;

    assert_eq!(catalog.len(), builtin.len());
    assert_ne!(catalog.as_bytes(), builtin.as_bytes());
    for index in 0..builtin.structs().len() {
        assert_eq!(catalog.struct_name(index), builtin.struct_name(index));
        assert_eq!(catalog.struct_len(index), builtin.struct_len(index));
    }

    // reading with the wrong byte order misinterprets the counts
    assert!(Catalog::parse(&bytes, PointerWidth::Four, Endianness::host()).is_err());

    Ok(())
}
