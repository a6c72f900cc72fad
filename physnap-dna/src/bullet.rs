//! The built-in catalog of rigid body, shape and constraint structs.

use once_cell::sync::OnceCell;
use physnap_common::{Endianness, PointerWidth};

use crate::{Catalog, CatalogBuilder, DnaError};

type StructDecl = (&'static str, &'static [(&'static str, &'static str)]);

/// Declarations of all serializable structs, in catalog order.
///
/// Pointer fields are sized by the pointer model, so the struct lengths differ between the 4-byte
/// and 8-byte variants of the catalog.
pub static BULLET_STRUCTS: &[StructDecl] = &[
    ("btVector3FloatData", &[("float", "m_floats[4]")]),
    ("btVector3DoubleData", &[("double", "m_floats[4]")]),
    ("btMatrix3x3FloatData", &[("btVector3FloatData", "m_el[3]")]),
    ("btMatrix3x3DoubleData", &[("btVector3DoubleData", "m_el[3]")]),
    (
        "btTransformFloatData",
        &[
            ("btMatrix3x3FloatData", "m_basis"),
            ("btVector3FloatData", "m_origin"),
        ],
    ),
    (
        "btTransformDoubleData",
        &[
            ("btMatrix3x3DoubleData", "m_basis"),
            ("btVector3DoubleData", "m_origin"),
        ],
    ),
    (
        "btCollisionShapeData",
        &[
            ("char", "*m_name"),
            ("int", "m_shapeType"),
            ("char", "m_padding[4]"),
        ],
    ),
    (
        "btConvexInternalShapeData",
        &[
            ("btCollisionShapeData", "m_collisionShapeData"),
            ("btVector3FloatData", "m_localScaling"),
            ("btVector3FloatData", "m_implicitShapeDimensions"),
            ("float", "m_collisionMargin"),
            ("int", "m_padding"),
        ],
    ),
    (
        "btCapsuleShapeData",
        &[
            ("btConvexInternalShapeData", "m_convexInternalShapeData"),
            ("int", "m_upAxis"),
            ("char", "m_padding[4]"),
        ],
    ),
    (
        "btCylinderShapeData",
        &[
            ("btConvexInternalShapeData", "m_convexInternalShapeData"),
            ("int", "m_upAxis"),
            ("char", "m_padding[4]"),
        ],
    ),
    (
        "btStaticPlaneShapeData",
        &[
            ("btCollisionShapeData", "m_collisionShapeData"),
            ("btVector3FloatData", "m_localScaling"),
            ("btVector3FloatData", "m_planeNormal"),
            ("float", "m_planeConstant"),
            ("char", "m_pad[4]"),
        ],
    ),
    (
        "btCompoundShapeChildData",
        &[
            ("btTransformFloatData", "m_transform"),
            ("btCollisionShapeData", "*m_childShape"),
            ("int", "m_childShapeType"),
            ("float", "m_childMargin"),
        ],
    ),
    (
        "btCompoundShapeData",
        &[
            ("btCollisionShapeData", "m_collisionShapeData"),
            ("btCompoundShapeChildData", "*m_childShapePtr"),
            ("int", "m_numChildShapes"),
            ("float", "m_collisionMargin"),
        ],
    ),
    (
        "btCollisionObjectFloatData",
        &[
            ("void", "*m_broadphaseHandle"),
            ("void", "*m_collisionShape"),
            ("btCollisionShapeData", "*m_rootCollisionShape"),
            ("char", "*m_name"),
            ("btTransformFloatData", "m_worldTransform"),
            ("btTransformFloatData", "m_interpolationWorldTransform"),
            ("btVector3FloatData", "m_interpolationLinearVelocity"),
            ("btVector3FloatData", "m_interpolationAngularVelocity"),
            ("btVector3FloatData", "m_anisotropicFriction"),
            ("float", "m_contactProcessingThreshold"),
            ("float", "m_deactivationTime"),
            ("float", "m_friction"),
            ("float", "m_restitution"),
            ("float", "m_hitFraction"),
            ("float", "m_ccdSweptSphereRadius"),
            ("float", "m_ccdMotionThreshold"),
            ("int", "m_hasAnisotropicFriction"),
            ("int", "m_collisionFlags"),
            ("int", "m_islandTag1"),
            ("int", "m_companionId"),
            ("int", "m_activationState1"),
            ("int", "m_internalType"),
            ("int", "m_checkCollideWith"),
            ("char", "m_padding[4]"),
        ],
    ),
    (
        "btRigidBodyFloatData",
        &[
            ("btCollisionObjectFloatData", "m_collisionObjectData"),
            ("btMatrix3x3FloatData", "m_invInertiaTensorWorld"),
            ("btVector3FloatData", "m_linearVelocity"),
            ("btVector3FloatData", "m_angularVelocity"),
            ("btVector3FloatData", "m_angularFactor"),
            ("btVector3FloatData", "m_linearFactor"),
            ("btVector3FloatData", "m_gravity"),
            ("btVector3FloatData", "m_gravity_acceleration"),
            ("btVector3FloatData", "m_invInertiaLocal"),
            ("btVector3FloatData", "m_totalForce"),
            ("btVector3FloatData", "m_totalTorque"),
            ("float", "m_inverseMass"),
            ("float", "m_linearDamping"),
            ("float", "m_angularDamping"),
            ("float", "m_additionalDampingFactor"),
            ("float", "m_additionalLinearDampingThresholdSqr"),
            ("float", "m_additionalAngularDampingThresholdSqr"),
            ("float", "m_additionalAngularDampingFactor"),
            ("float", "m_linearSleepingThreshold"),
            ("float", "m_angularSleepingThreshold"),
            ("int", "m_additionalDamping"),
        ],
    ),
    (
        "btTypedConstraintData",
        &[
            ("btRigidBodyFloatData", "*m_rbA"),
            ("btRigidBodyFloatData", "*m_rbB"),
            ("char", "*m_name"),
            ("int", "m_objectType"),
            ("int", "m_userConstraintType"),
            ("int", "m_userConstraintId"),
            ("int", "m_needsFeedback"),
            ("float", "m_appliedImpulse"),
            ("float", "m_dbgDrawSize"),
            ("int", "m_disableCollisionsBetweenLinkedBodies"),
            ("char", "m_pad4[4]"),
        ],
    ),
    (
        "btPoint2PointConstraintFloatData",
        &[
            ("btTypedConstraintData", "m_typeConstraintData"),
            ("btVector3FloatData", "m_pivotInA"),
            ("btVector3FloatData", "m_pivotInB"),
        ],
    ),
    (
        "btHingeConstraintFloatData",
        &[
            ("btTypedConstraintData", "m_typeConstraintData"),
            ("btTransformFloatData", "m_rbAFrame"),
            ("btTransformFloatData", "m_rbBFrame"),
            ("int", "m_useReferenceFrameA"),
            ("int", "m_angularOnly"),
            ("int", "m_enableAngularMotor"),
            ("float", "m_motorTargetVelocity"),
            ("float", "m_maxMotorImpulse"),
            ("float", "m_lowerLimit"),
            ("float", "m_upperLimit"),
            ("float", "m_limitSoftness"),
            ("float", "m_biasFactor"),
            ("float", "m_relaxationFactor"),
        ],
    ),
    (
        "btSliderConstraintData",
        &[
            ("btTypedConstraintData", "m_typeConstraintData"),
            ("btTransformFloatData", "m_rbAFrame"),
            ("btTransformFloatData", "m_rbBFrame"),
            ("float", "m_linearUpperLimit"),
            ("float", "m_linearLowerLimit"),
            ("float", "m_angularUpperLimit"),
            ("float", "m_angularLowerLimit"),
            ("int", "m_useLinearReferenceFrameA"),
            ("int", "m_useOffsetForConstraintFrame"),
        ],
    ),
    (
        "btGeneric6DofConstraintData",
        &[
            ("btTypedConstraintData", "m_typeConstraintData"),
            ("btTransformFloatData", "m_rbAFrame"),
            ("btTransformFloatData", "m_rbBFrame"),
            ("btVector3FloatData", "m_linearUpperLimit"),
            ("btVector3FloatData", "m_linearLowerLimit"),
            ("btVector3FloatData", "m_angularUpperLimit"),
            ("btVector3FloatData", "m_angularLowerLimit"),
            ("int", "m_useLinearReferenceFrameA"),
            ("int", "m_useOffsetForConstraintFrame"),
        ],
    ),
];

/// Declares the built-in physics structs on a fresh builder.
pub fn bullet_builder(pointer_width: PointerWidth) -> Result<CatalogBuilder, DnaError> {
    let mut builder = CatalogBuilder::with_primitives(pointer_width);
    for &(name, fields) in BULLET_STRUCTS {
        builder.add_struct(name, fields.iter().copied())?;
    }
    Ok(builder)
}

static BLOB_32: OnceCell<Vec<u8>> = OnceCell::new();
static BLOB_64: OnceCell<Vec<u8>> = OnceCell::new();
static CATALOG_32: OnceCell<Catalog<'static>> = OnceCell::new();
static CATALOG_64: OnceCell<Catalog<'static>> = OnceCell::new();

/// Returns the compiled bytes of the built-in catalog for the given pointer model.
///
/// The bytes use the byte order of the running process and are compiled at most once.
pub fn bullet_catalog_bytes(pointer_width: PointerWidth) -> Result<&'static [u8], DnaError> {
    let cell = match pointer_width {
        PointerWidth::Four => &BLOB_32,
        PointerWidth::Eight => &BLOB_64,
    };

    let blob = cell.get_or_try_init(|| {
        tracing::debug!(%pointer_width, "compiling built-in catalog");
        bullet_builder(pointer_width)?.to_bytes(Endianness::host())
    })?;

    Ok(blob)
}

impl Catalog<'static> {
    /// Returns the built-in catalog for the given pointer model.
    ///
    /// Each variant is compiled and parsed at most once per process, even when first requested
    /// from several threads at the same time. Repeated calls return the same catalog.
    pub fn builtin(pointer_width: PointerWidth) -> Result<&'static Self, DnaError> {
        let cell = match pointer_width {
            PointerWidth::Four => &CATALOG_32,
            PointerWidth::Eight => &CATALOG_64,
        };

        cell.get_or_try_init(|| {
            let blob = bullet_catalog_bytes(pointer_width)?;
            Catalog::parse(blob, pointer_width, Endianness::host())
        })
    }

    /// Returns the built-in catalog matching the pointer model of the running process.
    pub fn host() -> Result<&'static Self, DnaError> {
        Self::builtin(PointerWidth::host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_cached() {
        let first = Catalog::builtin(PointerWidth::Four).unwrap();
        let second = Catalog::builtin(PointerWidth::Four).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.pointer_width(), PointerWidth::Four);
    }

    #[test]
    fn test_host() {
        let catalog = Catalog::host().unwrap();
        assert_eq!(catalog.pointer_width(), PointerWidth::host());
        assert_eq!(catalog.endianness(), Endianness::host());
    }

    #[test]
    fn test_all_structs_registered() {
        let catalog = Catalog::builtin(PointerWidth::Eight).unwrap();
        assert_eq!(catalog.structs().len(), BULLET_STRUCTS.len());
        for (index, (name, fields)) in BULLET_STRUCTS.iter().enumerate() {
            assert_eq!(catalog.lookup_struct(name), Some(index));
            assert_eq!(catalog.struct_name(index), Some(*name));
            assert_eq!(catalog.fields(index).unwrap().count(), fields.len());
        }
    }
}
