//! The struct catalog ("DNA") of physnap snapshots.
//!
//! Every snapshot ends with a catalog describing the serializable structs it contains: the name
//! and byte length of every type, and for every struct the type and name of each field. A loader
//! uses it to interpret chunk payloads without access to the compiled type definitions, even when
//! the snapshot was produced with a different pointer model or byte order.
//!
//! # Structure of a Catalog
//!
//! A catalog consists of the following sections, each opened by a four byte tag:
//!
//! 1. `SDNA` `NAME`: Decorated field names, such as `*m_name` or `m_floats[4]`.
//! 2. `TYPE`: Type names. The position of a type is its type index.
//! 3. `TLEN`: The byte length of every type, in type order.
//! 4. `STRC`: Struct descriptors. The position of a descriptor is its struct index.
//!
//! Counts are `i32`, lengths and indexes are `u16`. The string sections and the length table are
//! padded with zeros to a multiple of four bytes. See [`raw`] for the byte level layout.
//!
//! The byte size of a field follows from its decorated name: pointers occupy the size of an
//! address of the catalog's pointer model, and array suffixes multiply the size of the element.
//! As a consequence, catalogs are produced separately for 4-byte and 8-byte pointer models.
//!
//! # Usage
//!
//! [`Catalog::builtin`] returns the catalog of the physics structs shipped with this crate,
//! compiled once per process. [`Catalog::parse`] reads catalog bytes from other sources, and
//! [`CatalogBuilder`] compiles custom struct declarations.
//!
//! ```
//! use physnap_common::PointerWidth;
//! use physnap_dna::Catalog;
//!
//! let catalog = Catalog::builtin(PointerWidth::Eight)?;
//! let index = catalog.lookup_struct("btCollisionShapeData").unwrap();
//! assert_eq!(catalog.struct_len(index), Some(16));
//! # Ok::<(), physnap_dna::DnaError>(())
//! ```

#![warn(missing_docs)]

mod builder;
mod bullet;
mod catalog;
mod error;
pub mod raw;

pub use builder::*;
pub use bullet::*;
pub use catalog::*;
pub use error::*;
