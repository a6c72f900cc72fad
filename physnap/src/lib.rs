//! Physnap writes the state of a physics simulation into self-describing binary snapshots.
//!
//! A snapshot holds the serialized rigid bodies, collision shapes and constraints of a simulation
//! together with a catalog describing the layout of every serialized struct. It can be loaded on
//! machines with a different pointer width or byte order, without the compiled type definitions of
//! the producing process.
//!
//! # What's in the package
//!
//! - A struct catalog ("DNA") with a parser, a compiler for struct declarations and the built-in
//!   physics schema for 4-byte and 8-byte pointer models.
//! - A capacity-checked serializer writing chunks labeled with their struct type, chunk code and
//!   original address.
//! - A read-only inspector for finished snapshots.
//!
//! # Usage
//!
//! Add `physnap` as a dependency to your `Cargo.toml`. The following features are available:
//!
//! - **`dna`** (default): The struct catalog.
//! - **`snapshot`** (default): The serializer and inspector. Implies `dna`.
//! - **`serde`**: Implements `serde::{Deserialize, Serialize}` for the configuration types.
//!
//! ```
//! # #[cfg(feature = "snapshot")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use physnap::common::ChunkCode;
//! use physnap::dna::Catalog;
//! use physnap::snapshot::{Serializer, SerializerOptions};
//!
//! let catalog = Catalog::host()?;
//! let mut serializer = Serializer::new(catalog, SerializerOptions::for_catalog(catalog))?;
//! serializer.start_session()?;
//!
//! let index = catalog.lookup_struct("btCollisionShapeData").unwrap();
//! let handle = serializer.allocate(catalog.struct_len(index).unwrap(), 1)?;
//! serializer.finalize_chunk(&handle, "btCollisionShapeData", ChunkCode::SHAPE, 0x1000u64)?;
//! serializer.end_session()?;
//!
//! let snapshot = serializer.into_bytes();
//! # assert!(snapshot.starts_with(b"BULLETf"));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "snapshot"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]

#[doc(inline)]
pub use physnap_common as common;
#[doc(inline)]
#[cfg(feature = "dna")]
pub use physnap_dna as dna;
#[doc(inline)]
#[cfg(feature = "snapshot")]
pub use physnap_snapshot as snapshot;
