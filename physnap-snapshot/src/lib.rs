//! Writes physics simulation state into self-describing snapshots.
//!
//! A snapshot is a single relocatable buffer holding the serialized objects of a simulation:
//! rigid bodies, collision shapes and constraints. It carries the catalog describing the layout
//! of every serialized struct, so a loader can read it without the compiled type definitions,
//! even on a machine with another pointer width or byte order.
//!
//! # Structure of a Snapshot
//!
//! A snapshot contains the following parts, in this order:
//!
//! 1. Header
//! 2. Chunks
//! 3. Catalog
//!
//! ## Header
//!
//! The header is 12 bytes long:
//!
//! | Offset | Size | Content                                                 |
//! |--------|------|---------------------------------------------------------|
//! | 0      | 7    | `BULLETf` for single precision, `BULLETd` for double    |
//! | 7      | 1    | `-` for 8-byte pointers, `_` for 4-byte pointers        |
//! | 8      | 1    | `v` for little endian, `V` for big endian               |
//! | 9      | 3    | version, `276`                                          |
//!
//! ## Chunks
//!
//! Every serialized object occupies one chunk: a chunk header immediately followed by the
//! payload. The header records
//!
//! - a four character code naming the kind of object, such as `RBDY` for rigid bodies,
//! - the byte length of the payload,
//! - the address the object had in the memory of the producing process,
//! - the catalog index of the payload's struct type, or `-1` if it is unknown,
//! - the number of struct elements in the payload.
//!
//! The address has the size of a pointer, so chunk headers are 20 or 24 bytes long. Addresses are
//! opaque keys: pointer fields within payloads keep their original values, and a loader relocates
//! them by matching against the addresses of chunks.
//!
//! ## Catalog
//!
//! The snapshot ends with the catalog, starting with the tag `SDNA`. This code is never used for a
//! chunk. See [`physnap_dna`] for its structure.
//!
//! # Writing
//!
//! The [`Serializer`] writes snapshots into a buffer of fixed capacity. Running out of space is
//! reported as [`SnapshotErrorKind::CapacityExceeded`] before anything is written, after which the
//! caller can grow the buffer and retry. [`Snapshot`] parses finished snapshots for inspection.

#![warn(missing_docs)]

mod error;
mod header;
pub mod raw;
mod serializer;
mod snapshot;

pub use error::*;
pub use header::*;
pub use raw::{ChunkHeader, HEADER_LENGTH, VERSION};
pub use serializer::*;
pub use snapshot::*;
