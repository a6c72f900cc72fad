//! Common functionality for `physnap`.
//!
//! This crate exposes the vocabulary shared by the catalog and the snapshot writer:
//!
//!  - [`Precision`]: Whether the simulation uses `float` or `double` scalars.
//!  - [`PointerWidth`]: The pointer model a snapshot and its catalog were produced for.
//!  - [`Endianness`]: The byte order of all integers in a snapshot.
//!  - [`ChunkCode`]: The four character code labeling every chunk.
//!
//! # Features
//!
//! - `serde` (optional): Implements `serde::Deserialize` and `serde::Serialize` for the
//!   configuration types. In the `physnap` crate, this feature is exposed via `serde`.
//!
//! This module is part of the `physnap` crate.

#![warn(missing_docs)]

mod types;

pub use crate::types::*;
