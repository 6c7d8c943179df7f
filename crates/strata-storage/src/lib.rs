//! # strata-storage
//!
//! Storage engine core for StrataDB.
//!
//! This crate implements the disk-facing half of the engine:
//!
//! - A synchronous [`disk`] layer: the [`disk::DiskManager`] seam plus
//!   file-backed and in-memory implementations
//! - The [`buffer`] pool: a fixed-size page cache with LRU-K replacement,
//!   pin counting, and scoped page guards

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod disk;
