//! # strata-common
//!
//! Common types and constants for StrataDB.
//!
//! This crate provides the foundational definitions shared by the storage
//! engine components:
//!
//! - **Types**: type-safe identifier newtypes such as [`PageId`]
//! - **Constants**: page sizing and buffer pool defaults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

pub use types::PageId;
