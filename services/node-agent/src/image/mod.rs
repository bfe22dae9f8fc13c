//! Container image handling.
//!
//! - `reference`: structured image reference parsing and matching
//! - `store`: the CRI-compatible image store seam and a mock engine

pub mod reference;
pub mod store;

pub use reference::{ImageReference, ReferenceError};
pub use store::{ImageRecord, ImageStore, ImageStoreError, ImageStoreProvider, MockImageStore};
