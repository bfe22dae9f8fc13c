//! # nodeos-resources
//!
//! Versioned resource model and store interface for the nodeos node
//! agent.
//!
//! ## Design Principles
//!
//! - A resource is identified by (namespace, kind, id) and carries a
//!   monotonically increasing version plus a typed spec payload
//! - All mutation goes through `modify`: read the current value (or a
//!   zero value), apply a pure transform, commit — never a blind
//!   overwrite
//! - Readers treat `NotFound` as "dependency not yet materialized",
//!   any other failure as fatal for the current cycle
//! - Change notifications are coalesced: multiple commits may collapse
//!   into a single wake
//!
//! The production storage engine lives outside this crate; `Store` is
//! the narrow interface controllers consume, and `MemoryStore` is the
//! reference engine used by the node agent and by tests.

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::{MemoryStore, Store, Transform};
pub use types::*;
