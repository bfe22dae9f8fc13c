//! nodeos Node Agent Library
//!
//! The node agent runs a set of independent reconciliation controllers
//! over the node's versioned resource graph. Each controller declares
//! the inputs it watches and the outputs it owns, then loops: wake on
//! a coalesced change notification (or a timer), recompute derived
//! state from the current graph, commit it back.
//!
//! ## Architecture
//!
//! ```text
//! ControllerRegistry
//! ├── network.StatusController   (readiness summary aggregation)
//! └── runtime.ImageGcController  (container image garbage collection)
//! ```
//!
//! Controllers never share mutable state; the resource store is the
//! only communication channel between them. A failed controller is
//! restarted by the runner with exponential backoff, reset once the
//! controller commits forward progress again.
//!
//! ## Modules
//!
//! - `controller`: the reconciliation contract, registry, and runner
//! - `controllers`: concrete controller implementations
//! - `image`: image reference parsing and the image store seam

pub mod controller;
pub mod controllers;
pub mod image;

// Internal modules exposed for integration tests
pub mod config;

// Re-export commonly used types
pub use controller::{
    Controller, ControllerContext, ControllerError, ControllerRegistry, Input, InputKind, Output,
    OutputKind,
};
pub use image::{ImageRecord, ImageReference, ImageStore, MockImageStore};
