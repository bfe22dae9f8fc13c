//! Concrete reconciliation controllers.
//!
//! - `network_status`: folds network facts into the readiness summary
//! - `image_gc`: garbage-collects unreferenced container images

pub mod image_gc;
pub mod network_status;

pub use image_gc::{ImageGcConfig, ImageGcController};
pub use network_status::NetworkStatusController;
