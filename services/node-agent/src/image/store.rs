//! Image store seam.
//!
//! The garbage collector talks to the container runtime's image store
//! through this narrow interface. The production client is external
//! and CRI-compatible; `MockImageStore` is the in-process engine used
//! in development and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from image store operations. All are fatal to the caller's
/// current cycle.
#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("error creating image store client: {0}")]
    Connect(String),

    #[error("error listing images: {0}")]
    List(String),

    #[error("failed to delete an image {name}: {reason}")]
    Delete { name: String, reason: String },
}

/// An image as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Full reference string the image is stored under.
    pub name: String,

    /// When the image was created locally.
    pub created_at: DateTime<Utc>,
}

/// CRI-compatible image store client.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// List all images.
    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError>;

    /// Delete an image by name.
    async fn delete(&self, name: &str) -> Result<(), ImageStoreError>;

    /// Release the client. Called exactly once, on controller exit.
    async fn close(&self);
}

/// Provider constructing the image store handle lazily.
pub type ImageStoreProvider =
    Box<dyn Fn() -> Result<Box<dyn ImageStore>, ImageStoreError> + Send + Sync>;

struct MockInner {
    images: Mutex<Vec<ImageRecord>>,
    deleted: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
    closed: AtomicBool,
}

/// In-memory image store for development and tests.
///
/// Cheaply cloneable; clones share the same image set, so a test can
/// keep a handle to a store whose other clone was moved into a
/// controller.
#[derive(Clone)]
pub struct MockImageStore {
    inner: Arc<MockInner>,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self::with_images(Vec::new())
    }

    pub fn with_images(images: Vec<ImageRecord>) -> Self {
        Self {
            inner: Arc::new(MockInner {
                images: Mutex::new(images),
                deleted: Mutex::new(Vec::new()),
                fail_deletes: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Add an image to the store.
    pub async fn push(&self, name: &str, created_at: DateTime<Utc>) {
        self.inner.images.lock().await.push(ImageRecord {
            name: name.to_string(),
            created_at,
        });
    }

    /// Names deleted so far, in deletion order.
    pub async fn deleted(&self) -> Vec<String> {
        self.inner.deleted.lock().await.clone()
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.inner.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError> {
        Ok(self.inner.images.lock().await.clone())
    }

    async fn delete(&self, name: &str) -> Result<(), ImageStoreError> {
        if self.inner.fail_deletes.load(Ordering::SeqCst) {
            return Err(ImageStoreError::Delete {
                name: name.to_string(),
                reason: "induced failure".to_string(),
            });
        }

        self.inner.images.lock().await.retain(|i| i.name != name);
        self.inner.deleted.lock().await.push(name.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
