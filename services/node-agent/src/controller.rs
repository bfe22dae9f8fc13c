//! The reconciliation contract shared by every controller.
//!
//! Provides the building blocks of the controller runtime:
//! - `Controller` trait: stable name, declared inputs/outputs, and the
//!   long-running reconcile loop
//! - `ControllerContext`: store access, coalesced change events,
//!   shutdown signal, and restart-backoff reset
//! - `ControllerRegistry`: registration with the one-writer-per-
//!   exclusive-output check, plus the runner that restarts failed
//!   controllers with exponential backoff
//!
//! A controller loop handles exactly one wake source per iteration;
//! the stop signal always takes priority (`biased` select). "Not
//! found" reads are tolerated in-controller; any other store error
//! aborts the iteration and propagates here, where the runner restarts
//! the controller after backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use nodeos_resources::{Selector, Store, StoreError};

use crate::image::ImageStoreError;

// =============================================================================
// Errors
// =============================================================================

/// Errors that abort a controller's current cycle.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Store I/O failure (a `NotFound` reaching here is a controller
    /// bug; weak dependencies are absorbed in-controller).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Image store I/O failure.
    #[error("image store error: {0}")]
    ImageStore(#[from] ImageStoreError),

    /// One or more expected image references failed to parse. Treated
    /// as a data-integrity failure: the whole cleanup cycle halts
    /// rather than widening the garbage collector's blast radius.
    #[error("error parsing expected images: {0}")]
    InvalidExpectedImages(String),

    /// Internal error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Controller registration errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two controllers claimed the same exclusive output kind.
    #[error("exclusive output {kind} already claimed by {existing}, rejected for {requested}")]
    DuplicateExclusiveOutput {
        kind: String,
        existing: String,
        requested: String,
    },
}

// =============================================================================
// Contract
// =============================================================================

/// Dependency strength of a declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The controller is woken on changes but tolerates absence.
    Weak,

    /// Controller start is gated on existence. No controller in this
    /// agent declares strong inputs today.
    Strong,
}

/// A declared input dependency.
#[derive(Debug, Clone)]
pub struct Input {
    pub namespace: String,
    pub kind: String,
    pub id: Option<String>,
    pub input_kind: InputKind,
}

impl Input {
    /// Weak dependency on every resource of a kind.
    pub fn weak(namespace: &str, kind: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            id: None,
            input_kind: InputKind::Weak,
        }
    }

    /// Weak dependency on a single resource.
    pub fn weak_id(namespace: &str, kind: &str, id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::weak(namespace, kind)
        }
    }

    /// Change-notification selector for this input.
    pub fn selector(&self) -> Selector {
        Selector {
            namespace: self.namespace.clone(),
            kind: self.kind.clone(),
            id: self.id.clone(),
        }
    }
}

/// Ownership exclusivity of a declared output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Exactly one controller may create/modify/destroy resources of
    /// this kind.
    Exclusive,

    /// Multiple controllers may write resources of this kind.
    Shared,
}

/// A declared output ownership claim.
#[derive(Debug, Clone)]
pub struct Output {
    pub kind: String,
    pub output_kind: OutputKind,
}

impl Output {
    pub fn exclusive(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            output_kind: OutputKind::Exclusive,
        }
    }

    pub fn shared(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            output_kind: OutputKind::Shared,
        }
    }
}

/// A reconciliation controller.
///
/// Controllers:
/// - Handle one wake source per loop iteration (no internal
///   concurrency)
/// - Own no state shared with other controllers
/// - Communicate only by reading and writing the resource store
#[async_trait]
pub trait Controller: Send + 'static {
    /// Stable controller name for logging and registration.
    fn name(&self) -> &'static str;

    /// Declared input dependencies.
    fn inputs(&self) -> Vec<Input>;

    /// Declared output ownership claims.
    fn outputs(&self) -> Vec<Output>;

    /// The reconcile loop. Returns `Ok` on clean stop; an `Err` return
    /// makes the runner restart the controller after backoff.
    async fn run(&mut self, ctx: &mut ControllerContext) -> Result<(), ControllerError>;
}

// =============================================================================
// Context
// =============================================================================

/// Runtime context handed to a controller's reconcile loop.
pub struct ControllerContext {
    store: Arc<dyn Store>,

    /// Coalesced change notifications for the controller's inputs.
    pub events: mpsc::Receiver<()>,

    /// Shutdown signal receiver.
    pub shutdown: watch::Receiver<bool>,

    backoff_attempts: Arc<AtomicU32>,
}

impl ControllerContext {
    /// Create a context with its own backoff counter (tests and
    /// standalone use).
    pub fn new(
        store: Arc<dyn Store>,
        events: mpsc::Receiver<()>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self::with_backoff(store, events, shutdown, Arc::new(AtomicU32::new(0)))
    }

    pub(crate) fn with_backoff(
        store: Arc<dyn Store>,
        events: mpsc::Receiver<()>,
        shutdown: watch::Receiver<bool>,
        backoff_attempts: Arc<AtomicU32>,
    ) -> Self {
        Self {
            store,
            events,
            shutdown,
            backoff_attempts,
        }
    }

    /// Resource store handle.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Zero the runner's restart-backoff counter. Called after a
    /// successful commit: a controller that has produced forward
    /// progress is not penalized for earlier failures.
    pub fn reset_restart_backoff(&self) {
        self.backoff_attempts.store(0, Ordering::SeqCst);
    }

    /// Block until the next change notification.
    ///
    /// Returns `false` when the controller should stop (shutdown
    /// signaled or the event source closed).
    pub async fn next_event(&mut self) -> bool {
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return false;
                    }
                }

                event = self.events.recv() => {
                    return event.is_some();
                }
            }
        }
    }
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff configuration for controller restarts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first restart.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter;
        let final_delay = (delay + rand_jitter(jitter_range)).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple jitter using a basic LCG (for no external deps).
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = (seed.wrapping_mul(6364136223846793005).wrapping_add(1)) as f64;
    let normalized = (random / u64::MAX as f64) * 2.0 - 1.0; // -1.0 to 1.0
    normalized * range
}

// =============================================================================
// Registry and Runner
// =============================================================================

/// Process-wide controller registration.
///
/// Registration is where exclusive-output ownership is enforced: a
/// second controller claiming an already-claimed exclusive output kind
/// is rejected at startup instead of racing the first at runtime.
pub struct ControllerRegistry {
    store: Arc<dyn Store>,
    controllers: Vec<Box<dyn Controller>>,
    exclusive_outputs: HashMap<String, &'static str>,
    backoff: BackoffPolicy,
}

impl ControllerRegistry {
    /// Create a registry over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            controllers: Vec::new(),
            exclusive_outputs: HashMap::new(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Register a controller, claiming its declared outputs.
    pub fn register(&mut self, controller: Box<dyn Controller>) -> Result<(), RegistryError> {
        for output in controller.outputs() {
            if output.output_kind != OutputKind::Exclusive {
                continue;
            }

            if let Some(existing) = self.exclusive_outputs.get(output.kind.as_str()) {
                return Err(RegistryError::DuplicateExclusiveOutput {
                    kind: output.kind,
                    existing: existing.to_string(),
                    requested: controller.name().to_string(),
                });
            }

            self.exclusive_outputs
                .insert(output.kind.clone(), controller.name());
        }

        info!(controller = controller.name(), "Registered controller");
        self.controllers.push(controller);

        Ok(())
    }

    /// Spawn every registered controller as an independent task.
    pub fn run(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let Self {
            store,
            controllers,
            backoff,
            ..
        } = self;

        controllers
            .into_iter()
            .map(|controller| {
                let store = Arc::clone(&store);
                let shutdown = shutdown.clone();
                let backoff = backoff.clone();
                tokio::spawn(run_controller(controller, store, shutdown, backoff))
            })
            .collect()
    }
}

/// Drive one controller until shutdown, restarting it on failure.
async fn run_controller(
    mut controller: Box<dyn Controller>,
    store: Arc<dyn Store>,
    shutdown: watch::Receiver<bool>,
    backoff: BackoffPolicy,
) {
    let name = controller.name();
    let attempts = Arc::new(AtomicU32::new(0));

    loop {
        if *shutdown.borrow() {
            break;
        }

        // A fresh subscription per (re)start; it begins with one
        // pending wake, so the controller reconciles once before any
        // input changes.
        let selectors = controller.inputs().iter().map(Input::selector).collect();
        let events = store.subscribe(selectors).await;

        let mut ctx = ControllerContext::with_backoff(
            Arc::clone(&store),
            events,
            shutdown.clone(),
            Arc::clone(&attempts),
        );

        match controller.run(&mut ctx).await {
            Ok(()) => {
                info!(controller = name, "Controller exited");
                break;
            }
            Err(err) => {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                let delay = backoff.delay(attempt);

                warn!(
                    controller = name,
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Controller failed, restarting after backoff"
                );

                let mut shutdown = shutdown.clone();
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(controller = name, "Controller runner stopped");
}
