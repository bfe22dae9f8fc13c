//! Container image garbage collection.
//!
//! Tracks which images are expected (referenced by the current
//! consensus-store and node-agent specs) and, on a timer, deletes
//! unreferenced images from the runtime's image store once they are
//! old enough.
//!
//! The grace period is 4x the check interval: an unreferenced image is
//! observed as such across at least three full check cycles before it
//! is removed, which absorbs reference churn during rollouts without a
//! stateful "seen N times" counter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use nodeos_resources::{id, kind, namespace, Store};

use crate::controller::{Controller, ControllerContext, ControllerError, Input, Output};
use crate::image::{ImageRecord, ImageReference, ImageStore, ImageStoreProvider};

/// Interval between cleanup passes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Minimum age of an image before it can be deleted.
pub fn grace_period(check_interval: Duration) -> Duration {
    check_interval * 4
}

/// Image GC configuration.
#[derive(Debug, Clone)]
pub struct ImageGcConfig {
    /// Interval between cleanup passes. The grace period is derived
    /// from it.
    pub check_interval: Duration,
}

impl Default for ImageGcConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// State retained across loop iterations.
struct GcState {
    /// Whether the container runtime service is reported healthy.
    cri_is_up: bool,

    /// Image references currently required by control-plane specs.
    expected_images: Vec<String>,

    /// Lazily constructed image store handle.
    image_store: Option<Box<dyn ImageStore>>,
}

/// Wake sources of the GC loop.
enum Wake {
    Stop,
    Tick,
    Inputs,
}

/// Garbage-collects unreferenced container images.
pub struct ImageGcController {
    provider: ImageStoreProvider,
    config: ImageGcConfig,
}

impl ImageGcController {
    pub fn new(provider: ImageStoreProvider, config: ImageGcConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl Controller for ImageGcController {
    fn name(&self) -> &'static str {
        "runtime.ImageGcController"
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::weak_id(namespace::RUNTIME, kind::SERVICE_STATUS, id::CRI_SERVICE),
            Input::weak_id(
                namespace::CONTROL_PLANE,
                kind::CONSENSUS_SPEC,
                id::CONSENSUS,
            ),
            Input::weak_id(namespace::CONTROL_PLANE, kind::AGENT_SPEC, id::AGENT),
        ]
    }

    fn outputs(&self) -> Vec<Output> {
        vec![]
    }

    async fn run(&mut self, ctx: &mut ControllerContext) -> Result<(), ControllerError> {
        let mut state = GcState {
            cri_is_up: false,
            expected_images: Vec::new(),
            image_store: None,
        };

        let result = self.run_loop(ctx, &mut state).await;

        // The handle is closed exactly once, whichever branch ended
        // the loop.
        if let Some(image_store) = state.image_store.take() {
            image_store.close().await;
        }

        result
    }
}

impl ImageGcController {
    async fn run_loop(
        &mut self,
        ctx: &mut ControllerContext,
        state: &mut GcState,
    ) -> Result<(), ControllerError> {
        let mut ticker = tokio::time::interval(self.config.check_interval);

        loop {
            match next_wake(ctx, &mut ticker).await {
                Wake::Stop => return Ok(()),

                Wake::Tick => {
                    // Never delete anything without positive
                    // confirmation of current expectations.
                    if !state.cri_is_up || state.expected_images.is_empty() {
                        continue;
                    }

                    if state.image_store.is_none() {
                        state.image_store = Some((self.provider)()?);
                    }

                    if let Some(image_store) = &state.image_store {
                        self.cleanup(image_store.as_ref(), &state.expected_images)
                            .await?;
                    }
                }

                Wake::Inputs => {
                    observe_inputs(ctx.store(), state).await?;
                }
            }

            ctx.reset_restart_backoff();
        }
    }

    async fn cleanup(
        &self,
        image_store: &dyn ImageStore,
        expected_images: &[String],
    ) -> Result<(), ControllerError> {
        info!("running image cleanup");

        let actual = image_store.list().await?;

        // An unparseable expectation halts the whole pass: deleting
        // something still needed because of a parse mismatch is worse
        // than pausing collection.
        let mut parse_failures = Vec::new();

        let expected: Vec<ImageReference> = expected_images
            .iter()
            .filter_map(|raw| match raw.parse::<ImageReference>() {
                Ok(reference) => Some(reference),
                Err(err) => {
                    parse_failures.push(err.to_string());
                    None
                }
            })
            .collect();

        if !parse_failures.is_empty() {
            return Err(ControllerError::InvalidExpectedImages(
                parse_failures.join("; "),
            ));
        }

        let doomed = plan_cleanup(
            &actual,
            &expected,
            Utc::now(),
            grace_period(self.config.check_interval),
        );

        for name in doomed {
            image_store.delete(&name).await?;
            info!(image = %name, "deleted an image");
        }

        Ok(())
    }
}

/// Wait for the next wake source; stop always wins.
async fn next_wake(ctx: &mut ControllerContext, ticker: &mut tokio::time::Interval) -> Wake {
    loop {
        tokio::select! {
            biased;

            changed = ctx.shutdown.changed() => {
                if changed.is_err() || *ctx.shutdown.borrow() {
                    return Wake::Stop;
                }
            }

            _ = ticker.tick() => return Wake::Tick,

            event = ctx.events.recv() => {
                return match event {
                    Some(()) => Wake::Inputs,
                    None => Wake::Stop,
                };
            }
        }
    }
}

/// Re-derive runtime health and the expected-image set from the graph.
///
/// The expected set is rebuilt from scratch: a spec's disappearance
/// drops its image from protection on this very cycle.
async fn observe_inputs(store: &dyn Store, state: &mut GcState) -> Result<(), ControllerError> {
    let service = match store
        .get(namespace::RUNTIME, kind::SERVICE_STATUS, id::CRI_SERVICE)
        .await
    {
        Ok(resource) => resource.payload.as_service_status().cloned(),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err.into()),
    };

    state.cri_is_up = service
        .map(|status| status.running && status.healthy)
        .unwrap_or(false);

    state.expected_images.clear();

    match store
        .get(
            namespace::CONTROL_PLANE,
            kind::CONSENSUS_SPEC,
            id::CONSENSUS,
        )
        .await
    {
        Ok(resource) => {
            if let Some(spec) = resource.payload.as_consensus_spec() {
                state.expected_images.push(spec.image.clone());
            }
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    match store
        .get(namespace::CONTROL_PLANE, kind::AGENT_SPEC, id::AGENT)
        .await
    {
        Ok(resource) => {
            if let Some(spec) = resource.payload.as_agent_spec() {
                state.expected_images.push(spec.image.clone());
            }
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

/// Decide which images to delete.
///
/// An image survives if any expected reference protects it (repository
/// plus tag or digest match), or if it is younger than the grace
/// period. A malformed stored image name is logged and skipped; it is
/// not actionable here.
fn plan_cleanup(
    actual: &[ImageRecord],
    expected: &[ImageReference],
    now: DateTime<Utc>,
    grace: Duration,
) -> Vec<String> {
    let mut doomed = Vec::new();

    for image in actual {
        let reference: ImageReference = match image.name.parse() {
            Ok(reference) => reference,
            Err(err) => {
                info!(image = %image.name, error = %err, "failed to parse image name");
                continue;
            }
        };

        if expected.iter().any(|e| e.protects(&reference)) {
            debug!(image = %image.name, "image is referenced, skipping garbage collection");
            continue;
        }

        let age = now
            .signed_duration_since(image.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if age < grace {
            debug!(
                image = %image.name,
                age_secs = age.as_secs(),
                "skipping image cleanup, as it's below minimum age"
            );
            continue;
        }

        doomed.push(image.name.clone());
    }

    doomed
}
