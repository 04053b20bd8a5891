//! The training loop.
//!
//! One iteration:
//! 1. Check the stop flag
//! 2. Render, evaluate the loss, backpropagate, apply Adam (under the scene write lock)
//! 3. Report a snapshot when due, then yield to the runtime
//!
//! Step 2 runs on tokio's blocking pool. The scene lock is only held there,
//! never across an `.await`. Reporting never blocks the loop.

use crate::core::{CoordinateGrid, GaussianField, TargetImage};
use crate::diff::{rasterize_backward, FieldGrads};
use crate::error::{FitError, Result};
use crate::optim::{FieldOptimizer, LossMetric};
use crate::render::{overlay_points, rasterize, RenderOutput};
use crate::session::events::{Snapshot, TrainEvent, TrainOutcome, TrainStatus};
use crate::session::params::TrainParams;
use crate::session::Shared;
use log::{debug, error, info, warn};
use nalgebra::Vector2;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Radius of the dots marking Gaussian means in snapshot overlays.
pub const OVERLAY_POINT_RADIUS: i32 = 1;

/// Everything a session renders and fits.
#[derive(Clone, Debug)]
pub(crate) struct Scene {
    pub target: TargetImage,
    pub grid: CoordinateGrid,
    pub field: GaussianField,
}

impl Scene {
    pub fn new(target: TargetImage, field: GaussianField) -> Self {
        let grid = CoordinateGrid::new(target.width(), target.height());
        Self {
            target,
            grid,
            field,
        }
    }

    pub fn render(&self) -> RenderOutput {
        rasterize(&self.field, &self.grid)
    }

    pub fn snapshot(&self, step: u32) -> Snapshot {
        build_snapshot(step, self.render(), self.field.means())
    }
}

pub(crate) fn build_snapshot(step: u32, render: RenderOutput, means: &[Vector2<f32>]) -> Snapshot {
    let overlay = overlay_points(&render.image, means, OVERLAY_POINT_RADIUS);
    Snapshot {
        step,
        predicted: render.image,
        overlay,
        means: means.to_vec(),
    }
}

/// Result of one optimizer step.
pub(crate) struct StepOutput {
    /// Loss of the render the gradient was taken from.
    pub loss: f32,
    /// That render (pre-update parameters).
    pub render: RenderOutput,
}

/// Render, evaluate, backpropagate and update `scene.field` once.
///
/// Non-finite loss or gradients abort before the update; the field is left as is.
pub(crate) fn train_step(
    scene: &mut Scene,
    metric: &LossMetric,
    opt: &mut FieldOptimizer,
) -> Result<StepOutput> {
    let render = scene.render();
    let (loss, d_image) = metric.loss_and_grad(&render.image, scene.target.raster());
    if !loss.is_finite() {
        return Err(FitError::NumericInstability(format!(
            "{metric} loss evaluated to {loss}"
        )));
    }

    let grads = rasterize_backward(&scene.field, &scene.grid, &render, &d_image);
    apply_checked(&mut scene.field, &grads, opt)?;
    Ok(StepOutput { loss, render })
}

/// Adam update, refused when any gradient is non-finite.
fn apply_checked(
    field: &mut GaussianField,
    grads: &FieldGrads,
    opt: &mut FieldOptimizer,
) -> Result<()> {
    if !grads.is_finite() {
        return Err(FitError::NumericInstability(
            "non-finite gradient for gaussian parameters".to_string(),
        ));
    }
    opt.step(field, grads);
    Ok(())
}

/// Best-effort delivery to the report sink.
///
/// Progress events never wait: when the sink is full they are dropped.
/// Closing events that do not fit are handed to a detached task, so they
/// still arrive once the reader catches up.
struct Reporter {
    tx: Sender<TrainEvent>,
    closed: bool,
    dropped: u64,
}

impl Reporter {
    fn new(tx: Sender<TrainEvent>) -> Self {
        Self {
            tx,
            closed: false,
            dropped: 0,
        }
    }

    fn push(&mut self, event: TrainEvent) {
        if self.closed {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                if self.dropped > 0 {
                    debug!("report sink drained after {} dropped events", self.dropped);
                    self.dropped = 0;
                }
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped == 0 {
                    warn!("report sink full; dropping progress events until it drains");
                }
                self.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => self.close(),
        }
    }

    /// Deliver the closing events in order, never waiting on the sink.
    fn finish(mut self, events: Vec<TrainEvent>) {
        let mut pending = events.into_iter();
        while let Some(event) = pending.next() {
            if self.closed {
                return;
            }
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    debug!("report sink full; delivering the final events in the background");
                    let tx = self.tx;
                    tokio::spawn(async move {
                        for event in std::iter::once(event).chain(pending) {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    });
                    return;
                }
                Err(TrySendError::Closed(_)) => self.close(),
            }
        }
    }

    fn close(&mut self) {
        warn!("report sink closed; training continues without progress events");
        self.closed = true;
    }
}

/// Holds the run's claim on the session status.
///
/// If the task unwinds or is aborted before an outcome is recorded, dropping
/// the guard marks the session `Failed` so it does not stay `Running`.
struct RunGuard {
    shared: Arc<Shared>,
    settled: bool,
}

impl RunGuard {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            settled: false,
        }
    }

    fn finish(
        &mut self,
        status: TrainStatus,
        step: u32,
        last_loss: Option<f32>,
    ) -> TrainOutcome {
        self.settled = true;
        self.shared.finish(status, step, last_loss)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.settled {
            let step = self.shared.step.load(Ordering::Acquire);
            error!("training task ended at step {step} without an outcome");
            self.shared.finish(TrainStatus::Failed, step, None);
        }
    }
}

/// One locked step, plus the snapshot when `params` says it is due.
fn locked_step(
    shared: &Shared,
    params: &TrainParams,
    opt: &mut FieldOptimizer,
    step: u32,
) -> Result<(f32, Option<Snapshot>)> {
    let mut guard = shared.write_scene();
    let scene = guard.as_mut().ok_or(FitError::NoImageLoaded)?;

    let out = train_step(scene, &params.metric, opt)?;
    let done = step + 1;
    let snapshot = if params.reports_at(done) {
        // The forward render of this step is reused; means are post-update.
        Some(build_snapshot(done, out.render, scene.field.means()))
    } else {
        None
    };
    Ok((out.loss, snapshot))
}

/// Run `locked_step` on the blocking pool; the optimizer travels with it.
async fn blocking_step(
    shared: &Arc<Shared>,
    params: &Arc<TrainParams>,
    mut opt: FieldOptimizer,
    step: u32,
) -> Result<(FieldOptimizer, f32, Option<Snapshot>)> {
    let shared = Arc::clone(shared);
    let params = Arc::clone(params);
    tokio::task::spawn_blocking(move || -> Result<(FieldOptimizer, f32, Option<Snapshot>)> {
        let (loss, snapshot) = locked_step(&shared, &params, &mut opt, step)?;
        Ok((opt, loss, snapshot))
    })
    .await
    .map_err(|e| FitError::Worker(e.to_string()))?
}

/// Drive a full run. Status must already be `Running`.
pub(crate) async fn run_training(
    shared: Arc<Shared>,
    params: TrainParams,
    tx: Sender<TrainEvent>,
) -> TrainOutcome {
    let mut run = RunGuard::new(Arc::clone(&shared));
    let mut reporter = Reporter::new(tx);
    let params = Arc::new(params);
    let mut opt = FieldOptimizer::new(&params.adam());
    let total_steps = params.steps;
    let mut step = 0u32;
    let mut last_loss = None;

    info!(
        "training started: {total_steps} steps, lr={}, metric={}",
        params.lr, params.metric
    );

    while step < total_steps {
        if shared.stop_requested.load(Ordering::Acquire) {
            info!("training stopped at step {step}/{total_steps}");
            let outcome = run.finish(TrainStatus::Stopped, step, last_loss);
            reporter.finish(vec![
                TrainEvent::Log(format!(
                    "training stopped by request at step {step}/{total_steps}"
                )),
                TrainEvent::Stopped { step, total_steps },
            ]);
            return outcome;
        }

        let (loss, snapshot) = match blocking_step(&shared, &params, opt, step).await {
            Ok((returned, loss, snapshot)) => {
                opt = returned;
                (loss, snapshot)
            }
            Err(e) => {
                error!("training failed at step {step}: {e}");
                let outcome = run.finish(TrainStatus::Failed, step, last_loss);
                reporter.finish(vec![TrainEvent::Failed {
                    step,
                    error: e.to_string(),
                }]);
                return outcome;
            }
        };

        step += 1;
        shared.step.store(step, Ordering::Release);
        last_loss = Some(loss);

        if let Some(snapshot) = snapshot {
            debug!("step {step}/{total_steps} loss={loss:.6}");
            reporter.push(TrainEvent::Progress {
                step,
                total_steps,
                loss,
                snapshot: Box::new(snapshot),
            });
        }

        tokio::task::yield_now().await;
    }

    info!("training completed after {step} steps, loss={last_loss:?}");
    let outcome = run.finish(TrainStatus::Completed, step, last_loss);
    reporter.finish(vec![TrainEvent::Completed {
        step,
        total_steps,
        loss: last_loss,
    }]);
    outcome
}
