//! Training session: one target image, one Gaussian field, one training loop.
//!
//! `Session` is a cheap clonable handle. Clones share the same state, so one
//! clone can run the loop while another requests a stop or takes snapshots.
//!
//! State machine: `Idle → Running → (Stopped | Completed | Failed)`.
//! A `Failed` session only accepts a new run after `reinitialize`.

mod events;
mod params;
mod train;

pub use events::{Snapshot, TrainEvent, TrainOutcome, TrainStatus};
pub use params::{SessionConfig, TrainParams};
pub use train::OVERLAY_POINT_RADIUS;

use crate::core::{random_field, GaussianField, GaussianRecord, TargetImage};
use crate::error::{FitError, Result};
use crate::optim::LossMetric;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use train::{run_training, Scene};

/// Compute backend description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub is_accelerated: bool,
    pub name: String,
}

pub(crate) struct Shared {
    config: SessionConfig,
    scene: RwLock<Option<Scene>>,
    status: Mutex<TrainStatus>,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) step: AtomicU32,
}

impl Shared {
    fn read_scene(&self) -> RwLockReadGuard<'_, Option<Scene>> {
        self.scene.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_scene(&self) -> RwLockWriteGuard<'_, Option<Scene>> {
        self.scene.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_status(&self) -> MutexGuard<'_, TrainStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the end of a run.
    pub(crate) fn finish(&self, status: TrainStatus, step: u32, last_loss: Option<f32>) -> TrainOutcome {
        *self.lock_status() = status;
        TrainOutcome {
            status,
            step,
            last_loss,
        }
    }
}

/// Handle to one fitting session. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_valid_config(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                scene: RwLock::new(None),
                status: Mutex::new(TrainStatus::Idle),
                stop_requested: AtomicBool::new(false),
                step: AtomicU32::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// A report sink sized by `SessionConfig::event_buffer`.
    pub fn event_channel(&self) -> (mpsc::Sender<TrainEvent>, mpsc::Receiver<TrainEvent>) {
        mpsc::channel(self.shared.config.event_buffer)
    }

    pub fn status(&self) -> TrainStatus {
        *self.shared.lock_status()
    }

    /// Steps completed by the current (or last) run.
    pub fn current_step(&self) -> u32 {
        self.shared.step.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.read_scene().is_some()
    }

    /// Install `target`, build its coordinate grid and draw `count` Gaussians.
    ///
    /// Returns the initial render.
    pub fn initialize(&self, target: TargetImage, count: usize) -> Result<Snapshot> {
        let status = self.idle_status()?;
        let field = self.draw_field(target.width(), target.height(), count)?;
        let scene = Scene::new(target, field);
        let snapshot = scene.snapshot(0);

        *self.shared.write_scene() = Some(scene);
        self.reset_run_state(status);
        info!(
            "session initialized: {}x{} target, {count} gaussians",
            snapshot.predicted.width(),
            snapshot.predicted.height()
        );
        Ok(snapshot)
    }

    /// Replace the field with a fresh draw, keeping the target image.
    pub fn reinitialize(&self, count: usize) -> Result<Snapshot> {
        let status = self.idle_status()?;
        let mut guard = self.shared.write_scene();
        let scene = guard.as_mut().ok_or(FitError::NoImageLoaded)?;

        scene.field = self.draw_field(scene.target.width(), scene.target.height(), count)?;
        let snapshot = scene.snapshot(0);
        drop(guard);

        self.reset_run_state(status);
        info!("session reinitialized with {count} gaussians");
        Ok(snapshot)
    }

    /// Overwrite the Gaussians named by each record's index.
    ///
    /// Cross terms are clamped into the positive-definite band. Nothing is
    /// written if any record is invalid.
    pub fn load_explicit_parameters(&self, records: &[GaussianRecord]) -> Result<()> {
        let _status = self.idle_status()?;
        let mut guard = self.shared.write_scene();
        let scene = guard.as_mut().ok_or(FitError::NoImageLoaded)?;
        scene.field.apply_records(records)?;
        info!("loaded {} explicit gaussian records", records.len());
        Ok(())
    }

    /// Begin a training run on the tokio runtime the caller is on.
    ///
    /// Events go to `sink`; the returned handle resolves once the run ends.
    pub fn start(
        &self,
        params: TrainParams,
        sink: mpsc::Sender<TrainEvent>,
    ) -> Result<JoinHandle<TrainOutcome>> {
        params.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| FitError::config("training must be started inside a tokio runtime"))?;

        let mut status = self.shared.lock_status();
        match *status {
            TrainStatus::Running => return Err(FitError::Busy),
            TrainStatus::Failed => {
                return Err(FitError::config(
                    "the previous run failed; reinitialize the session first",
                ))
            }
            _ => {}
        }
        if !self.is_initialized() {
            return Err(FitError::NoImageLoaded);
        }

        *status = TrainStatus::Running;
        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.step.store(0, Ordering::Release);
        drop(status);

        Ok(runtime.spawn(run_training(Arc::clone(&self.shared), params, sink)))
    }

    /// Ask a running loop to stop at its next iteration boundary. Idempotent.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    /// Render the current field without touching training state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let guard = self.shared.read_scene();
        let scene = guard.as_ref().ok_or(FitError::NoImageLoaded)?;
        Ok(scene.snapshot(self.current_step()))
    }

    /// Loss of the current field against the target.
    pub fn loss(&self, metric: &LossMetric) -> Result<f32> {
        let guard = self.shared.read_scene();
        let scene = guard.as_ref().ok_or(FitError::NoImageLoaded)?;
        let render = scene.render();
        Ok(metric.loss(&render.image, scene.target.raster()))
    }

    /// Copy of the current parameters.
    pub fn field(&self) -> Result<GaussianField> {
        let guard = self.shared.read_scene();
        guard
            .as_ref()
            .map(|scene| scene.field.clone())
            .ok_or(FitError::NoImageLoaded)
    }

    pub fn records(&self) -> Result<Vec<GaussianRecord>> {
        Ok(self.field()?.records())
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            is_accelerated: false,
            name: format!("cpu (rayon, {} threads)", rayon::current_num_threads()),
        }
    }

    fn draw_field(&self, width: u32, height: u32, count: usize) -> Result<GaussianField> {
        let config = &self.shared.config;
        random_field(width, height, count, &config.field_init(), config.covariance)
    }

    /// Lock the status, failing with `Busy` while a run is active.
    fn idle_status(&self) -> Result<MutexGuard<'_, TrainStatus>> {
        let status = self.shared.lock_status();
        if *status == TrainStatus::Running {
            return Err(FitError::Busy);
        }
        Ok(status)
    }

    fn reset_run_state(&self, mut status: MutexGuard<'_, TrainStatus>) {
        *status = TrainStatus::Idle;
        self.shared.step.store(0, Ordering::Release);
    }
}
