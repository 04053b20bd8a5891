//! Training status and the events pushed to the report sink.

use crate::core::Raster;
use image::RgbImage;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the training controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    Idle,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrainStatus::Idle => "idle",
            TrainStatus::Running => "running",
            TrainStatus::Stopped => "stopped",
            TrainStatus::Completed => "completed",
            TrainStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A point-in-time render of the field.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Number of optimizer steps taken in the current run when this was taken.
    pub step: u32,
    /// Normalized prediction in `[0, 1]`.
    pub predicted: Raster,
    /// Prediction with a dot at every mean.
    pub overlay: RgbImage,
    pub means: Vec<Vector2<f32>>,
}

/// Notifications sent by a running training loop.
#[derive(Clone, Debug)]
pub enum TrainEvent {
    Progress {
        step: u32,
        total_steps: u32,
        loss: f32,
        snapshot: Box<Snapshot>,
    },
    /// Informational text (stop acknowledgements, diagnostics).
    Log(String),
    Stopped {
        step: u32,
        total_steps: u32,
    },
    Completed {
        step: u32,
        total_steps: u32,
        loss: Option<f32>,
    },
    Failed {
        step: u32,
        error: String,
    },
}

impl TrainEvent {
    /// True for the event that ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrainEvent::Stopped { .. } | TrainEvent::Completed { .. } | TrainEvent::Failed { .. }
        )
    }
}

/// Join value of a training task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainOutcome {
    pub status: TrainStatus,
    /// Steps completed in this run.
    pub step: u32,
    pub last_loss: Option<f32>,
}
