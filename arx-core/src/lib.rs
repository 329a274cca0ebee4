//! # arx-core: Operation model and operational transformation
//!
//! Pure, runtime-free building blocks for collaborative CAD/BIM editing:
//!
//! - [`operation`]: typed edit intents (`Operation`, `OperationParams`)
//! - [`ot`]: reconciles two concurrent operations on the same element
//!
//! Everything here is synchronous and deterministic. Sessions, locking and
//! fan-out live in `arx-collab`.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod operation;
pub mod ot;

pub use operation::{
    Operation, OperationError, OperationKind, OperationParams, ParamValue, PrecisionLevel,
};
pub use ot::{transform, Resolution, TransformOutcome};

/// 2D position in document (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation toward `target` by factor `t` ∈ [0, 1].
    pub fn lerp(&self, target: &Point, t: f64) -> Point {
        Point {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        self.lerp(other, 0.5)
    }
}

/// Element extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
