//! Operational transformation for concurrent element edits.
//!
//! `transform(a, b)` takes two operations generated against the same prior
//! document state and returns a version of `a` that is safe to apply after
//! `b` has already been applied.
//!
//! ```text
//! same target?  ── no ──► PassThrough(a)
//!      │ yes
//! same kind?    ── yes ─► insert/insert  → midpoint of both positions
//!      │                  delete/delete  → Conflict(a), manual resolution
//!      │                  anything else  → field merge, b wins collisions
//!      │ no
//! priority(a) <= priority(b) ──► Retained(a)
//!      │ otherwise
//!      └──────────────────────► field merge under a's kind
//! ```
//!
//! Priority order (most destructive first):
//! delete > update > insert > move > resize > rotate > everything else.
//!
//! The transform is asymmetric: `transform(a, b)` and `transform(b, a)`
//! generally differ. It adjusts an operation against the single operation
//! logged immediately before it, so three or more replicas diverging at once
//! are not guaranteed to converge.

use serde::{Deserialize, Serialize};

use crate::operation::{Operation, OperationKind, OperationParams};

/// How a same-target pair was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Both positions blended at their midpoint.
    Interpolated,
    /// Parameter fields merged, the already-applied operation winning collisions.
    Merged,
    /// `a` dominates by priority and is applied unchanged.
    PriorityRetained,
    /// No automatic merge exists; left for a human.
    Manual,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Interpolated => "interpolated",
            Resolution::Merged => "merged",
            Resolution::PriorityRetained => "priority_retained",
            Resolution::Manual => "manual",
        }
    }
}

/// Result of transforming `a` against `b`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// Different targets: nothing to reconcile.
    PassThrough(Operation),
    /// Same target, `a` kept as is because it outranks `b`.
    Retained(Operation),
    /// A new operation derived from `a`.
    Transformed {
        operation: Operation,
        resolution: Resolution,
    },
    /// Same target, no automatic merge. `a` is applied unchanged.
    Conflict(Operation),
}

impl TransformOutcome {
    pub fn operation(&self) -> &Operation {
        match self {
            TransformOutcome::PassThrough(op)
            | TransformOutcome::Retained(op)
            | TransformOutcome::Conflict(op) => op,
            TransformOutcome::Transformed { operation, .. } => operation,
        }
    }

    pub fn into_operation(self) -> Operation {
        match self {
            TransformOutcome::PassThrough(op)
            | TransformOutcome::Retained(op)
            | TransformOutcome::Conflict(op) => op,
            TransformOutcome::Transformed { operation, .. } => operation,
        }
    }

    /// `None` when the two operations never touched the same element.
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            TransformOutcome::PassThrough(_) => None,
            TransformOutcome::Retained(_) => Some(Resolution::PriorityRetained),
            TransformOutcome::Transformed { resolution, .. } => Some(*resolution),
            TransformOutcome::Conflict(_) => Some(Resolution::Manual),
        }
    }

    /// True only when a new operation was actually produced.
    pub fn is_transformed(&self) -> bool {
        matches!(self, TransformOutcome::Transformed { .. })
    }
}

/// Rank of a kind in the cross-kind priority order. Lower wins.
pub fn priority(kind: OperationKind) -> u8 {
    match kind {
        OperationKind::Delete => 0,
        OperationKind::Update => 1,
        OperationKind::Insert => 2,
        OperationKind::Move => 3,
        OperationKind::Resize => 4,
        OperationKind::Rotate => 5,
        OperationKind::ConstraintAdd
        | OperationKind::ConstraintRemove
        | OperationKind::PrecisionChange => 6,
    }
}

/// Transform `a` so it can be applied after `b`.
pub fn transform(a: &Operation, b: &Operation) -> TransformOutcome {
    if a.target_element != b.target_element {
        return TransformOutcome::PassThrough(a.clone());
    }

    if a.kind() == b.kind() {
        return match (&a.params, &b.params) {
            (
                OperationParams::Insert { position: pa },
                OperationParams::Insert { position: pb },
            ) => TransformOutcome::Transformed {
                operation: a.derive(OperationParams::Insert { position: pa.midpoint(pb) }),
                resolution: Resolution::Interpolated,
            },
            (OperationParams::Delete, OperationParams::Delete) => {
                log::debug!(
                    "Concurrent deletes of {} ({} vs {}), needs manual resolution",
                    a.target_element,
                    a.id,
                    b.id
                );
                TransformOutcome::Conflict(a.clone())
            }
            _ => merge(a, b),
        };
    }

    if priority(a.kind()) <= priority(b.kind()) {
        return TransformOutcome::Retained(a.clone());
    }

    merge(a, b)
}

/// Overlay `b`'s fields on `a`'s and rebuild under `a`'s kind.
fn merge(a: &Operation, b: &Operation) -> TransformOutcome {
    let mut fields = a.params.to_fields();
    fields.extend(b.params.to_fields());

    match OperationParams::from_fields(a.kind(), fields) {
        Ok(params) => TransformOutcome::Transformed {
            operation: a.derive(params),
            resolution: Resolution::Merged,
        },
        Err(e) => {
            log::debug!("Merge of {} onto {} rejected ({e}), keeping original", b.id, a.id);
            TransformOutcome::Retained(a.clone())
        }
    }
}
