//! `gridbot-kernel` – Consistency & Safety
//!
//! Does not plan or drive; it checks what the sensors report against what
//! the map already believes, and owns the stop signal every long-running
//! loop polls.
//!
//! # Modules
//!
//! - [`consistency`] – [`verify_approach`][consistency::verify_approach] and
//!   [`verify_turn_angle`][consistency::verify_turn_angle]: reconcile line
//!   sensor readings and measured turn angles with the map, either correcting
//!   them, failing hard, or producing a
//!   [`Discrepancy`][consistency::Discrepancy] for the operator to resolve.
//! - [`cancel`] – [`CancellationToken`][cancel::CancellationToken]: the one
//!   piece of state shared across threads, polled between drive segments.

pub mod cancel;
pub mod consistency;

pub use cancel::CancellationToken;
pub use consistency::{
    ApproachVerdict, Discrepancy, PoseFix, RepairPolicy, TurnCheck, apply_operator_fix,
    verify_approach, verify_turn_angle,
};
