//! `gridbot-runtime` – The Navigation Engine
//!
//! Where driving decisions are made: the navigator turns map knowledge into
//! turns and line follows, and the control loop runs it on a dedicated
//! thread behind the operator channels.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: the drive/decide
//!   state machine for explore, goal and manual modes, including
//!   operator-assisted repair as a suspend point.
//! - [`control`] – [`ControlLoop`][control::ControlLoop]: drains
//!   [`OperatorCommand`][gridbot_types::OperatorCommand]s, ticks the
//!   navigator, publishes status, honours the
//!   [`CancellationToken`][gridbot_kernel::CancellationToken].
//! - [`blockage`] – [`BlockageDetector`][blockage::BlockageDetector]:
//!   majority-vote filtering of range readings into road blockages.
//! - [`loop_guard`] – [`LoopGuard`][loop_guard::LoopGuard]: notices when
//!   exploration keeps wandering without finding anything new.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export.

pub mod blockage;
pub mod control;
pub mod loop_guard;
pub mod navigator;
pub mod telemetry;

pub use blockage::{BlockageConfig, BlockageDetector, RangeSensor};
pub use control::{ControlLoop, ExitReason};
pub use loop_guard::LoopGuard;
pub use navigator::{Navigator, NavigatorConfig, TickOutcome};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
