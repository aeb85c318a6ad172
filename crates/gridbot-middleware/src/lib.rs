//! `gridbot-middleware` – The Nervous System
//!
//! Carries operator commands into the control thread and status out of it,
//! without either side sharing mutable state with the other.
//!
//! # Modules
//!
//! - [`bus`] – [`control_link`][bus::control_link]: a bounded
//!   [`tokio::sync::mpsc`] command lane paired with a
//!   [`tokio::sync::broadcast`] status lane.

pub mod bus;

pub use bus::{ControlLink, OperatorLink, StatusReceiver, control_link};
