//! [`ControlLoop`] – the single thread that owns the [`Navigator`].
//!
//! Every iteration:
//!
//! 1. **Cancel check** – a cancelled [`CancellationToken`] halts the loop.
//! 2. **Commands** – every queued [`OperatorCommand`] is applied.
//! 3. **Tick** – unless paused (or idle), the navigator advances one drive
//!    segment and the result is published as status.
//!
//! The loop never blocks on the operator: a repair question is published as
//! [`StatusPayload::Prompt`] once, and the loop keeps polling for the
//! `respond` command that answers it.
//!
//! Configuration and unknown-location errors caused by a command are
//! reported back as a message. Any error from the navigator itself halts
//! the loop and is returned.

use std::thread;
use std::time::Duration;

use gridbot_hal::RobotHardware;
use gridbot_kernel::CancellationToken;
use gridbot_middleware::ControlLink;
use gridbot_types::{Mode, NavError, OperatorCommand, StatusPayload};
use tracing::{debug, error, info, warn};

use crate::navigator::{Navigator, TickOutcome};

/// How long to sleep when there is nothing to do.
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(20);

/// Why [`ControlLoop::run`] returned normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The operator sent `quit`.
    Quit,
    /// Every operator handle was dropped.
    OperatorGone,
}

enum Flow {
    Continue,
    Exit(ExitReason),
}

pub struct ControlLoop<H> {
    navigator: Navigator<H>,
    link: ControlLink,
    cancel: CancellationToken,
    idle_poll: Duration,
    paused: bool,
    step_once: bool,
    prompt_sent: bool,
}

impl<H: RobotHardware> ControlLoop<H> {
    pub fn new(navigator: Navigator<H>, link: ControlLink, cancel: CancellationToken) -> Self {
        Self {
            navigator,
            link,
            cancel,
            idle_poll: DEFAULT_IDLE_POLL,
            paused: false,
            step_once: false,
            prompt_sent: false,
        }
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Run until `quit`, cancellation, or a navigator error. Hands the
    /// navigator back on a normal exit.
    ///
    /// # Errors
    ///
    /// [`NavError::Cancelled`] when the token fires; otherwise the error
    /// that stopped the navigator. A [`StatusPayload::Halted`] is published
    /// in every case.
    pub fn run(mut self) -> Result<(Navigator<H>, ExitReason), NavError> {
        info!("control loop started");
        loop {
            if self.cancel.is_cancelled() {
                self.halt("cancelled");
                return Err(NavError::Cancelled);
            }

            match self.drain_commands() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(reason)) => {
                    self.halt(match reason {
                        ExitReason::Quit => "operator quit",
                        ExitReason::OperatorGone => "operator disconnected",
                    });
                    return Ok((self.navigator, reason));
                }
                Err(e) => {
                    self.halt(&e.to_string());
                    return Err(e);
                }
            }

            if self.paused && !self.step_once {
                thread::sleep(self.idle_poll);
                continue;
            }
            self.step_once = false;

            match self.navigator.tick() {
                Ok(outcome) => {
                    if self.report(outcome) {
                        thread::sleep(self.idle_poll);
                    }
                }
                Err(e) => {
                    error!(error = %e, "navigator stopped");
                    self.halt(&e.to_string());
                    return Err(e);
                }
            }
        }
    }

    fn drain_commands(&mut self) -> Result<Flow, NavError> {
        loop {
            let command = match self.link.try_recv() {
                Ok(Some(command)) => command,
                Ok(None) => return Ok(Flow::Continue),
                Err(NavError::Channel(_)) => return Ok(Flow::Exit(ExitReason::OperatorGone)),
                Err(e) => return Err(e),
            };
            debug!(?command, "operator command");
            match self.apply(command) {
                Ok(Flow::Continue) => {}
                Ok(exit) => return Ok(exit),
                Err(e @ (NavError::Configuration(_) | NavError::UnknownLocation(_))) => {
                    warn!(error = %e, "command rejected");
                    self.link.say(format!("rejected: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply(&mut self, command: OperatorCommand) -> Result<Flow, NavError> {
        match command {
            OperatorCommand::Explore => self.switch(Mode::Explore),
            OperatorCommand::Goal(location) => self.switch(Mode::Goal(location)),
            OperatorCommand::Manual => self.switch(Mode::Manual),
            OperatorCommand::Turn(direction) => {
                let outcome = self.navigator.manual_turn(direction)?;
                self.report(outcome);
            }
            OperatorCommand::Drive => self.navigator.request_drive()?,
            OperatorCommand::Pause => {
                self.paused = true;
                self.link.say("paused");
            }
            OperatorCommand::Resume => {
                self.paused = false;
                self.link.say("resumed");
            }
            OperatorCommand::Step => self.step_once = true,
            OperatorCommand::Show => {
                self.link
                    .publish(StatusPayload::Snapshot(self.navigator.snapshot()));
            }
            OperatorCommand::Save(name) => {
                let Some(graph) = self.navigator.graph() else {
                    return Err(NavError::Configuration(
                        "nothing has been mapped yet".to_string(),
                    ));
                };
                let payload = StatusPayload::MapBlob {
                    intersections: graph.len(),
                    edges: graph.edge_count(),
                    blob: graph.to_blob()?,
                    name,
                };
                self.link.publish(payload);
            }
            OperatorCommand::ClearBlockages => {
                self.navigator.clear_all_blockages();
                self.link.say("blockages cleared");
            }
            OperatorCommand::Respond(answer) => {
                self.prompt_sent = false;
                self.navigator.resume(&answer)?;
                self.link.say("answer accepted");
            }
            OperatorCommand::Quit => return Ok(Flow::Exit(ExitReason::Quit)),
        }
        Ok(Flow::Continue)
    }

    fn switch(&mut self, mode: Mode) {
        self.navigator.set_mode(mode);
        self.prompt_sent = false;
        self.link.say(format!("mode: {mode}"));
    }

    /// Publish what a tick achieved. Returns `true` when the loop has
    /// nothing to do until the operator acts.
    fn report(&mut self, outcome: TickOutcome) -> bool {
        match outcome {
            TickOutcome::Continue => {
                self.link.publish(StatusPayload::Pose(self.navigator.pose()));
                false
            }
            TickOutcome::Idle => true,
            TickOutcome::NeedsOperatorInput(prompt) => {
                if !self.prompt_sent {
                    self.link.publish(StatusPayload::Prompt(prompt));
                    self.prompt_sent = true;
                }
                true
            }
            TickOutcome::ExplorationComplete => {
                let (intersections, edges) = self
                    .navigator
                    .graph()
                    .map(|g| (g.len(), g.edge_count()))
                    .unwrap_or_default();
                self.link.say(format!(
                    "exploration complete: {intersections} intersections, {edges} roads"
                ));
                self.link
                    .publish(StatusPayload::Snapshot(self.navigator.snapshot()));
                false
            }
            TickOutcome::ExplorationHalted => {
                self.link
                    .say("exploration halted: unexplored roads are out of reach");
                false
            }
            TickOutcome::GoalReached(location) => {
                self.link.say(format!("goal {location} reached"));
                false
            }
            TickOutcome::GoalUnreachable(location) => {
                self.link.say(format!("goal {location} is unreachable"));
                false
            }
        }
    }

    fn halt(&mut self, reason: &str) {
        if let Err(e) = self.navigator.hardware_mut().stop() {
            warn!(error = %e, "stop failed while halting");
        }
        info!(reason, "control loop halted");
        self.link.publish(StatusPayload::Halted {
            reason: reason.to_string(),
        });
    }
}
