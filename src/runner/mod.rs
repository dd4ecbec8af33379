//! Execution runner
//!
//! Drives exactly one agent execution per [`RunConfiguration`] to a terminal
//! [`RunResult`]:
//!
//! ```text
//!   Idle ──► Running ──┬──► Completed   (agent answered before the deadline)
//!                      ├──► TimedOut    (deadline won the race)
//!                      └──► Failed      (agent raised, lock held, interrupted)
//! ```
//!
//! The agent call runs as its own task and races a deadline timer in a
//! single `select!`. On timeout the agent gets a cancellation signal and a
//! bounded grace period, then it is aborted. The acquired agent is released
//! exactly once on every path before the result is returned. There are no
//! retries: a caller that wants another attempt builds a fresh configuration.

mod guard;
mod result;

pub use result::{RunFailure, RunResult, RunStatus};

use crate::agent::Mode;
use crate::config::DEFAULT_RELEASE_GRACE_SECS;
use crate::runtime::{AgentHandle, AgentOutput, AgentRequest, AgentRuntime, RuntimeEvent};
use crate::validate::RunConfiguration;
use crate::workspace::{LockMetadata, WorkspaceLock};
use crate::{EaselError, Result};
use chrono::Utc;
use guard::ReleaseGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::TimedOut | RunState::Failed)
    }

    fn can_advance_to(self, next: RunState) -> bool {
        match self {
            RunState::Idle => next == RunState::Running,
            RunState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Advisory progress surfaced to the caller while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Started { model: String, mode: Mode },
    /// Intermediate agent step; only forwarded in verbose mode
    Step(String),
    /// Agent output chunk; only forwarded in verbose mode
    Output(String),
    /// Deadline or interrupt fired, cancellation requested
    Cancelling,
    Finished(RunStatus),
}

pub type ProgressSink = mpsc::UnboundedSender<Progress>;

/// How the race between agent and deadline resolved
enum Outcome {
    Completed(AgentOutput),
    TimedOut,
    Failed(EaselError),
}

/// Runs one configuration at a time against an [`AgentRuntime`].
pub struct Runner<R: AgentRuntime> {
    runtime: R,
    release_grace: Duration,
    progress: Option<ProgressSink>,
    interrupt: CancellationToken,
}

impl<R: AgentRuntime> Runner<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            release_grace: Duration::from_secs(DEFAULT_RELEASE_GRACE_SECS),
            progress: None,
            interrupt: CancellationToken::new(),
        }
    }

    /// Bound on waiting for cancellation acknowledgement and for teardown.
    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Use `token` to interrupt in-flight runs (e.g. on Ctrl-C).
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Execute one attempt. Never retries; never returns partial output.
    pub async fn execute(&self, config: RunConfiguration) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut state = RunState::Idle;
        self.advance(&mut state, RunState::Running);

        tracing::info!(
            "Starting {} run in {:?} with {} (timeout {}s)",
            config.mode(),
            config.workspace(),
            config.model(),
            config.timeout_secs()
        );
        self.emit(Progress::Started {
            model: config.model().to_string(),
            mode: config.mode(),
        });

        let request = AgentRequest {
            workspace: config.workspace().to_path_buf(),
            model: config.model().clone(),
            mode: config.mode(),
            message: config.message().to_string(),
        };

        let (outcome, elapsed) = match self.attempt(&config, request, clock).await {
            Ok(resolved) => resolved,
            Err(e) => (Outcome::Failed(e), clock.elapsed()),
        };

        let result = match outcome {
            Outcome::Completed(output) => {
                self.advance(&mut state, RunState::Completed);
                // The agent won the race, so it finished within the deadline
                let secs = elapsed.as_secs_f64().min(config.timeout_secs() as f64);
                RunResult::success(output.content, secs, started_at)
            }
            Outcome::TimedOut => {
                self.advance(&mut state, RunState::TimedOut);
                RunResult::timeout(config.timeout_secs(), started_at)
            }
            Outcome::Failed(e) => {
                self.advance(&mut state, RunState::Failed);
                tracing::error!("Run failed ({}): {}", e.kind(), e);
                RunResult::failed(&e, elapsed.as_secs_f64(), started_at)
            }
        };

        tracing::info!(
            "Run finished: {} after {:.2}s",
            result.status,
            result.elapsed_seconds
        );
        self.emit(Progress::Finished(result.status));
        result
    }

    /// Lock the workspace, acquire the agent, race it, and release it.
    ///
    /// Returns the outcome and the elapsed time at which it was decided.
    /// Errors are failures that happen before the agent ever ran.
    async fn attempt(
        &self,
        config: &RunConfiguration,
        request: AgentRequest,
        clock: Instant,
    ) -> Result<(Outcome, Duration)> {
        let ttl = config.timeout() + self.release_grace * 2;
        let lock_meta = LockMetadata::new(&request.model.to_string(), request.mode.as_str(), ttl);
        let lock = WorkspaceLock::acquire(config.layout(), &lock_meta)?;
        tracing::debug!("Acquired run lock {:?}", lock.path());

        let handle = self.runtime.spawn(&request).await?;
        tracing::debug!("Acquired {} agent", self.runtime.name());
        // The lock is given up only once the agent has been torn down
        let guard = ReleaseGuard::new(handle.clone(), self.release_grace).with_lock(lock);

        let outcome = self.race(config, handle, request).await;
        let elapsed = clock.elapsed();

        guard.release().await;
        Ok((outcome, elapsed))
    }

    async fn race(
        &self,
        config: &RunConfiguration,
        handle: Arc<dyn AgentHandle>,
        request: AgentRequest,
    ) -> Outcome {
        let cancel = self.interrupt.child_token();
        // Stops the agent task if this future is dropped mid-race
        let _cancel_on_drop = cancel.clone().drop_guard();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut task = tokio::spawn({
            let cancel = cancel.clone();
            async move { handle.run(request, events_tx, cancel).await }
        });

        let deadline = tokio::time::sleep(config.timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                joined = &mut task => {
                    while let Ok(event) = events_rx.try_recv() {
                        self.forward(event, config.verbose());
                    }
                    return match joined {
                        Ok(Ok(output)) => Outcome::Completed(output),
                        Ok(Err(e)) => Outcome::Failed(e),
                        Err(e) if e.is_panic() => {
                            Outcome::Failed(EaselError::Runtime("agent task panicked".to_string()))
                        }
                        Err(e) => Outcome::Failed(EaselError::Runtime(format!("agent task ended: {}", e))),
                    };
                }
                _ = &mut deadline => {
                    tracing::warn!("Execution exceeded {}s, cancelling agent", config.timeout_secs());
                    self.cancel_and_settle(&cancel, task).await;
                    return Outcome::TimedOut;
                }
                _ = self.interrupt.cancelled() => {
                    tracing::warn!("Run interrupted, cancelling agent");
                    self.cancel_and_settle(&cancel, task).await;
                    return Outcome::Failed(EaselError::Cancelled);
                }
                Some(event) = events_rx.recv() => self.forward(event, config.verbose()),
            }
        }
    }

    /// Signal cancellation and give the agent the grace period to stop.
    async fn cancel_and_settle(
        &self,
        cancel: &CancellationToken,
        mut task: JoinHandle<Result<AgentOutput>>,
    ) {
        cancel.cancel();
        self.emit(Progress::Cancelling);
        match tokio::time::timeout(self.release_grace, &mut task).await {
            Ok(_) => tracing::debug!("Agent acknowledged cancellation"),
            Err(_) => {
                tracing::warn!(
                    "Agent ignored cancellation for {:?}; aborting it",
                    self.release_grace
                );
                task.abort();
            }
        }
    }

    fn forward(&self, event: RuntimeEvent, verbose: bool) {
        match event {
            RuntimeEvent::Step(step) => {
                tracing::debug!("Agent step: {}", step);
                if verbose {
                    self.emit(Progress::Step(step));
                }
            }
            RuntimeEvent::Output(chunk) => {
                if verbose {
                    self.emit(Progress::Output(chunk));
                }
            }
        }
    }

    fn advance(&self, state: &mut RunState, next: RunState) {
        debug_assert!(state.can_advance_to(next), "{:?} -> {:?}", state, next);
        tracing::debug!("Run state {:?} -> {:?}", state, next);
        *state = next;
    }

    fn emit(&self, progress: Progress) {
        if let Some(sink) = &self.progress {
            let _ = sink.send(progress);
        }
    }
}
