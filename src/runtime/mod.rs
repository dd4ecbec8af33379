//! Agent runtime abstraction.
//!
//! The runner never talks to a model directly. It asks an [`AgentRuntime`]
//! for a handle scoped to one workspace, drives a single [`AgentHandle::run`]
//! call, and always finishes with [`AgentHandle::release`].

mod process;

pub use process::ProcessRuntime;

use crate::agent::{Mode, ModelId};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything the agent needs for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub workspace: PathBuf,
    pub model: ModelId,
    pub mode: Mode,
    pub message: String,
}

/// Content produced by a completed agent run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentOutput {
    pub content: String,
}

impl AgentOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Intermediate progress reported while an agent works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// An intermediate agent step (tool call, plan update, diagnostics).
    Step(String),
    /// A chunk of user-facing output.
    Output(String),
}

/// Where a handle reports progress. Sends never block; a closed receiver
/// just means nobody is listening.
pub type EventSink = mpsc::UnboundedSender<RuntimeEvent>;

/// Agent engine acquired for a single execution.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Run the agent to completion.
    ///
    /// Implementations should watch `cancel` and return
    /// [`EaselError::Cancelled`](crate::EaselError::Cancelled) promptly once
    /// it fires. The runner stops waiting after its grace period either way.
    async fn run(
        &self,
        request: AgentRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<AgentOutput>;

    /// Tear down everything the handle holds. Called exactly once.
    async fn release(&self) -> Result<()>;
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire an agent instance scoped to `request.workspace`.
    async fn spawn(&self, request: &AgentRequest) -> Result<Arc<dyn AgentHandle>>;
}
