use crate::agent::Mode;
use crate::runtime::{
    AgentHandle, AgentOutput, AgentRequest, AgentRuntime, EventSink, RuntimeEvent,
};
use crate::{EaselError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a scripted agent does when run.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Report `steps`, wait `after`, then answer `content`. Honors cancellation.
    Reply {
        after: Duration,
        content: String,
        steps: Vec<String>,
    },
    /// Wait `after`, then raise. Honors cancellation.
    Fail { after: Duration, message: String },
    /// Never resolve, and ignore cancellation.
    Hang,
    Panic,
}

impl Script {
    pub(crate) fn reply(after: Duration, content: &str) -> Self {
        Script::Reply {
            after,
            content: content.to_string(),
            steps: vec!["thinking".to_string()],
        }
    }

    pub(crate) fn fail(after: Duration, message: &str) -> Self {
        Script::Fail {
            after,
            message: message.to_string(),
        }
    }
}

/// Canned runtime that counts acquisitions and releases.
#[derive(Clone)]
pub(crate) struct ScriptedRuntime {
    script: Script,
    spawns: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    spawn_error: Option<String>,
    failing_release: bool,
    stuck_release: bool,
}

impl ScriptedRuntime {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            spawns: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
            spawn_error: None,
            failing_release: false,
            stuck_release: false,
        }
    }

    pub(crate) fn with_spawn_error(mut self, message: &str) -> Self {
        self.spawn_error = Some(message.to_string());
        self
    }

    pub(crate) fn with_failing_release(mut self) -> Self {
        self.failing_release = true;
        self
    }

    pub(crate) fn with_stuck_release(mut self) -> Self {
        self.stuck_release = true;
        self
    }

    pub(crate) fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn request() -> AgentRequest {
        AgentRequest {
            workspace: PathBuf::from("/tmp/easel-test"),
            model: "openai/gpt-4".parse().unwrap(),
            mode: Mode::Ask,
            message: "1+1=?".to_string(),
        }
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn spawn(&self, _request: &AgentRequest) -> Result<Arc<dyn AgentHandle>> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.spawn_error {
            return Err(EaselError::Runtime(message.clone()));
        }
        Ok(Arc::new(ScriptedHandle {
            script: self.script.clone(),
            releases: self.releases.clone(),
            failing_release: self.failing_release,
            stuck_release: self.stuck_release,
        }))
    }
}

struct ScriptedHandle {
    script: Script,
    releases: Arc<AtomicUsize>,
    failing_release: bool,
    stuck_release: bool,
}

#[async_trait]
impl AgentHandle for ScriptedHandle {
    async fn run(
        &self,
        _request: AgentRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        match &self.script {
            Script::Reply {
                after,
                content,
                steps,
            } => {
                for step in steps {
                    let _ = events.send(RuntimeEvent::Step(step.clone()));
                }
                tokio::select! {
                    _ = cancel.cancelled() => Err(EaselError::Cancelled),
                    _ = tokio::time::sleep(*after) => {
                        let _ = events.send(RuntimeEvent::Output(content.clone()));
                        Ok(AgentOutput::new(content.clone()))
                    }
                }
            }
            Script::Fail { after, message } => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(EaselError::Cancelled),
                    _ = tokio::time::sleep(*after) => Err(EaselError::Agent(message.clone())),
                }
            }
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted agent panicked"),
        }
    }

    async fn release(&self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.stuck_release {
            std::future::pending::<()>().await;
        }
        if self.failing_release {
            return Err(EaselError::Runtime("scripted release failure".to_string()));
        }
        Ok(())
    }
}
