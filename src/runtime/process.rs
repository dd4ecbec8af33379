//! External-command runtime adapter
//!
//! Drives an agent CLI as a child process inside the workspace. The
//! instruction is written to the child's stdin and its stdout becomes the
//! run output. The model and mode are passed through the environment.

use super::{AgentHandle, AgentOutput, AgentRequest, AgentRuntime, EventSink, RuntimeEvent};
use crate::config::AppConfig;
use crate::{EaselError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Lines of stderr kept for failure messages
const STDERR_TAIL_LINES: usize = 20;

/// Runtime that spawns one agent process per execution.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    program: String,
    args: Vec<String>,
}

impl ProcessRuntime {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `EASEL_AGENT_COMMAND` as resolved in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (program, args) = config.agent_argv()?;
        Ok(Self::new(program, args))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AgentRuntime for ProcessRuntime {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn spawn(&self, request: &AgentRequest) -> Result<Arc<dyn AgentHandle>> {
        tracing::debug!(
            "Preparing agent process '{}' in {:?}",
            self.program,
            request.workspace
        );
        Ok(Arc::new(ProcessHandle {
            program: self.program.clone(),
            args: self.args.clone(),
            child: Mutex::new(None),
        }))
    }
}

struct ProcessHandle {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessHandle {
    async fn kill(&self) {
        if let Some(child) = self.child.lock().await.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Agent process already gone: {}", e);
            }
        }
    }
}

#[async_trait]
impl AgentHandle for ProcessHandle {
    async fn run(
        &self,
        request: AgentRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&request.workspace)
            .env("EASEL_WORKSPACE", &request.workspace)
            .env("EASEL_MODEL", request.model.to_string())
            .env("EASEL_PROVIDER", request.model.provider())
            .env("EASEL_MODE", request.mode.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EaselError::Agent(format!("failed to start agent '{}': {}", self.program, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.child.lock().await = Some(child);

        // Feed stdin from its own task so a child that never reads cannot stall us
        if let Some(mut stdin) = stdin {
            let message = request.message.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(message.as_bytes()).await {
                    tracing::debug!("Agent closed stdin early: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let stderr_task = stderr.map(|stderr| {
            let events = events.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                // Drain to EOF so the agent never writes into a closed pipe
                loop {
                    let line = match next_line(&mut reader, &mut buf).await {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!("Stopped reading agent stderr: {}", e);
                            break;
                        }
                    };
                    let _ = events.send(RuntimeEvent::Step(line.clone()));
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let mut collected: Vec<String> = Vec::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.kill().await;
                        return Err(EaselError::Cancelled);
                    }
                    line = next_line(&mut reader, &mut buf) => match line {
                        Ok(Some(line)) => {
                            let _ = events.send(RuntimeEvent::Output(line.clone()));
                            collected.push(line);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            self.kill().await;
                            return Err(EaselError::Agent(format!(
                                "failed to read agent output: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }

        let status = {
            let mut slot = self.child.lock().await;
            let Some(child) = slot.as_mut() else {
                return Err(EaselError::Agent(
                    "agent process was released before it exited".to_string(),
                ));
            };
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = child.start_kill();
                    return Err(EaselError::Cancelled);
                }
                status = child.wait() => status?,
            };
            slot.take();
            status
        };

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let detail = stderr_tail.trim();
            return Err(EaselError::Agent(if detail.is_empty() {
                format!("agent exited with {}", status)
            } else {
                format!("agent exited with {}: {}", status, detail)
            }));
        }

        Ok(AgentOutput::new(collected.join("\n")))
    }

    async fn release(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            tracing::debug!("Killing agent process still running at release");
            child.start_kill()?;
            child.wait().await?;
        }
        Ok(())
    }
}

/// Read one line, replacing invalid UTF-8 instead of rejecting it.
///
/// Returns `None` at EOF. The trailing `\n` (and `\r`) is stripped.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
