//! Target Process Controller interface and launch orchestration.
//!
//! Discovering, spawning and attaching to processes belongs to a host
//! integration. This module fixes the order of operations the tracer relies
//! on: a spawned process stays suspended until the agent is installed, and is
//! always resumed afterwards.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::tracer::TraceSink;
use crate::Result;

const MESSAGE_BUFFER: usize = 1024;

/// How the target process is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    Spawn(String),
    Attach(String),
    Frontmost,
}

/// Message posted by an installed agent back to the operator console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message: serde_json::Value,
    pub payload: Option<serde_json::Value>,
}

impl AgentMessage {
    pub fn render(&self) -> String {
        let payload = self
            .payload
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "null".to_string());
        format!("{} {}", self.message, payload)
    }
}

/// Session attached to a live process.
pub trait AgentSession {
    /// Load the tracing agent configured by `config` into the process.
    fn install(&mut self, config: &SessionConfig, messages: mpsc::Sender<AgentMessage>) -> Result<()>;
}

/// Process discovery and lifecycle.
pub trait ProcessController {
    type Session: AgentSession;

    fn frontmost(&self) -> Result<u32>;

    fn find_process(&self, name: &str) -> Result<u32>;

    /// Start `identifier` suspended.
    fn spawn(&self, identifier: &str) -> Result<u32>;

    fn attach(&self, pid: u32) -> Result<Self::Session>;

    fn resume(&self, pid: u32) -> Result<()>;
}

/// A process with the agent installed.
pub struct LaunchedSession<S> {
    pub pid: u32,
    pub session: S,
    pub messages: mpsc::Receiver<AgentMessage>,
}

/// Reach the target, install the agent, and resume it if it was spawned.
pub fn launch<C: ProcessController>(
    controller: &C,
    target: &LaunchTarget,
    config: &SessionConfig,
) -> Result<LaunchedSession<C::Session>> {
    let pid = match target {
        LaunchTarget::Frontmost => controller.frontmost()?,
        LaunchTarget::Spawn(identifier) => controller.spawn(identifier)?,
        LaunchTarget::Attach(name) => controller.find_process(name)?,
    };
    tracing::info!("Target {:?} resolved to PID {}", target, pid);

    let spawned = matches!(target, LaunchTarget::Spawn(_));
    let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);

    let installed = controller
        .attach(pid)
        .and_then(|mut session| session.install(config, tx).map(|()| session));

    let session = match installed {
        Ok(session) => session,
        Err(e) => {
            if spawned {
                // Never leave a spawned process suspended forever.
                if let Err(resume_err) = controller.resume(pid) {
                    tracing::error!("Resume of PID {} after failed install also failed: {}", pid, resume_err);
                }
            }
            return Err(e);
        }
    };

    if spawned {
        controller.resume(pid)?;
        tracing::info!("Resumed spawned PID {}", pid);
    }

    Ok(LaunchedSession { pid, session, messages: rx })
}

/// Print agent messages until every sender is gone. Returns the count.
pub async fn forward_messages(mut messages: mpsc::Receiver<AgentMessage>, sink: &dyn TraceSink) -> usize {
    let mut count = 0;
    while let Some(message) = messages.recv().await {
        sink.emit(&message.render());
        count += 1;
    }
    count
}
