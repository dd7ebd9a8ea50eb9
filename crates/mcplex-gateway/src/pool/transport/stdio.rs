//! Child process connector
//!
//! Launches the definition's command locally and talks MCP over its
//! stdin/stdout. Stderr is drained into debug logs.

use std::process::Stdio;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use mcplex_core::ServerDefinition;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, error, info};

use super::{BackendChannel, BackendConnector};

#[derive(Debug, Default, Clone)]
pub struct ChildProcessConnector;

impl ChildProcessConnector {
    pub fn new() -> Self {
        Self
    }

    fn drain_stderr(unique_name: String, stderr: ChildStderr) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(unique_name = %unique_name, "[ChildProcess] stderr: {}", line);
            }
        });
    }
}

#[async_trait]
impl BackendConnector for ChildProcessConnector {
    async fn attach(&self, definition: &ServerDefinition) -> anyhow::Result<BackendChannel> {
        info!(
            unique_name = %definition.unique_name,
            command = %definition.launch_line(),
            "[ChildProcess] Launching backend"
        );

        let command_path = which::which(&definition.command)
            .or_else(|_| which::which(format!("{}.exe", &definition.command)))
            .map_err(|_| {
                let err = anyhow!(
                    "Command not found: {}. Ensure it's installed and in PATH.",
                    definition.command
                );
                error!(unique_name = %definition.unique_name, "{}", err);
                err
            })?;

        debug!(
            unique_name = %definition.unique_name,
            path = ?command_path,
            "[ChildProcess] Found command"
        );

        let args = definition.args.clone();
        let env = definition.env.clone();
        let (process, stderr) = TokioChildProcess::builder(Command::new(&command_path).configure(
            move |cmd| {
                cmd.args(&args).envs(&env).kill_on_drop(true);
            },
        ))
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn process: {}", definition.command))?;

        if let Some(stderr) = stderr {
            Self::drain_stderr(definition.unique_name.clone(), stderr);
        }

        Ok(BackendChannel::Child(process))
    }

    fn kind(&self) -> &'static str {
        "launch"
    }
}
