//! Handler dispatch (spec §4.7 "Transitions and messages", §6.2). Each
//! handler has its own wire format; the pipeline's only contract with them
//! is `AlertHandler::dispatch`. Specific third-party notifier wire formats
//! are out of scope (spec §1 Non-goals) — only the shapes that are part of
//! the core (post/tcp/log/exec) are implemented.

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::AlertData;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
    #[error("handler returned non-2xx status {0}")]
    BadStatus(u16),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn dispatch(&self, data: &AlertData) -> Result<(), DispatchError>;
}

/// POST the JSON-encoded `AlertData` to a URL. A timeout drops the request
/// and logs (spec §7 "Runtime transport errors": "the message is dropped,
/// the error is metricized").
pub struct PostHandler {
    pub url: String,
    pub timeout: Duration,
    client: reqwest::Client,
}

impl PostHandler {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertHandler for PostHandler {
    async fn dispatch(&self, data: &AlertData) -> Result<(), DispatchError> {
        let send = self.client.post(&self.url).timeout(self.timeout).json(data).send();
        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(resp)) if resp.status().is_success() => Ok(()),
            Ok(Ok(resp)) => Err(DispatchError::BadStatus(resp.status().as_u16())),
            Ok(Err(e)) => Err(DispatchError::Transport(e.to_string())),
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        }
    }
}

/// Length-delimited JSON over a persistent TCP connection.
pub struct TcpHandler {
    pub addr: String,
}

#[async_trait]
impl AlertHandler for TcpHandler {
    async fn dispatch(&self, data: &AlertData) -> Result<(), DispatchError> {
        use tokio::io::AsyncWriteExt;
        let payload = serde_json::to_vec(data).map_err(|e| DispatchError::Transport(e.to_string()))?;
        let mut stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(DispatchError::Io)?;
        stream.write_u32(payload.len() as u32).await?;
        stream.write_all(&payload).await?;
        Ok(())
    }
}

/// Append JSON to a log file with a configurable UNIX file mode.
pub struct LogHandler {
    pub path: PathBuf,
    #[cfg(unix)]
    pub mode: u32,
}

#[async_trait]
impl AlertHandler for LogHandler {
    async fn dispatch(&self, data: &AlertData) -> Result<(), DispatchError> {
        let line = serde_json::to_string(data).map_err(|e| DispatchError::Transport(e.to_string()))?;
        let path = self.path.clone();
        #[cfg(unix)]
        let mode = self.mode;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut opts = std::fs::OpenOptions::new();
            opts.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(mode);
            }
            let mut f = opts.open(&path)?;
            writeln!(f, "{line}")
        })
        .await
        .map_err(|e| DispatchError::Transport(e.to_string()))??;
        Ok(())
    }
}

/// Invoke a process with the JSON payload on stdin.
pub struct ExecHandler {
    pub command: String,
    pub args: Vec<String>,
}

#[async_trait]
impl AlertHandler for ExecHandler {
    async fn dispatch(&self, data: &AlertData) -> Result<(), DispatchError> {
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let payload = serde_json::to_vec(data).map_err(|e| DispatchError::Transport(e.to_string()))?;
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(DispatchError::Io)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
        }
        let status = child.wait().await.map_err(DispatchError::Io)?;
        if !status.success() {
            return Err(DispatchError::Transport(format!("exec handler exited with {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use flow_core::Tags;
    use std::collections::HashMap;

    fn sample() -> AlertData {
        AlertData {
            id: "x".into(),
            message: "m".into(),
            details: String::new(),
            time: 0,
            duration_since_entry: 0,
            level: Level::Critical,
            previous_level: Level::Ok,
            recoverable: false,
            task_name: "t".into(),
            tags: Tags::new(),
            fields: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn log_handler_appends_json_line() {
        let dir = std::env::temp_dir().join(format!("flow-alert-test-{}", std::process::id()));
        let handler = LogHandler {
            path: dir.clone(),
            #[cfg(unix)]
            mode: 0o644,
        };
        handler.dispatch(&sample()).await.unwrap();
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert!(contents.contains("\"id\":\"x\""));
        let _ = std::fs::remove_file(&dir);
    }
}
