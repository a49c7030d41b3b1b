//! Encoder process adapter.
//!
//! The encoder consumes recorder chunks on stdin and writes the container to a
//! local file. Graceful stop writes a quit byte and closes stdin; forced stop
//! kills the process.

use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::config::RecordingConfig;
use crate::error::CaptureError;

/// How the encoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,

    /// Whether we killed it
    pub killed: bool,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Detached handle resolving when the encoder exits
pub struct ExitSignal {
    rx: watch::Receiver<Option<EncoderExit>>,
}

impl ExitSignal {
    /// Exit status, if the process already ended
    pub fn try_get(&self) -> Option<EncoderExit> {
        *self.rx.borrow()
    }

    /// Wait for the process to end
    pub async fn wait(mut self) -> EncoderExit {
        loop {
            if let Some(exit) = *self.rx.borrow() {
                return exit;
            }
            if self.rx.changed().await.is_err() {
                // Reporter went away without a status
                return self.rx.borrow().unwrap_or(EncoderExit {
                    code: None,
                    killed: false,
                });
            }
        }
    }
}

/// A running encoder
pub struct EncoderProcess {
    input: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    exit: watch::Receiver<Option<EncoderExit>>,
    kill: Option<oneshot::Sender<()>>,
    bytes_written: u64,
}

impl EncoderProcess {
    /// Assemble an encoder from its input, exit reporter and kill switch.
    ///
    /// Dropping the kill sender without sending is treated as a kill request.
    pub fn from_parts(
        input: Box<dyn AsyncWrite + Send + Unpin>,
        exit: watch::Receiver<Option<EncoderExit>>,
        kill: oneshot::Sender<()>,
    ) -> Self {
        Self {
            input: Some(input),
            exit,
            kill: Some(kill),
            bytes_written: 0,
        }
    }

    /// Feed one recorder chunk to the encoder input
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "encoder input closed"))?;

        input.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Ask the encoder to finish: quit byte, then close stdin
    pub async fn request_quit(&mut self) -> io::Result<()> {
        if let Some(mut input) = self.input.take() {
            // The process may already be gone; closing is what matters
            let _ = input.write_all(b"q").await;
            input.shutdown().await?;
        }
        Ok(())
    }

    /// Force the process down
    pub fn kill(&mut self) {
        self.input = None;
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    pub fn exit_signal(&self) -> ExitSignal {
        ExitSignal {
            rx: self.exit.clone(),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Spawns encoder processes
#[async_trait]
pub trait EncoderLauncher: Send + Sync {
    async fn spawn(&self, output: &Path) -> Result<EncoderProcess, CaptureError>;
}

/// ffmpeg reading a media container from stdin
pub struct FfmpegLauncher {
    /// Path to the ffmpeg binary
    binary_path: String,

    /// Output args placed before the target file
    output_args: Vec<String>,
}

impl FfmpegLauncher {
    pub fn new(binary_path: impl Into<String>, output_args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            output_args,
        }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.ffmpeg_args.clone())
    }

    /// Full argument list for a given output file
    fn command_args(&self, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y", "-i", "pipe:0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(self.output_args.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl EncoderLauncher for FfmpegLauncher {
    async fn spawn(&self, output: &Path) -> Result<EncoderProcess, CaptureError> {
        let mut child = Command::new(&self.binary_path)
            .args(self.command_args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::encoder("spawn", format!("{}: {}", self.binary_path, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::encoder("spawn", "encoder stdin not captured"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "encoder", "{}", line);
                }
            });
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => EncoderExit {
                    code: status.ok().and_then(|s| s.code()),
                    killed: false,
                },
                _ = kill_rx => {
                    let _ = child.kill().await;
                    EncoderExit { code: None, killed: true }
                }
            };
            let _ = exit_tx.send(Some(exit));
        });

        Ok(EncoderProcess::from_parts(Box::new(stdin), exit_rx, kill_tx))
    }
}
