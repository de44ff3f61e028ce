//! Compile by running the project's build command through the shell.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kiln_config::{BuildConfiguration, BuildMode};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::compiler::{Compiler, RebuildSender, WatchHandle};
use crate::error::{CompileError, Result};
use crate::event::{FileChangeKind, RebuildEvent};
use crate::watcher::{ChangeBatch, SourceWatcher, WatchFilter};

type PathChange = (PathBuf, FileChangeKind);

/// Lines of stderr kept in a `CommandFailed` error.
const STDERR_TAIL_LINES: usize = 20;

/// Compiler that shells out to `build_command`.
///
/// The command sees the resolved layout through `KILN_MODE`, `KILN_ROOT`,
/// `KILN_ASSETS_DIR`, `KILN_SERVER_DIR` and `KILN_PUBLIC_PATH`, and runs
/// with the project root as its working directory.
#[derive(Debug, Clone, Default)]
pub struct CommandCompiler;

impl CommandCompiler {
    pub fn new() -> Self {
        Self
    }

    fn command(config: &BuildConfiguration, mode: BuildMode) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&config.build_command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&config.build_command);
            c
        };

        cmd.current_dir(&config.root_directory)
            .env("KILN_MODE", mode.as_str())
            .env("KILN_ROOT", &config.root_directory)
            .env("KILN_ASSETS_DIR", &config.assets_output_directory)
            .env("KILN_SERVER_DIR", &config.server_output_directory)
            .env("KILN_PUBLIC_PATH", &config.public_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run the build command once and report how long it took.
    ///
    /// The command's stdout goes straight to ours. Its stderr is copied to
    /// ours line by line, and the last lines are kept for the error report.
    pub async fn run_build(&self, config: &BuildConfiguration, mode: BuildMode) -> Result<Duration> {
        let start = Instant::now();
        tracing::debug!(command = %config.build_command, mode = %mode, "Running build command");

        let spawn_error = |source: std::io::Error| CompileError::Spawn {
            command: config.build_command.clone(),
            source,
        };

        let mut child = Self::command(config, mode)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let stderr = match child.stderr.take() {
            Some(pipe) => tee_lines(pipe, tokio::io::stderr(), STDERR_TAIL_LINES)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!("Failed to read build command stderr: {}", e);
                    String::new()
                }),
            None => String::new(),
        };
        let status = child.wait().await.map_err(spawn_error)?;

        if !status.success() {
            return Err(CompileError::CommandFailed {
                command: config.build_command.clone(),
                code: status.code(),
                stderr,
            });
        }

        let elapsed = start.elapsed();
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Build command finished");
        Ok(elapsed)
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn build(&self, config: &BuildConfiguration, mode: BuildMode) -> Result<()> {
        self.run_build(config, mode).await.map(|_| ())
    }

    async fn watch(
        &self,
        config: &BuildConfiguration,
        mode: BuildMode,
        events: RebuildSender,
    ) -> Result<WatchHandle> {
        let initial_error = self.run_build(config, mode).await.err();

        let (watcher, changes) = SourceWatcher::start(WatchFilter::from_config(config))?;
        let debounce = Duration::from_millis(config.watch.debounce_ms);
        let task = tokio::spawn(rebuild_loop(
            self.clone(),
            config.clone(),
            mode,
            changes,
            events,
            debounce,
        ));

        Ok(WatchHandle::new(initial_error, move || {
            task.abort();
            drop(watcher);
        }))
    }
}

/// Turn debounced change batches into sequential rebuild cycles.
///
/// Ends when the watcher goes away or nobody listens for events anymore.
async fn rebuild_loop(
    compiler: CommandCompiler,
    config: BuildConfiguration,
    mode: BuildMode,
    mut changes: mpsc::Receiver<PathChange>,
    events: RebuildSender,
    debounce: Duration,
) {
    while let Some((path, kind)) = changes.recv().await {
        let mut batch = ChangeBatch::new();
        batch.record(path, kind);

        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, changes.recv()).await {
                Ok(Some((path, kind))) => batch.record(path, kind),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if !batch.is_empty() && !run_cycle(&compiler, &config, mode, batch, &events).await {
            break;
        }
        if closed {
            break;
        }
    }
    tracing::debug!("Rebuild loop finished");
}

/// One rebuild cycle. Returns false once the event receiver is gone.
async fn run_cycle(
    compiler: &CommandCompiler,
    config: &BuildConfiguration,
    mode: BuildMode,
    batch: ChangeBatch,
    events: &RebuildSender,
) -> bool {
    tracing::debug!(changes = batch.len(), "Starting rebuild");
    if events.send(RebuildEvent::Started).is_err() {
        return false;
    }
    for (path, kind) in batch.into_changes() {
        if events.send(RebuildEvent::file(kind, path)).is_err() {
            return false;
        }
    }

    let outcome = match compiler.run_build(config, mode).await {
        Ok(duration) => RebuildEvent::Finished { duration },
        Err(e) => RebuildEvent::Failed {
            error: e.to_string(),
        },
    };
    events.send(outcome).is_ok()
}

/// Copy `reader` to `writer` line by line and return the last `keep` lines.
///
/// Write failures are ignored so a closed terminal never stalls the child.
async fn tee_lines<R, W>(reader: R, mut writer: W, keep: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut recent = VecDeque::with_capacity(keep);

    while let Some(mut segment) = segments.next_segment().await? {
        segment.push(b'\n');
        let _ = writer.write_all(&segment).await;

        let line = String::from_utf8_lossy(&segment);
        if recent.len() == keep {
            recent.pop_front();
        }
        recent.push_back(line.trim_end_matches(['\n', '\r']).to_string());
    }
    let _ = writer.flush().await;

    Ok(Vec::from(recent).join("\n"))
}
