use std::process::Stdio;

use bytes::Bytes;
use cutout_logging::{cutout_debug, cutout_warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::transform::{StageProgress, Transform};
use crate::{FailureKind, TransformConfig, TransformError};

const STDERR_TAIL_LINES: usize = 8;

/// Program and arguments of an external background-removal tool.
///
/// Arguments may contain `{format}` and `{quality}`, substituted per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSettings {
    pub program: String,
    pub args: Vec<String>,
}

/// Runs an external program as the transform.
///
/// Image bytes go to stdin and the result is read from stdout. Lines of the
/// form `progress <stage> <current> <total>` on stderr are relayed as
/// progress; the remaining stderr lines end up in the error message.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    settings: CommandSettings,
}

impl CommandTransform {
    pub fn new(settings: CommandSettings) -> Self {
        Self { settings }
    }

    fn expand_args(&self, config: &TransformConfig) -> Vec<String> {
        let quality = format!("{:.2}", config.effective_quality());
        self.settings
            .args
            .iter()
            .map(|arg| {
                arg.replace("{format}", config.output_format.extension())
                    .replace("{quality}", &quality)
            })
            .collect()
    }
}

/// Parses `progress <stage> <current> <total>`.
pub fn parse_progress_line(line: &str) -> Option<(&str, u64, u64)> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "progress" {
        return None;
    }
    let stage = parts.next()?;
    let current = parts.next()?.parse().ok()?;
    let total = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((stage, current, total))
}

#[async_trait::async_trait]
impl Transform for CommandTransform {
    async fn transform(
        &self,
        input: Bytes,
        config: &TransformConfig,
        progress: &dyn StageProgress,
    ) -> Result<Bytes, TransformError> {
        let args = self.expand_args(config);
        cutout_debug!("spawning {} {:?}", self.settings.program, args);
        let mut child = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                TransformError::new(
                    FailureKind::Spawn,
                    format!("{}: {err}", self.settings.program),
                )
            })?;

        let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransformError::new(FailureKind::Io, "child pipes unavailable"));
        };

        let feed = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };
        let collect = async {
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await.map(|_| output)
        };
        let relay = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some((stage, current, total)) => progress.tick(stage, current, total),
                    None if !line.trim().is_empty() => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.remove(0);
                        }
                        tail.push(line);
                    }
                    None => {}
                }
            }
            tail
        };

        let (fed, collected, tail) = tokio::join!(feed, collect, relay);
        let status = child
            .wait()
            .await
            .map_err(|err| TransformError::new(FailureKind::Io, err.to_string()))?;

        if !status.success() {
            let message = if tail.is_empty() {
                status.to_string()
            } else {
                tail.join("\n")
            };
            return Err(TransformError::new(FailureKind::ExitStatus(status.code()), message));
        }
        if let Err(err) = fed {
            cutout_warn!("transform exited before reading all input: {err}");
        }
        let output =
            collected.map_err(|err| TransformError::new(FailureKind::Io, err.to_string()))?;
        Ok(Bytes::from(output))
    }
}
