//! Out-of-band readiness probe for the inference engine: installation state,
//! run state, model availability, and a one-shot generation test.
//!
//! Every check launches a single external process under a bounded timeout.
//! A check that times out kills the child and resolves to a failure result;
//! it never hangs or propagates a fault to the caller.

use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::engine::EngineClient;

pub const PROBE_COMMAND: &str = "ollama";
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
pub const TEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Model-name fragments the listing is matched against, case-insensitively.
pub const KNOWN_MODEL_FRAGMENTS: &[&str] = &["adkar", "adkar_fast", "adkar_ultrafast"];

const TEST_PROMPT: &str = "What is the ADKAR change management model?";

/// Result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl CommandOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Engine readiness, recomputed fresh on every probe invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub installed: bool,
    pub running: bool,
    pub models_present: BTreeSet<String>,
}

impl ReadinessReport {
    pub fn has_model(&self, fragment: &str) -> bool {
        self.models_present.contains(fragment)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelTestOutcome {
    pub ok: bool,
    pub output: String,
}

pub struct ReadinessProbe {
    command: String,
    engine: EngineClient,
    check_timeout: Duration,
    test_timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(engine: EngineClient) -> Self {
        Self {
            command: PROBE_COMMAND.to_string(),
            engine,
            check_timeout: CHECK_TIMEOUT,
            test_timeout: TEST_TIMEOUT,
        }
    }

    /// Overrides the external command, mainly for tests.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_timeouts(mut self, check: Duration, test: Duration) -> Self {
        self.check_timeout = check;
        self.test_timeout = test;
        self
    }

    /// Whether the engine's command-line tool is installed at all.
    pub async fn check_installed(&self) -> bool {
        self.run_command(&["--version"], self.check_timeout)
            .await
            .success
    }

    /// Whether the engine daemon is up (the listing only works against a
    /// running daemon).
    pub async fn check_running(&self) -> bool {
        self.run_command(&["list"], self.check_timeout).await.success
    }

    /// Full readiness report: install state, run state, and which known
    /// model tiers the listing contains. Absence of a match means "not
    /// present", never an error.
    pub async fn check_models(&self) -> ReadinessReport {
        let installed = self.check_installed().await;
        let listing = self.run_command(&["list"], self.check_timeout).await;

        let models_present = if listing.success {
            parse_model_listing(&listing.output)
        } else {
            BTreeSet::new()
        };

        ReadinessReport {
            installed,
            running: listing.success,
            models_present,
        }
    }

    /// Exercises one model with a short prompt. Validates the model appears
    /// in the listing first so a missing model fails fast with a specific
    /// message instead of a slow doomed generation. Tries the direct HTTP
    /// path, and only falls back to a command-line run if that fails.
    pub async fn test_model(&self, model: &str) -> ModelTestOutcome {
        let listing = self.run_command(&["list"], self.check_timeout).await;
        if !listing.success {
            return ModelTestOutcome {
                ok: false,
                output: format!(
                    "Failed to check if model exists: {}",
                    listing.error.unwrap_or_default()
                ),
            };
        }

        if !listing.output.to_lowercase().contains(&model.to_lowercase()) {
            return ModelTestOutcome {
                ok: false,
                output: format!(
                    "Model \"{}\" not found. Available models: {}",
                    model, listing.output
                ),
            };
        }

        match self.engine.generate_prompt(model, TEST_PROMPT).await {
            Ok(text) => ModelTestOutcome {
                ok: true,
                output: text,
            },
            Err(e) => {
                tracing::warn!(
                    "direct engine call failed ({}), falling back to command-line run",
                    e
                );
                let result = self
                    .run_command(&["run", model, "--nowordwrap", TEST_PROMPT], self.test_timeout)
                    .await;
                if result.success {
                    ModelTestOutcome {
                        ok: true,
                        output: result.output,
                    }
                } else {
                    ModelTestOutcome {
                        ok: false,
                        output: format!(
                            "Failed to execute test: {}",
                            result.error.unwrap_or_default()
                        ),
                    }
                }
            }
        }
    }

    async fn run_command(&self, args: &[&str], limit: Duration) -> CommandOutcome {
        let mut cmd = Command::new(&self.command);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutcome::failed(format!(
                    "Failed to spawn {}: {}",
                    self.command, e
                ))
            }
        };

        // Drain the pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait on it.
        let stdout_task = tokio::spawn(read_to_string(child.stdout.take()));
        let stderr_task = tokio::spawn(read_to_string(child.stderr.take()));

        match timeout(limit, child.wait()).await {
            Err(_) => {
                // The child must be killed, not merely given up on.
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to kill timed-out probe child: {}", e);
                }
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                CommandOutcome::failed("Command execution timed out")
            }
            Ok(Err(e)) => CommandOutcome::failed(format!("Failed to wait for command: {}", e)),
            Ok(Ok(status)) => {
                let output = stdout_task.await.unwrap_or_default();
                let error = stderr_task.await.unwrap_or_default();
                let error = error.trim();
                CommandOutcome {
                    success: status.success(),
                    output: output.trim().to_string(),
                    error: (!error.is_empty()).then(|| error.to_string()),
                }
            }
        }
    }
}

/// Parses the tool's model listing, skipping the header row and matching
/// known fragments case-insensitively.
fn parse_model_listing(output: &str) -> BTreeSet<String> {
    let mut present = BTreeSet::new();
    for line in output.lines().skip(1) {
        let lower = line.to_lowercase();
        for fragment in KNOWN_MODEL_FRAGMENTS {
            if lower.contains(fragment) {
                present.insert((*fragment).to_string());
            }
        }
    }
    present
}

async fn read_to_string<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}
