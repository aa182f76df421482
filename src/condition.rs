//! Condition script evaluation.
//!
//! Conditional modules bundle an admin-authored script whose exit code gates
//! display. Scripts are untrusted with respect to runtime behavior: they can
//! hang, crash, or emit garbage, so every run gets a hard timeout and the
//! child is killed if the evaluation is dropped mid-flight.
//!
//! Scripts run with their module folder as the working directory, so they
//! can read data files bundled beside them with plain relative paths.
//!
//! Exit code contract: `1` fires the condition, `0` means keep waiting, and
//! anything else (including launch failure or timeout) is a permanent error
//! for that module.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Exit code that fires a condition.
const EXIT_FIRE: i32 = 1;
/// Exit code that keeps a condition waiting.
const EXIT_WAIT: i32 = 0;

/// Floor for the per-run timeout, in seconds.
const MIN_CONDITION_TIMEOUT_SECS: u64 = 5;
/// Margin subtracted so a run always finishes before the next scan tick.
const CONDITION_TIMEOUT_MARGIN_SECS: u64 = 5;

/// Longest captured output tail attached to an error verdict.
const MAX_OUTPUT_TAIL: usize = 512;

/// Outcome of one condition script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionVerdict {
    /// The script exited 1: the condition holds, display the module.
    Fire,
    /// The script exited 0: not yet, re-check after the module's interval.
    Wait,
    /// The script failed: unexpected exit code, launch failure, or timeout.
    /// Terminal for the module.
    Error(String),
}

/// Runs condition scripts under a concurrency cap and a per-run timeout.
#[derive(Clone)]
pub struct ConditionalExecutor {
    interpreter: Arc<Interpreter>,
    permits: Arc<Semaphore>,
}

struct Interpreter {
    program: PathBuf,
    args: Vec<String>,
}

impl ConditionalExecutor {
    /// Creates an executor using the platform default script interpreter and
    /// at most `workers` concurrent runs.
    pub fn new(workers: usize) -> Self {
        let interpreter = if cfg!(windows) {
            Interpreter {
                program: PathBuf::from("powershell.exe"),
                args: vec![
                    "-NoProfile".to_owned(),
                    "-ExecutionPolicy".to_owned(),
                    "Bypass".to_owned(),
                    "-File".to_owned(),
                ],
            }
        } else {
            Interpreter {
                program: PathBuf::from("/bin/sh"),
                args: Vec::new(),
            }
        };
        Self {
            interpreter: Arc::new(interpreter),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Replaces the interpreter. Used by tests to run plain shell scripts
    /// regardless of platform defaults.
    pub fn with_interpreter(
        mut self,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        self.interpreter = Arc::new(Interpreter {
            program: program.into(),
            args,
        });
        self
    }

    /// Runs one condition script to completion or timeout, with the module
    /// folder as the working directory.
    ///
    /// Infallible by design: script misbehavior, launch failure, timeout,
    /// and executor shutdown all fold into [`ConditionVerdict::Error`], so
    /// one module's broken script can never fail a whole batch.
    pub async fn evaluate(
        &self,
        module_id: &str,
        script: &Path,
        module_root: &Path,
        timeout: Duration,
    ) -> ConditionVerdict {
        let Ok(_permit) = self.permits.acquire().await else {
            return ConditionVerdict::Error("executor is shut down".to_owned());
        };

        debug!(module = module_id, script = %script.display(), "running condition script");

        let mut command = Command::new(&self.interpreter.program);
        command
            .args(&self.interpreter.args)
            .arg(script)
            .current_dir(module_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(module = module_id, "condition script failed to launch: {e}");
                return ConditionVerdict::Error(format!(
                    "failed to launch {}: {e}",
                    script.display()
                ));
            }
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ConditionVerdict::Error(format!(
                    "condition script did not finish: {e}"
                ));
            }
            Err(_) => {
                warn!(
                    module = module_id,
                    timeout_secs = timeout.as_secs(),
                    "condition script timed out"
                );
                return ConditionVerdict::Error(format!(
                    "condition script timed out after {}s",
                    timeout.as_secs()
                ));
            }
        };

        let verdict = match output.status.code() {
            Some(EXIT_FIRE) => ConditionVerdict::Fire,
            Some(EXIT_WAIT) => ConditionVerdict::Wait,
            Some(code) => ConditionVerdict::Error(format!(
                "condition script exited {code}: {}",
                output_tail(&output.stdout, &output.stderr)
            )),
            None => ConditionVerdict::Error(format!(
                "condition script killed by signal: {}",
                output_tail(&output.stdout, &output.stderr)
            )),
        };

        debug!(module = module_id, verdict = ?verdict, "condition evaluated");
        verdict
    }
}

/// Computes the per-run timeout for a module.
///
/// The run must fit inside both the module's own recheck interval and the
/// process scan interval, with a margin so results land before the next tick,
/// but never below a usable floor.
pub fn condition_timeout(recheck_minutes: u32, scan_interval_secs: u64) -> Duration {
    let recheck_secs = u64::from(recheck_minutes).saturating_mul(60);
    let budget = recheck_secs
        .min(scan_interval_secs)
        .saturating_sub(CONDITION_TIMEOUT_MARGIN_SECS);
    Duration::from_secs(budget.max(MIN_CONDITION_TIMEOUT_SECS))
}

fn output_tail(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::new();
    let err = String::from_utf8_lossy(stderr);
    let out = String::from_utf8_lossy(stdout);
    if !err.trim().is_empty() {
        combined.push_str(err.trim());
    }
    if !out.trim().is_empty() {
        if !combined.is_empty() {
            combined.push_str(" | ");
        }
        combined.push_str(out.trim());
    }
    if combined.is_empty() {
        combined.push_str("(no output)");
    }
    if combined.len() > MAX_OUTPUT_TAIL {
        let cut = combined
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_OUTPUT_TAIL)
            .last()
            .unwrap_or(0);
        combined.truncate(cut);
    }
    combined
}

// ── Tests ────────────────────────────────────────────────────────────────────
