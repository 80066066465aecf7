//! Text-generation boundary shared by every agent role.
//!
//! The [`TextGenerator`] trait decouples the loop from the actual backend.
//! Production uses [`CommandGenerator`], which spawns the configured agent CLI
//! (by default `codex exec`). Tests use scripted generators that return
//! predetermined replies without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{AgentReply, Role};
use crate::io::config::{AgentsConfig, RetryConfig};
use crate::io::fs_util::write_text;
use crate::io::process::run_command_with_timeout;

pub const AGENT_REPLY_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/agent_reply.schema.json"
));

static REPLY_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(AGENT_REPLY_SCHEMA).expect("reply schema should be valid JSON");
    jsonschema::validator_for(&schema).expect("reply schema should compile")
});

/// Parameters for one agent call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub role: Role,
    /// Working directory of the agent process (the workspace path).
    pub workdir: PathBuf,
    pub prompt: String,
    /// JSON Schema the agent reply must follow.
    pub output_schema_path: PathBuf,
    /// Where the agent writes its final message.
    pub output_path: PathBuf,
    /// Where captured stdout/stderr is written.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over text-generation backends.
pub trait TextGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for &G {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        (**self).generate(request)
    }
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        (**self).generate(request)
    }
}

impl<G: TextGenerator + ?Sized> TextGenerator for Arc<G> {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        (**self).generate(request)
    }
}

/// Generator that spawns the configured command of each role.
///
/// The command receives the prompt on stdin followed by
/// `[--model M] --output-schema S --output-last-message O -`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    agents: AgentsConfig,
}

impl CommandGenerator {
    pub fn new(agents: AgentsConfig) -> Self {
        Self { agents }
    }
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(role = %request.role, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        let agent = self.agents.for_role(request.role);
        let (program, args) = agent
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agents.{}.command is empty", request.role))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting agent");

        ensure_reply_schema(&request.output_schema_path)?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        // A stale reply from an earlier attempt must not be mistaken for this one.
        if request.output_path.exists() {
            fs::remove_file(&request.output_path)
                .with_context(|| format!("remove stale reply {}", request.output_path.display()))?;
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(model) = &agent.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.clone().into_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {} agent", request.role))?;
        write_text(&request.log_path, &output.render_log(request.role.as_str()))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Err(anyhow!(
                "{} agent timed out after {:?}",
                request.role,
                request.timeout
            ));
        }
        if !output.succeeded() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{} agent failed with status {:?} (see {})",
                request.role,
                output.status.code(),
                request.log_path.display()
            ));
        }

        let raw = read_reply(&request.output_path)?;
        let reply = parse_reply(&raw);
        debug!(
            structured = reply.complete.is_some() || !reply.tool_calls.is_empty(),
            bytes = reply.text.len(),
            "parsed agent reply"
        );
        Ok(reply)
    }
}

/// Write the embedded reply schema to `path` unless it is already there.
pub fn ensure_reply_schema(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    write_text(path, AGENT_REPLY_SCHEMA)
}

fn read_reply(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow!("missing agent reply {}", path.display()));
    }
    fs::read_to_string(path).with_context(|| format!("read agent reply {}", path.display()))
}

/// Interpret an agent's final message.
///
/// JSON that satisfies the reply schema is a structured reply; anything else is
/// taken verbatim as the reply text.
pub fn parse_reply(raw: &str) -> AgentReply {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if REPLY_VALIDATOR.is_valid(&value) {
            match serde_json::from_value::<AgentReply>(value) {
                Ok(reply) => return reply,
                Err(err) => debug!(err = %err, "schema-valid reply did not deserialize"),
            }
        } else {
            debug!("reply JSON does not match schema; using raw text");
        }
    }
    AgentReply::text(trimmed)
}

/// Marks an error after the retry budget of a call was spent.
#[derive(Debug, thiserror::Error)]
#[error("{role} call failed after {attempts} attempt(s)")]
pub struct RetriesExhausted {
    pub role: Role,
    pub attempts: u32,
}

/// Retries failed calls with exponential backoff, then fails fast.
#[derive(Debug, Clone)]
pub struct RetryingGenerator<G> {
    inner: G,
    max_retries: u32,
    backoff: Duration,
}

impl<G: TextGenerator> RetryingGenerator<G> {
    pub fn new(inner: G, retry: &RetryConfig) -> Self {
        Self {
            inner,
            max_retries: retry.max_retries,
            backoff: Duration::from_millis(retry.backoff_ms),
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl<G: TextGenerator> TextGenerator for RetryingGenerator<G> {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.generate(request) {
                Ok(reply) => return Ok(reply),
                Err(err) if attempt > self.max_retries => {
                    return Err(err.context(RetriesExhausted {
                        role: request.role,
                        attempts: attempt,
                    }));
                }
                Err(err) => {
                    let delay = self.delay(attempt - 1);
                    warn!(
                        role = %request.role,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        err = %format!("{err:#}"),
                        "agent call failed; retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ToolCall;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(dir: &Path) -> GenerationRequest {
        GenerationRequest {
            role: Role::SubAgent,
            workdir: dir.to_path_buf(),
            prompt: "prompt".to_string(),
            output_schema_path: dir.join("schema.json"),
            output_path: dir.join("reply.json"),
            log_path: dir.join("agent.log"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl TextGenerator for Flaky {
        fn generate(&self, _request: &GenerationRequest) -> Result<AgentReply> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(anyhow!("transient failure {call}"));
            }
            Ok(AgentReply::text("ok"))
        }
    }

    #[test]
    fn parse_reply_accepts_structured_json() {
        let reply = parse_reply(
            r#"{"text":"next","complete":false,"tool_calls":[{"name":"enter_workspace","arguments":{"title":"a"}}]}"#,
        );
        assert_eq!(reply.text, "next");
        assert_eq!(reply.complete, Some(false));
        assert_eq!(
            reply.tool_calls,
            vec![ToolCall::EnterWorkspace {
                title: "a".to_string()
            }]
        );
    }

    #[test]
    fn parse_reply_falls_back_to_raw_text() {
        assert_eq!(parse_reply("  plain words \n"), AgentReply::text("plain words"));
        let off_schema = r#"{"answer": 42}"#;
        assert_eq!(parse_reply(off_schema), AgentReply::text(off_schema));
    }

    #[test]
    fn null_complete_means_unknown() {
        let reply = parse_reply(r#"{"text":"The task is complete: yes","complete":null,"tool_calls":[]}"#);
        assert_eq!(reply.complete, None);
    }

    #[test]
    fn retrying_recovers_within_budget() {
        let temp = tempfile::tempdir().expect("tempdir");
        let flaky = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let retrying = RetryingGenerator::new(
            &flaky,
            &RetryConfig {
                max_retries: 2,
                backoff_ms: 1,
            },
        );
        let reply = retrying.generate(&request(temp.path())).expect("generate");
        assert_eq!(reply.text, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retrying_fails_fast_after_budget() {
        let temp = tempfile::tempdir().expect("tempdir");
        let flaky = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let retrying = RetryingGenerator::new(
            &flaky,
            &RetryConfig {
                max_retries: 1,
                backoff_ms: 1,
            },
        );
        let err = retrying.generate(&request(temp.path())).unwrap_err();
        let exhausted = err.downcast_ref::<RetriesExhausted>().expect("typed context");
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert!(format!("{err:#}").contains("transient failure 1"));
    }

    #[cfg(unix)]
    fn shell_agents(script: &str) -> AgentsConfig {
        let mut agents = AgentsConfig::default();
        agents.sub_agent.command = vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "fake-agent".to_string(),
        ];
        agents
    }

    /// Verifies the command contract: prompt on stdin, reply read from the
    /// `--output-last-message` path.
    #[cfg(unix)]
    #[test]
    fn command_generator_reads_reply_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output-last-message" ]; then out="$2"; fi
  shift
done
prompt=$(cat)
printf '{"text":"got %s","complete":null,"tool_calls":[]}' "$prompt" > "$out""#;
        let generator = CommandGenerator::new(shell_agents(script));
        let req = request(temp.path());

        let reply = generator.generate(&req).expect("generate");
        assert_eq!(reply.text, "got prompt");
        assert!(req.output_schema_path.is_file());
        assert!(req.log_path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_reports_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = CommandGenerator::new(shell_agents("cat >/dev/null; echo boom >&2; exit 3"));
        let req = request(temp.path());

        let err = generator.generate(&req).unwrap_err();
        assert!(err.to_string().contains("sub_agent agent failed with status Some(3)"));
        let log = fs::read_to_string(&req.log_path).expect("log");
        assert!(log.contains("boom"));
    }
}
