//! Collaborators backed by external commands
//!
//! The build command receives the flags as trailing arguments and must print
//! the artifact location as the last non-empty line of stdout. The test
//! command receives the artifact location as its trailing argument and must
//! print the cost as the last non-empty line of stdout.

use crate::collaborators::{Compiler, Runner};
use async_trait::async_trait;
use bestflags_config::CommandConfig;
use bestflags_core::{
    Artifact, CollaboratorFailure, CompileError, Cost, Error, ExecutionError, FlagSet, Result,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Lines of stderr kept in a failure message
const STDERR_TAIL_LINES: usize = 20;

/// A parsed command line plus its execution settings
#[derive(Debug, Clone)]
struct CommandLine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandLine {
    fn parse(role: &str, config: &CommandConfig) -> Result<Self> {
        let words = shlex::split(&config.command).ok_or_else(|| {
            Error::collaborator(role, format!("cannot parse command '{}'", config.command))
        })?;
        let mut words = words.into_iter();
        let program = words
            .next()
            .ok_or_else(|| Error::collaborator(role, "command is empty"))?;
        Ok(Self {
            program,
            args: words.collect(),
            timeout: config.timeout(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
        })
    }

    /// Run to completion and return stdout, or the failure kind and a message
    async fn invoke(
        &self,
        extra_args: &[String],
        extra_env: &[(&str, String)],
    ) -> std::result::Result<String, (CollaboratorFailure, String)> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra_args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in extra_env {
            command.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            (
                CollaboratorFailure::Spawn,
                format!("failed to start '{}': {e}", self.program),
            )
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err((
                    CollaboratorFailure::Failed { exit_code: None },
                    format!("failed to wait for '{}': {e}", self.program),
                ))
            }
            Err(_) => {
                return Err((
                    CollaboratorFailure::TimedOut {
                        after: self.timeout,
                    },
                    format!("'{}' was killed", self.program),
                ))
            }
        };

        tracing::debug!(
            program = %self.program,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command_finished"
        );

        if !output.status.success() {
            return Err((
                CollaboratorFailure::Failed {
                    exit_code: output.status.code(),
                },
                stderr_tail(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location);
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn last_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.trim().is_empty() {
        "no diagnostics on stderr".to_string()
    } else {
        tail
    }
}

/// Compiles by running the configured build command
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    line: CommandLine,
}

impl CommandCompiler {
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        Ok(Self {
            line: CommandLine::parse("build", config)?,
        })
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, flags: &FlagSet) -> std::result::Result<Artifact, CompileError> {
        let checksum = flags.checksum();
        let stdout = self
            .line
            .invoke(
                &flags.to_args(),
                &[("BESTFLAGS_CHECKSUM", checksum.as_str().to_string())],
            )
            .await
            .map_err(|(kind, message)| CompileError::new(kind, message))?;

        let location = last_line(&stdout).ok_or_else(|| {
            CompileError::new(
                CollaboratorFailure::InvalidOutput,
                "build command printed no artifact location",
            )
        })?;

        let mut artifact = Artifact::new(location);
        let path = self.line.resolve(location);
        if let Ok(image) = tokio::fs::read(&path).await {
            artifact = artifact.with_image_checksum(hex::encode(Sha256::digest(&image)));
        } else {
            tracing::debug!(
                path = %path.display(),
                "artifact is not a readable file; no image checksum"
            );
        }
        Ok(artifact)
    }
}

/// Measures cost by running the configured test command
#[derive(Debug, Clone)]
pub struct CommandRunner {
    line: CommandLine,
}

impl CommandRunner {
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        Ok(Self {
            line: CommandLine::parse("test", config)?,
        })
    }
}

#[async_trait]
impl Runner for CommandRunner {
    async fn run(&self, artifact: &Artifact) -> std::result::Result<Cost, ExecutionError> {
        let stdout = self
            .line
            .invoke(
                std::slice::from_ref(&artifact.location),
                &[("BESTFLAGS_ARTIFACT", artifact.location.clone())],
            )
            .await
            .map_err(|(kind, message)| ExecutionError::new(kind, message))?;

        let line = last_line(&stdout).ok_or_else(|| {
            ExecutionError::new(
                CollaboratorFailure::InvalidOutput,
                "test command printed no cost",
            )
        })?;
        match line.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Cost::new(value)),
            _ => Err(ExecutionError::new(
                CollaboratorFailure::InvalidOutput,
                format!("test command printed '{line}', expected a finite number"),
            )),
        }
    }
}
