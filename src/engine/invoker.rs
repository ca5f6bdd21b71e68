//! High-level engine commands.
//!
//! The invoker turns each operation into a [`RunRequest`] with the JSON
//! configuration the engine expects and performs the call through a
//! [`CommandChannel`]. Transport errors propagate unchanged; every call is
//! bounded by an outer deadline.

use std::{future::Future, time::Duration};

use serde::Serialize;
use tracing::debug;

use super::{Command, CommandChannel, EngineError, RunRequest, RunResponse};

/// Tuning applied to every invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvokerSettings {
    /// Solver timeout passed to the engine for model checking.
    pub solver_timeout: Duration,
    /// Number of random runs requested when simulating.
    pub simulate_max_runs: u32,
    /// Outer deadline around each RPC.
    pub call_timeout: Duration,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            solver_timeout: Duration::from_secs(60),
            simulate_max_runs: 5,
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct EngineConfig<'a> {
    input: Input<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checker: Option<Checker<'a>>,
}

#[derive(Serialize)]
struct Input<'a> {
    source: Source<'a>,
}

#[derive(Serialize)]
struct Source<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
    aux: &'static [&'static str],
    format: &'static str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Checker<'a> {
    Check {
        inv: [&'a str; 1],
        length: u32,
        tuning: Tuning,
    },
    Simulate {
        max_run: u32,
        output_traces: bool,
    },
}

#[derive(Serialize)]
struct Tuning {
    #[serde(rename = "search.smt.timeout")]
    smt_timeout: String,
    #[serde(rename = "smt.randomSeed")]
    random_seed: String,
}

impl<'a> EngineConfig<'a> {
    const fn inline(spec: &'a str, checker: Option<Checker<'a>>) -> Self {
        Self {
            input: Input {
                source: Source {
                    kind: "string",
                    content: spec,
                    aux: &[],
                    format: "tla",
                },
            },
            checker,
        }
    }

    fn encode(&self) -> Result<String, EngineError> {
        serde_json::to_string(self)
            .map_err(|err| EngineError::Schema(format!("failed to encode engine config: {err}")))
    }
}

/// Issues typed commands to the engine.
#[derive(Clone, Debug, Default)]
pub struct Invoker {
    settings: InvokerSettings,
}

impl Invoker {
    /// Create an invoker with `settings`.
    #[must_use]
    pub const fn new(settings: InvokerSettings) -> Self { Self { settings } }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &InvokerSettings { &self.settings }

    /// Health probe.
    ///
    /// # Errors
    ///
    /// Propagates channel failures and [`EngineError::Deadline`].
    pub async fn ping(&self, channel: &dyn CommandChannel) -> Result<(), EngineError> {
        self.bounded(channel.ping()).await
    }

    /// Type-check `spec`; a successful reply lists the module declarations.
    ///
    /// # Errors
    ///
    /// Propagates channel failures and [`EngineError::Deadline`].
    pub async fn type_check(
        &self,
        channel: &dyn CommandChannel,
        spec: &str,
    ) -> Result<RunResponse, EngineError> {
        let config = EngineConfig::inline(spec, None).encode()?;
        self.run(channel, Command::Typecheck, config).await
    }

    /// Model-check `spec` against `invariant`, exploring at most
    /// `max_steps - 1` transitions.
    ///
    /// Each call draws a fresh solver seed.
    ///
    /// # Errors
    ///
    /// Propagates channel failures and [`EngineError::Deadline`].
    pub async fn model_check(
        &self,
        channel: &dyn CommandChannel,
        spec: &str,
        invariant: &str,
        max_steps: u32,
    ) -> Result<RunResponse, EngineError> {
        let checker = Checker::Check {
            inv: [invariant],
            length: max_steps.saturating_sub(1),
            tuning: Tuning {
                smt_timeout: self.settings.solver_timeout.as_secs().to_string(),
                random_seed: rand::random::<u32>().to_string(),
            },
        };
        let config = EngineConfig::inline(spec, Some(checker)).encode()?;
        self.run(channel, Command::Check, config).await
    }

    /// Simulate `spec`, requesting a bounded number of random traces.
    ///
    /// # Errors
    ///
    /// Propagates channel failures and [`EngineError::Deadline`].
    pub async fn simulate(
        &self,
        channel: &dyn CommandChannel,
        spec: &str,
    ) -> Result<RunResponse, EngineError> {
        let checker = Checker::Simulate {
            max_run: self.settings.simulate_max_runs,
            output_traces: true,
        };
        let config = EngineConfig::inline(spec, Some(checker)).encode()?;
        self.run(channel, Command::Simulate, config).await
    }

    async fn run(
        &self,
        channel: &dyn CommandChannel,
        command: Command,
        config: String,
    ) -> Result<RunResponse, EngineError> {
        debug!(%command, config_bytes = config.len(), "invoking engine");
        let response = self.bounded(channel.run(RunRequest { command, config })).await?;
        debug!(%command, success = response.is_success(), "engine replied");
        Ok(response)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let limit = self.settings.call_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| EngineError::Deadline(limit))?
    }
}
