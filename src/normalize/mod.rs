//! Normalisation of engine replies into the gateway's JSON contract.
//!
//! Engine payloads are decoded once here. Failure documents are classified
//! into a [`FailureReport`]; every rendered [`Verdict`] carries a provenance
//! line with the time it was produced.

pub mod invariants;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use invariants::{invariant_candidates, rank_invariant_candidates};

use crate::engine::RunResponse;

/// Pass name the engine uses for bounded model checking.
pub const BOUNDED_CHECKER_PASS: &str = "BoundedChecker";
/// Engine-internal key removed from every returned state.
pub const META_KEY: &str = "#meta";

const VERIFIED: &str = "Verified";
const VIOLATED: &str = "Violated";
const SIMULATED: &str = "Simulated";

/// Errors raised when an engine payload does not have the expected shape.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The payload was not valid JSON of the expected structure.
    #[error("malformed {what}: {source}")]
    Malformed {
        /// Which payload failed to parse.
        what: &'static str,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload parsed but was not a JSON object.
    #[error("{what} must be a JSON object")]
    NotAnObject {
        /// Which payload had the wrong shape.
        what: &'static str,
    },
}

/// Classified engine failure document.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureReport {
    /// A direct message, typically a parse or structural error.
    Message(String),
    /// An invariant violation with the first counterexample's states.
    Counterexample {
        /// States with engine metadata removed.
        states: Vec<Value>,
    },
    /// A named pass failed without a counterexample.
    PassError {
        /// Name of the failing pass.
        pass_name: String,
        /// Raw error payload, when present.
        error_data: Option<Value>,
    },
    /// A document of unrecognised shape, passed through verbatim.
    Unknown(Map<String, Value>),
}

impl FailureReport {
    /// Classify a JSON failure document.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] when `data` is not a JSON object.
    pub fn parse(data: &str) -> Result<Self, NormalizeError> {
        let value: Value = serde_json::from_str(data).map_err(|source| NormalizeError::Malformed {
            what: "failure payload",
            source,
        })?;
        match value {
            Value::Object(document) => Ok(Self::classify(document)),
            _ => Err(NormalizeError::NotAnObject {
                what: "failure payload",
            }),
        }
    }

    fn classify(mut document: Map<String, Value>) -> Self {
        if let Some(message) = document.get("msg").and_then(message_text) {
            return Self::Message(message);
        }
        let pass_name = document
            .get("pass_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned);
        let Some(pass_name) = pass_name else {
            return Self::Unknown(document);
        };
        let error_data = document.remove("error_data");
        if pass_name == BOUNDED_CHECKER_PASS {
            if let Some(states) = error_data.as_ref().and_then(first_counterexample) {
                return Self::Counterexample { states };
            }
        }
        Self::PassError {
            pass_name,
            error_data,
        }
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn first_counterexample(error_data: &Value) -> Option<Vec<Value>> {
    let states = error_data
        .get("counterexamples")?
        .as_array()?
        .first()?
        .get("states")?
        .as_array()?;
    Some(states.iter().cloned().map(strip_meta).collect())
}

fn strip_meta(mut state: Value) -> Value {
    if let Value::Object(fields) = &mut state {
        fields.remove(META_KEY);
    }
    state
}

/// Remove [`META_KEY`] from every state listed under a `states` array at any
/// depth of `value`.
pub fn strip_trace_meta(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields.iter_mut() {
                if key == "states" {
                    if let Value::Array(states) = child {
                        for state in states.iter_mut() {
                            if let Value::Object(state_fields) = state {
                                state_fields.remove(META_KEY);
                            }
                        }
                    }
                }
                strip_trace_meta(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_trace_meta),
        _ => {}
    }
}

/// Normalised reply for the verify and simulate routes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Verdict {
    /// Summary such as `Verified`, `Violated` or an engine message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// States of the first counterexample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Vec<Value>>,
    /// Raw error payload of a failing pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Simulation output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Step bound that was checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Fields passed through from an unrecognised failure document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Provenance line.
    pub description: String,
}

impl Verdict {
    fn from_failure(report: FailureReport, description: String) -> Self {
        match report {
            FailureReport::Message(message) => Self {
                result: Some(message),
                description,
                ..Self::default()
            },
            FailureReport::Counterexample { states } => Self {
                result: Some(VIOLATED.to_owned()),
                counterexample: Some(states),
                description,
                ..Self::default()
            },
            FailureReport::PassError {
                pass_name,
                error_data,
            } => Self {
                result: Some(format!("Error in {pass_name}")),
                error: error_data,
                description,
                ..Self::default()
            },
            FailureReport::Unknown(mut extra) => {
                extra.remove("description");
                Self {
                    extra,
                    description,
                    ..Self::default()
                }
            }
        }
    }
}

/// Provenance line stamped on every verdict.
#[must_use]
pub fn provenance(now: DateTime<Utc>) -> String {
    format!(
        "Created by Apalache on {}",
        now.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// Normalise a model-check reply; `max_steps` is the bound reported on
/// success.
///
/// # Errors
///
/// Returns [`NormalizeError`] for an unparseable failure document.
pub fn check_verdict(
    response: &RunResponse,
    max_steps: u32,
    now: DateTime<Utc>,
) -> Result<Verdict, NormalizeError> {
    let description = provenance(now);
    match response {
        RunResponse::Success { .. } => Ok(Verdict {
            result: Some(VERIFIED.to_owned()),
            length: Some(max_steps),
            description,
            ..Verdict::default()
        }),
        RunResponse::Failure { data, .. } => {
            FailureReport::parse(data).map(|report| Verdict::from_failure(report, description))
        }
    }
}

/// Normalise a simulation reply.
///
/// # Errors
///
/// Returns [`NormalizeError`] for an unparseable payload.
pub fn simulation_verdict(
    response: &RunResponse,
    now: DateTime<Utc>,
) -> Result<Verdict, NormalizeError> {
    let description = provenance(now);
    match response {
        RunResponse::Success { payload } => {
            let mut output: Value =
                serde_json::from_str(payload).map_err(|source| NormalizeError::Malformed {
                    what: "simulation payload",
                    source,
                })?;
            strip_trace_meta(&mut output);
            Ok(Verdict {
                result: Some(SIMULATED.to_owned()),
                output: Some(output),
                description,
                ..Verdict::default()
            })
        }
        RunResponse::Failure { data, .. } => {
            FailureReport::parse(data).map(|report| Verdict::from_failure(report, description))
        }
    }
}
