//! Golden-test harness.
//!
//! Runs a set of fixtures (builder source + inputs + expected output)
//! concurrently, one tokio task per fixture, and reports per-fixture
//! pass/fail with a line diff on mismatch. Every fixture is executed twice
//! against identical inputs; divergent output fails the fixture as
//! nondeterministic regardless of what was expected.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use wireline_types::{AttrMap, BuilderKind, BuilderOutput, ExecutionLimit, Result, WirelineError};

use crate::events::{EventEmitter, RunEvent};
use crate::executor::{BuilderUnit, ExecutionResult, Executor};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// What a fixture expects: a concrete output, or a failure whose rendered
/// error message contains the given text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    Output(BuilderOutput),
    Failure { message_contains: String },
}

/// One golden fixture. Identity is the `name`; two fixtures with the same
/// name in one run are a configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub name: String,
    pub kind: BuilderKind,
    pub source: String,
    pub inputs: Vec<AttrMap>,
    pub expected: Expected,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn unit(&self) -> BuilderUnit {
        BuilderUnit::new(self.name.clone(), self.kind, self.source.clone())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureOutcome {
    pub fixture: String,
    pub passed: bool,
    pub duration_ms: u64,
    /// Diff or error text when the fixture failed.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub passed: usize,
    pub failed: usize,
    pub outcomes: Vec<FixtureOutcome>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Output rendering and diff
// ---------------------------------------------------------------------------

/// Render an output as stable text lines for diffing.
fn render_output(output: &BuilderOutput) -> Vec<String> {
    match output {
        BuilderOutput::Parameters(params) => params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect(),
        BuilderOutput::Url(urls) => urls.clone(),
        BuilderOutput::Required(names) => names.iter().cloned().collect(),
        BuilderOutput::Matched(matched) => vec![format!("matched: {matched}")],
    }
}

/// Minimal line diff: expected lines prefixed `-`, actual lines prefixed
/// `+`, unchanged lines prefixed with two spaces.
fn diff_lines(expected: &[String], actual: &[String]) -> String {
    let mut out = Vec::new();
    let max = expected.len().max(actual.len());
    for i in 0..max {
        match (expected.get(i), actual.get(i)) {
            (Some(e), Some(a)) if e == a => out.push(format!("  {e}")),
            (Some(e), Some(a)) => {
                out.push(format!("- {e}"));
                out.push(format!("+ {a}"));
            }
            (Some(e), None) => out.push(format!("- {e}")),
            (None, Some(a)) => out.push(format!("+ {a}")),
            (None, None) => unreachable!(),
        }
    }
    out.join("\n")
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs golden fixtures through the executor.
#[derive(Clone)]
pub struct GoldenRunner {
    executor: Executor,
    emitter: EventEmitter,
    /// Wall-clock ceiling per fixture, on top of the executor's step budget.
    timeout: Duration,
}

impl GoldenRunner {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            emitter: EventEmitter::default(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Run every fixture concurrently and collect a report. Outcomes are
    /// ordered by fixture name so a report is stable across runs.
    pub async fn run(&self, fixtures: Vec<Fixture>) -> RunReport {
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        self.emitter.emit(RunEvent::RunStarted {
            fixture_count: fixtures.len(),
        });

        let mut set = JoinSet::new();
        for fixture in fixtures {
            let executor = self.executor.clone();
            let emitter = self.emitter.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let name = fixture.name.clone();
                emitter.emit(RunEvent::FixtureStarted {
                    fixture: name.clone(),
                    kind: fixture.kind.to_string(),
                });
                let fixture_start = std::time::Instant::now();
                let verdict = tokio::time::timeout(
                    timeout,
                    tokio::task::spawn_blocking(move || check_fixture(&executor, &fixture)),
                )
                .await;
                let duration_ms = fixture_start.elapsed().as_millis() as u64;
                let detail = match verdict {
                    Ok(Ok(detail)) => detail,
                    Ok(Err(join_err)) => Some(format!("task failed: {join_err}")),
                    Err(_) => {
                        let err = WirelineError::ExecutionTimeout {
                            limit: ExecutionLimit::WallClockMs(timeout.as_millis() as u64),
                        };
                        Some(err.to_string())
                    }
                };
                match &detail {
                    None => emitter.emit(RunEvent::FixturePassed {
                        fixture: name.clone(),
                        duration_ms,
                    }),
                    Some(reason) => emitter.emit(RunEvent::FixtureFailed {
                        fixture: name.clone(),
                        reason: reason.clone(),
                    }),
                }
                FixtureOutcome {
                    fixture: name,
                    passed: detail.is_none(),
                    duration_ms,
                    detail,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    warn!(error = %join_err, "fixture task panicked");
                    outcomes.push(FixtureOutcome {
                        fixture: "<unknown>".to_string(),
                        passed: false,
                        duration_ms: 0,
                        detail: Some(format!("task panicked: {join_err}")),
                    });
                }
            }
        }
        outcomes.sort_by(|a, b| a.fixture.cmp(&b.fixture));

        let passed = outcomes.iter().filter(|o| o.passed).count();
        let failed = outcomes.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;
        self.emitter.emit(RunEvent::RunCompleted {
            passed,
            failed,
            duration_ms,
        });
        info!(passed, failed, duration_ms, "golden run completed");

        RunReport {
            started_at,
            duration_ms,
            passed,
            failed,
            outcomes,
        }
    }
}

/// Execute one fixture twice and judge the pair of results. Returns `None`
/// on pass or a failure description.
fn check_fixture(executor: &Executor, fixture: &Fixture) -> Option<String> {
    let unit = fixture.unit();
    let first = executor.invoke(&unit, &fixture.inputs);
    let second = executor.invoke(&unit, &fixture.inputs);
    judge_fixture(fixture, first, second)
}

fn judge_fixture(
    fixture: &Fixture,
    first: Result<ExecutionResult>,
    second: Result<ExecutionResult>,
) -> Option<String> {
    // A fixture whose expectation could never be produced by its declared
    // kind is a configuration error, not a script failure.
    if let Expected::Output(expected) = &fixture.expected {
        if !expected.describes(fixture.kind) {
            return Some(format!(
                "expected output shape does not fit a {} fixture",
                fixture.kind
            ));
        }
    }

    // Determinism gate: identical inputs must produce identical results,
    // success or failure alike.
    let diverged = match (&first, &second) {
        (Ok(a), Ok(b)) => a.output != b.output,
        (Err(a), Err(b)) => a.to_string() != b.to_string(),
        _ => true,
    };
    if diverged {
        let err = WirelineError::NonDeterminism {
            fixture: fixture.name.clone(),
        };
        return Some(err.to_string());
    }

    let detail = match (&fixture.expected, first) {
        (Expected::Output(expected), Ok(result)) => {
            if result.output == *expected {
                None
            } else {
                let diff = diff_lines(
                    &render_output(expected),
                    &render_output(&result.output),
                );
                Some(format!("output mismatch:\n{diff}"))
            }
        }
        (Expected::Output(_), Err(err)) => Some(format!("execution failed: {err}")),
        (Expected::Failure { message_contains }, Err(err)) => {
            let rendered = err.to_string();
            if rendered.contains(message_contains.as_str()) {
                None
            } else {
                Some(format!(
                    "expected failure containing \"{message_contains}\", got: {rendered}"
                ))
            }
        }
        (Expected::Failure { message_contains }, Ok(result)) => Some(format!(
            "expected failure containing \"{message_contains}\", but execution succeeded with {:?}",
            result.output
        )),
    };
    detail
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
