//! Builder execution engine, helper capabilities, validation, and golden
//! harness.
//!
//! This crate implements the core Wireline runtime: the sandboxed script
//! executor with its injected capability bundle, the connection helper and
//! driver locator capabilities, the acceptance validator with its rule set,
//! and the concurrent golden-test harness.

pub mod driver;
pub mod events;
pub mod executor;
pub mod harness;
pub mod helper;
pub mod validator;

pub use driver::{attrs_for_vendor, DriverEntry, DriverRegistry, KEYWORD_DRIVER};
pub use events::{EventEmitter, RunEvent};
pub use executor::{BuilderUnit, ExecutionResult, Executor, ExecutorConfig};
pub use harness::{Expected, Fixture, FixtureOutcome, GoldenRunner, RunReport};
pub use helper::{
    format_key_value_pair, impersonation_attributes, mask_secrets,
    matches_connection_attributes, parse_odbc_connect_string,
};
pub use validator::{
    CheckRule, Finding, Severity, ValidationReport, Validator, ValidatorConfig, Verdict,
};
