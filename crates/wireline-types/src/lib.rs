//! Shared types, errors, and builder contracts for the Wireline engine.
//!
//! This crate provides the foundational types used across the other Wireline
//! crates:
//! - `WirelineError` — unified error taxonomy
//! - `AttrMap` — insertion-ordered connection attribute store
//! - `ParameterList` — ordered driver key/value output
//! - `DriverVersion` / `DriverDescriptor` — structured driver identity
//! - `BuilderKind` / `BuilderOutput` — the four builder contracts and their
//!   canonical output shapes

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unified error type for all Wireline subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WirelineError {
    // === Script errors ===
    #[error("Script syntax error at line {line}, col {col}: {message}")]
    ScriptSyntax {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Script runtime error: {message}")]
    ScriptRuntime { message: String },

    #[error("Sandbox violation: script referenced capability '{capability}'")]
    SandboxViolation { capability: String },

    #[error("Execution exceeded its budget of {limit}")]
    ExecutionTimeout { limit: ExecutionLimit },

    // === Harness errors ===
    #[error("Fixture '{fixture}' produced divergent output across identical runs")]
    NonDeterminism { fixture: String },

    // === Driver errors ===
    #[error("No installed driver matches vendor '{vendor}'")]
    DriverNotFound { vendor: String },

    // === Validation ===
    #[error("Builder validation failed: {0}")]
    Validation(String),

    // === Generic ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WirelineError {
    /// Returns `true` if the error indicates a defect in the builder source
    /// itself, i.e. something the connector author must fix.
    pub fn is_author_defect(&self) -> bool {
        matches!(
            self,
            WirelineError::ScriptSyntax { .. }
                | WirelineError::ScriptRuntime { .. }
                | WirelineError::SandboxViolation { .. }
                | WirelineError::Validation(_)
        )
    }

    /// Returns `true` if the error comes from an engine-imposed limit rather
    /// than the script's own logic.
    pub fn is_engine_limit(&self) -> bool {
        matches!(
            self,
            WirelineError::ExecutionTimeout { .. } | WirelineError::NonDeterminism { .. }
        )
    }
}

/// The bound an execution exceeded when it was cut off.
///
/// Script interpretation is metered in steps; the golden harness additionally
/// imposes a wall-clock ceiling per fixture. Both surface as
/// [`WirelineError::ExecutionTimeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionLimit {
    /// Interpreter step budget.
    Steps(u64),
    /// Wall-clock ceiling, in milliseconds.
    WallClockMs(u64),
}

impl std::fmt::Display for ExecutionLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionLimit::Steps(n) => write!(f, "{n} steps"),
            ExecutionLimit::WallClockMs(n) => write!(f, "{n} ms wall clock"),
        }
    }
}

/// A convenience alias for `Result<T, WirelineError>`.
pub type Result<T> = std::result::Result<T, WirelineError>;

// ---------------------------------------------------------------------------
// Well-known attribute keys
// ---------------------------------------------------------------------------

/// Canonical keys for the well-known connection attributes.
///
/// Builder scripts resolve these through `connectionHelper.attribute*`
/// constants rather than literal strings, so the canonical key can change
/// without touching every builder. The table is a pure lookup — resolution
/// never depends on attribute values.
pub mod attrs {
    pub const SERVER: &str = "server";
    pub const PORT: &str = "port";
    pub const DATABASE: &str = "dbname";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const AUTHENTICATION: &str = "authentication";
    pub const SSL_MODE: &str = "sslmode";
    pub const WAREHOUSE: &str = "warehouse";
    pub const SERVICE: &str = "service";
    pub const VENDOR1: &str = "vendor1";
    pub const VENDOR2: &str = "vendor2";
    pub const VENDOR3: &str = "vendor3";
    pub const SERVER_AUTH_MODE: &str = "server-auth-mode";
    pub const SERVER_AUTH_USER: &str = "server-auth-user";
    pub const INITIAL_SQL: &str = "initial-sql";
    pub const ODBC_EXTRAS: &str = "odbc-connect-string-extras";

    /// Value of [`SERVER_AUTH_MODE`] selecting server-side impersonation.
    pub const AUTH_MODE_DB_IMPERSONATE: &str = "auth-mode-db-impersonate";

    /// Symbolic constant names exposed to scripts, paired with their keys.
    pub const SYMBOLS: &[(&str, &str)] = &[
        ("attributeServer", SERVER),
        ("attributePort", PORT),
        ("attributeDatabase", DATABASE),
        ("attributeUsername", USERNAME),
        ("attributePassword", PASSWORD),
        ("attributeAuthentication", AUTHENTICATION),
        ("attributeSSLMode", SSL_MODE),
        ("attributeWarehouse", WAREHOUSE),
        ("attributeService", SERVICE),
        ("attributeVendor1", VENDOR1),
        ("attributeVendor2", VENDOR2),
        ("attributeVendor3", VENDOR3),
        ("attributeServerAuthMode", SERVER_AUTH_MODE),
        ("attributeServerUser", SERVER_AUTH_USER),
        ("attributeInitialSQL", INITIAL_SQL),
        ("attributeODBCConnectStringExtras", ODBC_EXTRAS),
    ];

    /// Resolve a symbolic constant name (e.g. `"attributeServer"`) to its
    /// canonical key.
    pub fn well_known_key(symbol: &str) -> Option<&'static str> {
        SYMBOLS
            .iter()
            .find(|(sym, _)| *sym == symbol)
            .map(|(_, key)| *key)
    }

    /// Returns `true` if `key` is the canonical key of a well-known attribute.
    pub fn is_well_known_key(key: &str) -> bool {
        SYMBOLS.iter().any(|(_, k)| *k == key)
    }

    /// Returns `true` if `key` follows the open vendor-custom namespace
    /// convention (`v-` prefix).
    pub fn is_vendor_custom(key: &str) -> bool {
        key.len() > 2 && key.starts_with("v-")
    }
}

// ---------------------------------------------------------------------------
// AttrMap — insertion-ordered connection attribute store
// ---------------------------------------------------------------------------

/// Insertion-ordered map of connection attributes.
///
/// A key that is present with an empty value is distinct from an unset key;
/// the matcher normalization collapses the two, but the store itself does not.
/// `Clone` produces a fully independent copy — each builder invocation gets
/// its own snapshot, so in-call mutation never escapes (copy-on-entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrMap {
    entries: indexmap::IndexMap<String, String>,
}

impl AttrMap {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an attribute. Overwriting keeps the original
    /// insertion position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Read an attribute. `None` means unset, which is not the same as
    /// present-and-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` if the key is set, even to an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttrMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = AttrMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// ParameterList — ordered driver key/value output
// ---------------------------------------------------------------------------

/// Ordered sequence of `(key, value)` driver-connection parameters.
///
/// Keys are not required to be unique: [`push`](ParameterList::push) appends
/// in order, while [`set`](ParameterList::set) applies last-wins layering
/// (fixed defaults overridden by vendor extras).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterList {
    pairs: Vec<(String, String)>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, keeping any earlier pair with the same key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Last-wins write: replaces the value of an existing key in place
    /// (keeping first-occurrence order), or appends when the key is new.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Value of the first pair with this key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = ParameterList::new();
        for (k, v) in iter {
            list.push(k, v);
        }
        list
    }
}

// ---------------------------------------------------------------------------
// DriverVersion / DriverDescriptor
// ---------------------------------------------------------------------------

/// Structured major.minor driver version.
///
/// Comparison is numeric on both components: `"10.0"` is greater than
/// `"8.0"`, which a lexicographic comparison would get wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriverVersion {
    pub major: u32,
    pub minor: u32,
}

impl DriverVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"8"`, `"8.0"`, or `"10.2"`. Trailing components beyond minor
    /// are rejected, as is anything non-numeric.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (major_str, minor_str) = match s.split_once('.') {
            Some((maj, min)) => (maj, Some(min)),
            None => (s, None),
        };
        let major: u32 = major_str
            .parse()
            .map_err(|_| WirelineError::Other(format!("invalid driver version '{s}'")))?;
        let minor: u32 = match minor_str {
            Some(min) => min
                .parse()
                .map_err(|_| WirelineError::Other(format!("invalid driver version '{s}'")))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }

    /// The single version-gating predicate exposed to builder logic.
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl std::fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Resolved identity of the database client library selected for a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDescriptor {
    pub name: String,
    pub version: Option<DriverVersion>,
}

// ---------------------------------------------------------------------------
// BuilderKind — the four builder contracts
// ---------------------------------------------------------------------------

/// The contract a builder unit implements. Fixed at authoring time, never
/// inferred from the script at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    ConnectionBuilder,
    ConnectionProperties,
    ConnectionRequired,
    ConnectionMatcher,
}

impl BuilderKind {
    /// Declared parameter count for a script of this kind.
    pub fn arity(&self) -> usize {
        match self {
            BuilderKind::ConnectionMatcher => 2,
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuilderKind::ConnectionBuilder => "connection_builder",
            BuilderKind::ConnectionProperties => "connection_properties",
            BuilderKind::ConnectionRequired => "connection_required",
            BuilderKind::ConnectionMatcher => "connection_matcher",
        }
    }
}

impl std::fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BuilderOutput — canonical output per contract kind
// ---------------------------------------------------------------------------

/// Canonical, typed output of one builder invocation.
///
/// The executor coerces the script's heterogeneous return shapes (map, list
/// of `key=value` strings, bare string) into exactly one of these variants,
/// keyed by the unit's declared [`BuilderKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderOutput {
    /// Ordered connection parameters (ConnectionBuilder or
    /// ConnectionProperties).
    Parameters(ParameterList),
    /// JDBC-style URL strings (ConnectionBuilder).
    Url(Vec<String>),
    /// Required attribute names; set semantics, order ignored.
    Required(BTreeSet<String>),
    /// Matcher verdict.
    Matched(bool),
}

impl BuilderOutput {
    /// The kind-family this output is valid for.
    pub fn describes(&self, kind: BuilderKind) -> bool {
        matches!(
            (self, kind),
            (BuilderOutput::Parameters(_), BuilderKind::ConnectionBuilder)
                | (BuilderOutput::Parameters(_), BuilderKind::ConnectionProperties)
                | (BuilderOutput::Url(_), BuilderKind::ConnectionBuilder)
                | (BuilderOutput::Required(_), BuilderKind::ConnectionRequired)
                | (BuilderOutput::Matched(_), BuilderKind::ConnectionMatcher)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
