//! Acceptance validation for builder units.
//!
//! Runs every check rule against a unit and aggregates the findings into a
//! single report, fail-slow: one pass surfaces everything wrong, not just
//! the first defect. Static rules inspect the AST; behavioral rules invoke
//! the unit against sample inputs through the sandboxed executor.

use std::collections::BTreeSet;

use tracing::debug;

use wireline_script::{Expr, LValue, Script, Stmt};
use wireline_types::{attrs, AttrMap, BuilderKind, BuilderOutput, Result, WirelineError};

use crate::driver::attrs_for_vendor;
use crate::executor::{BuilderUnit, Executor};

// ---------------------------------------------------------------------------
// Findings and verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One problem reported by one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn error(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    AcceptedWithWarnings,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub unit: String,
    pub kind: BuilderKind,
    pub findings: Vec<Finding>,
    pub verdict: Verdict,
}

impl ValidationReport {
    fn from_findings(unit: &BuilderUnit, findings: Vec<Finding>) -> Self {
        let verdict = if findings.iter().any(|f| f.severity == Severity::Error) {
            Verdict::Rejected
        } else if findings.is_empty() {
            Verdict::Accepted
        } else {
            Verdict::AcceptedWithWarnings
        };
        Self {
            unit: unit.name.clone(),
            kind: unit.kind,
            findings,
            verdict,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }
}

// ---------------------------------------------------------------------------
// Rule plumbing
// ---------------------------------------------------------------------------

/// Validator knobs: vendor-declared attribute names (accepted by the
/// required-names rule alongside well-known and `v-` keys) and the sample
/// attribute maps behavioral rules execute against.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub vendor_keys: BTreeSet<String>,
    pub sample_inputs: Vec<AttrMap>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            vendor_keys: BTreeSet::new(),
            sample_inputs: vec![
                attrs_for_vendor(
                    "postgres",
                    &[
                        ("server", "validator-host-a"),
                        ("port", "5432"),
                        ("dbname", "sample"),
                        ("username", "checker"),
                        ("password", "hunter2"),
                        ("authentication", "auth-user-pass"),
                        ("sslmode", ""),
                        ("odbc-connect-string-extras", ""),
                    ],
                ),
                attrs_for_vendor(
                    "postgres",
                    &[
                        ("server", "validator-host-b"),
                        ("port", "5433"),
                        ("dbname", "sample"),
                        ("username", "checker"),
                        ("password", "hunter2"),
                        ("authentication", "auth-user-pass"),
                    ],
                ),
            ],
        }
    }
}

pub struct CheckContext<'a> {
    pub unit: &'a BuilderUnit,
    pub script: &'a Script,
    pub executor: &'a Executor,
    pub config: &'a ValidatorConfig,
}

impl CheckContext<'_> {
    /// Invoke the unit against the configured sample inputs, arity-sliced.
    fn run_sample(&self) -> Result<BuilderOutput> {
        let arity = self.unit.kind.arity();
        let inputs = self.config.sample_inputs.get(..arity).ok_or_else(|| {
            WirelineError::Other(format!(
                "validator config provides {} sample input(s), need {arity}",
                self.config.sample_inputs.len()
            ))
        })?;
        Ok(self.executor.invoke(self.unit, inputs)?.output)
    }
}

/// One acceptance check. Rules never abort the pass; they report findings
/// and the validator aggregates.
pub trait CheckRule {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding>;
}

// ---------------------------------------------------------------------------
// AST walking helpers
// ---------------------------------------------------------------------------

fn walk_exprs(stmts: &[Stmt], visit: &mut impl FnMut(&Expr)) {
    fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
        visit(expr);
        match expr {
            Expr::ListLit(items) => {
                for item in items {
                    walk_expr(item, visit);
                }
            }
            Expr::Index { object, index } => {
                walk_expr(object, visit);
                walk_expr(index, visit);
            }
            Expr::Member { object, .. } => walk_expr(object, visit),
            Expr::Call { callee, args } => {
                walk_expr(callee, visit);
                for arg in args {
                    walk_expr(arg, visit);
                }
            }
            Expr::Unary { operand, .. } => walk_expr(operand, visit),
            Expr::Binary { left, right, .. } => {
                walk_expr(left, visit);
                walk_expr(right, visit);
            }
            _ => {}
        }
    }

    for stmt in stmts {
        match stmt {
            Stmt::Var { init, .. } => {
                if let Some(init) = init {
                    walk_expr(init, visit);
                }
            }
            Stmt::Assign { target, value } => {
                if let LValue::Index { object, index } = target {
                    walk_expr(object, visit);
                    walk_expr(index, visit);
                }
                walk_expr(value, visit);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                walk_expr(cond, visit);
                walk_exprs(then, visit);
                walk_exprs(otherwise, visit);
            }
            Stmt::ForIn { subject, body, .. } => {
                walk_expr(subject, visit);
                walk_exprs(body, visit);
            }
            Stmt::Return(expr) | Stmt::Expr(expr) => walk_expr(expr, visit),
        }
    }
}

/// Collect the names every assignment statement writes through (directly or
/// via an index), recursively.
fn assignment_targets(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => match target {
                LValue::Ident(name) => out.push(name.clone()),
                LValue::Index { object, .. } => {
                    if let Expr::Ident(name) = object.as_ref() {
                        out.push(name.clone());
                    }
                }
            },
            Stmt::If {
                then, otherwise, ..
            } => {
                assignment_targets(then, out);
                assignment_targets(otherwise, out);
            }
            Stmt::ForIn { body, .. } => assignment_targets(body, out),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Parameter count must match the declared kind.
struct FunctionShape;

impl CheckRule for FunctionShape {
    fn name(&self) -> &'static str {
        "function_shape"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        match wireline_script::check_arity(ctx.script, ctx.unit.kind) {
            Ok(()) => Vec::new(),
            Err(err) => vec![Finding::error(self.name(), err.to_string())],
        }
    }
}

/// Every identifier must resolve to a parameter, a declared variable, or an
/// injected capability. Catches the classic stray-global defect.
struct UnresolvedReferences;

impl CheckRule for UnresolvedReferences {
    fn name(&self) -> &'static str {
        "unresolved_references"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        wireline_script::free_variables(ctx.script)
            .into_iter()
            .map(|name| {
                Finding::error(
                    self.name(),
                    format!("'{name}' is not a parameter, declared variable, or capability"),
                )
            })
            .collect()
    }
}

/// Indexing an attribute map with the literal canonical key instead of the
/// symbolic constant. Works today, breaks silently if the key is renamed.
struct LiteralWellKnownKey;

impl CheckRule for LiteralWellKnownKey {
    fn name(&self) -> &'static str {
        "literal_well_known_key"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        walk_exprs(&ctx.script.body, &mut |expr| {
            if let Expr::Index { index, .. } = expr {
                if let Expr::Str(key) = index.as_ref() {
                    if let Some((symbol, _)) =
                        attrs::SYMBOLS.iter().find(|(_, k)| k == key)
                    {
                        findings.push(Finding::warning(
                            self.name(),
                            format!(
                                "literal key \"{key}\"; prefer connectionHelper.{symbol}"
                            ),
                        ));
                    }
                }
            }
        });
        findings
    }
}

/// A matcher must be a pure predicate over its inputs. Any write through a
/// parameter is an escape-shaped bug even though copies keep it contained.
struct MatcherMutatesInput;

impl CheckRule for MatcherMutatesInput {
    fn name(&self) -> &'static str {
        "matcher_mutates_input"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        if ctx.unit.kind != BuilderKind::ConnectionMatcher {
            return Vec::new();
        }
        let mut targets = Vec::new();
        assignment_targets(&ctx.script.body, &mut targets);
        targets
            .into_iter()
            .filter(|name| ctx.script.params.contains(name))
            .map(|name| {
                Finding::error(
                    self.name(),
                    format!("matcher writes to its input parameter '{name}'"),
                )
            })
            .collect()
    }
}

/// Execute against the sample inputs; parameter outputs must not carry an
/// empty key, and runtime failures on well-formed samples are defects.
struct OutputKeysNonEmpty;

impl CheckRule for OutputKeysNonEmpty {
    fn name(&self) -> &'static str {
        "output_keys_non_empty"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        match ctx.run_sample() {
            Ok(BuilderOutput::Parameters(params)) => params
                .iter()
                .filter(|(k, _)| k.is_empty())
                .map(|(_, v)| {
                    Finding::error(self.name(), format!("empty parameter key (value \"{v}\")"))
                })
                .collect(),
            Ok(_) => Vec::new(),
            Err(err) => vec![Finding::error(
                self.name(),
                format!("execution against sample input failed: {err}"),
            )],
        }
    }
}

/// Duplicate keys in a formatted parameter list. Driver managers disagree on
/// first-wins versus last-wins, so the output is ambiguous.
struct AmbiguousDuplicateKey;

impl CheckRule for AmbiguousDuplicateKey {
    fn name(&self) -> &'static str {
        "ambiguous_duplicate_key"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let Ok(BuilderOutput::Parameters(params)) = ctx.run_sample() else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut findings = Vec::new();
        for (key, _) in params.iter() {
            if !seen.insert(key.to_string()) {
                findings.push(Finding::warning(
                    self.name(),
                    format!("parameter key '{key}' appears more than once"),
                ));
            }
        }
        findings
    }
}

/// Names returned by a required-attributes builder must be well-known,
/// vendor-custom (`v-` prefixed), or declared in the validator config.
struct RequiredNamesKnown;

impl CheckRule for RequiredNamesKnown {
    fn name(&self) -> &'static str {
        "required_names_known"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        if ctx.unit.kind != BuilderKind::ConnectionRequired {
            return Vec::new();
        }
        let Ok(BuilderOutput::Required(names)) = ctx.run_sample() else {
            return Vec::new();
        };
        names
            .into_iter()
            .filter(|name| {
                !attrs::is_well_known_key(name)
                    && !attrs::is_vendor_custom(name)
                    && !ctx.config.vendor_keys.contains(name)
            })
            .map(|name| {
                Finding::error(
                    self.name(),
                    format!("required attribute '{name}' is not a known attribute name"),
                )
            })
            .collect()
    }
}

/// Matchers must behave like an equivalence check over the samples: a map
/// matches itself, and the verdict is independent of argument order.
struct MatcherAlgebra;

impl CheckRule for MatcherAlgebra {
    fn name(&self) -> &'static str {
        "matcher_algebra"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        if ctx.unit.kind != BuilderKind::ConnectionMatcher {
            return Vec::new();
        }
        let [a, b, ..] = &ctx.config.sample_inputs[..] else {
            return Vec::new();
        };
        let mut findings = Vec::new();

        match ctx.executor.invoke_pair(ctx.unit, a, a) {
            Ok(result) if result.output != BuilderOutput::Matched(true) => {
                findings.push(Finding::error(
                    self.name(),
                    "matcher does not match an attribute map against itself",
                ));
            }
            Ok(_) => {}
            Err(err) => {
                findings.push(Finding::error(
                    self.name(),
                    format!("matcher failed on sample input: {err}"),
                ));
                return findings;
            }
        }

        let forward = ctx.executor.invoke_pair(ctx.unit, a, b);
        let backward = ctx.executor.invoke_pair(ctx.unit, b, a);
        if let (Ok(fwd), Ok(bwd)) = (forward, backward) {
            if fwd.output != bwd.output {
                findings.push(Finding::error(
                    self.name(),
                    "matcher verdict depends on argument order",
                ));
            }
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Runs the full rule set over a builder unit.
pub struct Validator {
    executor: Executor,
    config: ValidatorConfig,
    rules: Vec<Box<dyn CheckRule>>,
}

impl Validator {
    pub fn new(executor: Executor) -> Self {
        Self::with_config(executor, ValidatorConfig::default())
    }

    pub fn with_config(executor: Executor, config: ValidatorConfig) -> Self {
        Self {
            executor,
            config,
            rules: vec![
                Box::new(FunctionShape),
                Box::new(UnresolvedReferences),
                Box::new(LiteralWellKnownKey),
                Box::new(MatcherMutatesInput),
                Box::new(OutputKeysNonEmpty),
                Box::new(AmbiguousDuplicateKey),
                Box::new(RequiredNamesKnown),
                Box::new(MatcherAlgebra),
            ],
        }
    }

    /// Run every rule and aggregate. A source that does not parse yields a
    /// single syntax finding and rejection; no other rule can run without
    /// an AST.
    pub fn validate(&self, unit: &BuilderUnit) -> ValidationReport {
        let script = match wireline_script::parse(&unit.source) {
            Ok(script) => script,
            Err(err) => {
                return ValidationReport::from_findings(
                    unit,
                    vec![Finding::error("source_parses", err.to_string())],
                );
            }
        };

        let ctx = CheckContext {
            unit,
            script: &script,
            executor: &self.executor,
            config: &self.config,
        };
        let mut findings = Vec::new();
        for rule in &self.rules {
            let mut found = rule.check(&ctx);
            debug!(unit = %unit.name, rule = rule.name(), findings = found.len(), "rule checked");
            findings.append(&mut found);
        }
        ValidationReport::from_findings(unit, findings)
    }

    /// Validate and convert rejection into an error carrying every
    /// error-severity message.
    pub fn validate_or_raise(&self, unit: &BuilderUnit) -> Result<ValidationReport> {
        let report = self.validate(unit);
        if report.verdict == Verdict::Rejected {
            let messages: Vec<String> = report
                .errors()
                .map(|f| format!("[{}] {}", f.rule, f.message))
                .collect();
            return Err(WirelineError::Validation(messages.join("; ")));
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverRegistry;

    fn validator() -> Validator {
        Validator::new(Executor::with_drivers(DriverRegistry::sample()))
    }

    fn unit(kind: BuilderKind, source: &str) -> BuilderUnit {
        BuilderUnit::new("unit-under-test", kind, source)
    }

    #[test]
    fn clean_builder_is_accepted() {
        let source = r#"(function dsbuilder(attr)
        {
            var formattedParams = [];
            formattedParams.push(connectionHelper.formatKeyValuePair(driverLocator.keywordDriver, driverLocator.locateDriver(attr)));
            formattedParams.push(connectionHelper.formatKeyValuePair("SERVER", attr[connectionHelper.attributeServer]));
            return formattedParams;
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::Accepted, "{:?}", report.findings);
    }

    #[test]
    fn syntax_error_rejects_with_single_finding() {
        let source = r#"(function dsbuilder(attr) {
            var params = {};
            params["PORT"] = attr[[connectionHelper.attributePort];
            return [];
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].rule, "source_parses");
        assert!(report.findings[0].message.contains("line 3"));
    }

    #[test]
    fn unresolved_reference_rejects() {
        let source = r#"(function dsbuilder(attr)
        {
            if (serverUser == "admin")
                return ["MODE=privileged"];
            return ["MODE=normal"];
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report
            .errors()
            .any(|f| f.rule == "unresolved_references" && f.message.contains("serverUser")));
    }

    #[test]
    fn literal_key_warns_but_accepts() {
        let source = r#"(function dsbuilder(attr)
        {
            return ["SERVER=" + attr["server"]];
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::AcceptedWithWarnings);
        assert!(report
            .warnings()
            .any(|f| f.rule == "literal_well_known_key"
                && f.message.contains("attributeServer")));
    }

    #[test]
    fn matcher_mutation_rejects() {
        let source = r#"(function matcher(attr1, attr2)
        {
            if (attr2[connectionHelper.attributeAuthentication] == undefined)
                attr2[connectionHelper.attributeAuthentication] = "auth-user-pass";
            return connectionHelper.MatchesConnectionAttributes(attr1, attr2);
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionMatcher, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report
            .errors()
            .any(|f| f.rule == "matcher_mutates_input" && f.message.contains("attr2")));
    }

    #[test]
    fn arity_mismatch_rejects() {
        let source = r#"(function matcher(attr1)
        {
            return true;
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionMatcher, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report.errors().any(|f| f.rule == "function_shape"));
    }

    #[test]
    fn unknown_required_name_rejects() {
        let source = r#"(function requiredAttrs(attr)
        {
            return [connectionHelper.attributeServer, "favorite-color"];
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionRequired, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report
            .errors()
            .any(|f| f.rule == "required_names_known" && f.message.contains("favorite-color")));
    }

    #[test]
    fn vendor_custom_and_declared_names_pass() {
        let source = r#"(function requiredAttrs(attr)
        {
            return [connectionHelper.attributeServer, "v-custom-flag", "project"];
        })"#;
        let mut config = ValidatorConfig::default();
        config.vendor_keys.insert("project".to_string());
        let validator =
            Validator::with_config(Executor::with_drivers(DriverRegistry::sample()), config);
        let report = validator.validate(&unit(BuilderKind::ConnectionRequired, source));
        assert_eq!(report.verdict, Verdict::Accepted, "{:?}", report.findings);
    }

    #[test]
    fn duplicate_key_warns() {
        let source = r#"(function dsbuilder(attr)
        {
            var formattedParams = [];
            formattedParams.push(connectionHelper.formatKeyValuePair("SSLmode", "require"));
            formattedParams.push(connectionHelper.formatKeyValuePair("SSLmode", "prefer"));
            return formattedParams;
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::AcceptedWithWarnings);
        assert!(report
            .warnings()
            .any(|f| f.rule == "ambiguous_duplicate_key" && f.message.contains("SSLmode")));
    }

    #[test]
    fn runtime_failure_on_sample_rejects() {
        let source = r#"(function dsbuilder(attr)
        {
            var list;
            list.push("SERVER=" + attr[connectionHelper.attributeServer]);
            return list;
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionBuilder, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report.errors().any(|f| f.rule == "output_keys_non_empty"));
    }

    #[test]
    fn asymmetric_matcher_rejects() {
        // Matches only when the first map's server is host-a.
        let source = r#"(function matcher(attr1, attr2)
        {
            if (attr1[connectionHelper.attributeServer] == "validator-host-a")
                return true;
            return false;
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionMatcher, source));
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report
            .errors()
            .any(|f| f.rule == "matcher_algebra" && f.message.contains("argument order")));
    }

    #[test]
    fn symmetric_matcher_is_accepted() {
        let source = r#"(function matcher(attr1, attr2)
        {
            return connectionHelper.MatchesConnectionAttributes(attr1, attr2);
        })"#;
        let report = validator().validate(&unit(BuilderKind::ConnectionMatcher, source));
        assert_eq!(report.verdict, Verdict::Accepted, "{:?}", report.findings);
    }

    #[test]
    fn validate_or_raise_carries_rule_names() {
        let source = r#"(function dsbuilder(attr)
        {
            if (product == "cloud") { return ["a=1"]; }
            return ["b=2"];
        })"#;
        let err = validator()
            .validate_or_raise(&unit(BuilderKind::ConnectionBuilder, source))
            .unwrap_err();
        match err {
            WirelineError::Validation(message) => {
                assert!(message.contains("unresolved_references"), "got: {message}")
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
