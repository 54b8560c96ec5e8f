//! Script sandbox and executor.
//!
//! Runs one parsed builder unit against role-appropriate inputs and coerces
//! the script's return value into the canonical [`BuilderOutput`] for its
//! declared kind.
//!
//! Capabilities are injected, never ambient: the interpreter resolves
//! `connectionHelper`, `driverLocator`, and `logging` from an explicit
//! bundle built per invocation. The language itself has no I/O constructs,
//! so the only reachable effects are captured log lines; referencing any
//! capability outside the bundle fails with `SandboxViolation`. Every input
//! attribute map is cloned on entry, so in-call mutation never escapes.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::debug;

use wireline_script::{BinaryOp, Expr, LValue, Script, Stmt, UnaryOp};
use wireline_types::{
    attrs, AttrMap, BuilderKind, BuilderOutput, ExecutionLimit, ParameterList, Result,
    WirelineError,
};

use crate::driver::{DriverRegistry, KEYWORD_DRIVER};
use crate::helper;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One builder unit: a named script implementing exactly one contract kind.
/// The kind is declared at authoring time, never inferred from the source.
#[derive(Debug, Clone)]
pub struct BuilderUnit {
    pub name: String,
    pub kind: BuilderKind,
    pub source: String,
}

impl BuilderUnit {
    pub fn new(name: impl Into<String>, kind: BuilderKind, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            source: source.into(),
        }
    }

    /// Parse the source and check its arity against the declared kind.
    pub fn compile(&self) -> Result<Script> {
        let script = wireline_script::parse(&self.source)?;
        wireline_script::check_arity(&script, self.kind)?;
        Ok(script)
    }
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Evaluation step budget per invocation. Exhaustion reports
    /// `ExecutionTimeout`; a deterministic bound on looping scripts.
    pub fuel: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { fuel: 100_000 }
    }
}

/// Output of a successful invocation: the canonical typed result plus the
/// captured (secret-masked) log lines.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: BuilderOutput,
    pub logs: Vec<String>,
}

/// The executor. Owns the driver registry and the step budget; stateless
/// across invocations, so one executor can serve many concurrent tasks.
#[derive(Debug, Clone)]
pub struct Executor {
    drivers: DriverRegistry,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(drivers: DriverRegistry, config: ExecutorConfig) -> Self {
        Self { drivers, config }
    }

    pub fn with_drivers(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            config: ExecutorConfig::default(),
        }
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Invoke a builder unit against its inputs (one attribute map, or two
    /// for a matcher). Each input is cloned on entry; any failure aborts the
    /// invocation with no partial output.
    pub fn invoke(&self, unit: &BuilderUnit, inputs: &[AttrMap]) -> Result<ExecutionResult> {
        let script = unit.compile()?;
        if inputs.len() != unit.kind.arity() {
            return Err(WirelineError::Other(format!(
                "{} unit '{}' invoked with {} input(s), expected {}",
                unit.kind,
                unit.name,
                inputs.len(),
                unit.kind.arity()
            )));
        }
        debug!(unit = %unit.name, kind = %unit.kind, "invoking builder unit");

        let mut interp = Interp::new(&self.drivers, inputs, self.config.fuel);
        interp.bind_params(&script, inputs);
        let returned = interp.run_body(&script.body)?;
        let output = coerce_output(unit.kind, returned)?;
        Ok(ExecutionResult {
            output,
            logs: interp.logs,
        })
    }

    /// Single-map convenience for the three unary kinds.
    pub fn invoke_one(&self, unit: &BuilderUnit, attr: &AttrMap) -> Result<ExecutionResult> {
        self.invoke(unit, std::slice::from_ref(attr))
    }

    /// Matcher convenience.
    pub fn invoke_pair(
        &self,
        unit: &BuilderUnit,
        a: &AttrMap,
        b: &AttrMap,
    ) -> Result<ExecutionResult> {
        self.invoke(unit, &[a.clone(), b.clone()])
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Runtime value. Maps preserve insertion order; `Unset` is the value of an
/// absent attribute and of the `undefined` literal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Unset,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Unset => "undefined",
        }
    }
}

fn attr_map_to_value(attr: &AttrMap) -> Value {
    let mut map = IndexMap::new();
    for (k, v) in attr.iter() {
        map.insert(k.to_string(), Value::Str(v.to_string()));
    }
    Value::Map(map)
}

fn value_to_attr_map(value: &Value) -> Result<AttrMap> {
    let Value::Map(map) = value else {
        return Err(runtime(format!(
            "expected an attribute map, got {}",
            value.type_name()
        )));
    };
    let mut attr = AttrMap::new();
    for (k, v) in map {
        match v {
            Value::Str(s) => attr.set(k, s.clone()),
            Value::Unset => {}
            other => {
                return Err(runtime(format!(
                    "attribute '{k}' holds a {}, expected a string",
                    other.type_name()
                )))
            }
        }
    }
    Ok(attr)
}

fn runtime(message: impl Into<String>) -> WirelineError {
    WirelineError::ScriptRuntime {
        message: message.into(),
    }
}

fn violation(capability: impl Into<String>) -> WirelineError {
    WirelineError::SandboxViolation {
        capability: capability.into(),
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

enum Flow {
    Normal,
    Returned(Value),
}

struct Interp<'a> {
    drivers: &'a DriverRegistry,
    /// Secrets from every input map; used to mask captured log lines.
    secret_source: AttrMap,
    locals: IndexMap<String, Value>,
    logs: Vec<String>,
    fuel: u64,
    budget: u64,
}

impl<'a> Interp<'a> {
    fn new(drivers: &'a DriverRegistry, inputs: &[AttrMap], fuel: u64) -> Self {
        let mut secret_source = AttrMap::new();
        for input in inputs {
            for (k, v) in input.iter() {
                secret_source.set(k, v);
            }
        }
        Self {
            drivers,
            secret_source,
            locals: IndexMap::new(),
            logs: Vec::new(),
            fuel,
            budget: fuel,
        }
    }

    /// Bind parameters to independent copies of the inputs and hoist every
    /// `var` declaration to function scope, initialised to undefined.
    fn bind_params(&mut self, script: &Script, inputs: &[AttrMap]) {
        for (param, input) in script.params.iter().zip(inputs) {
            self.locals.insert(param.clone(), attr_map_to_value(input));
        }
        hoist_vars(&script.body, &mut self.locals);
    }

    fn burn(&mut self) -> Result<()> {
        if self.fuel == 0 {
            return Err(WirelineError::ExecutionTimeout {
                limit: ExecutionLimit::Steps(self.budget),
            });
        }
        self.fuel -= 1;
        Ok(())
    }

    fn run_body(&mut self, body: &[Stmt]) -> Result<Value> {
        match self.run_block(body)? {
            Flow::Returned(value) => Ok(value),
            Flow::Normal => Err(runtime("builder function ended without returning a value")),
        }
    }

    fn run_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Returned(value) = self.run_stmt(stmt)? {
                return Ok(Flow::Returned(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn run_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.burn()?;
        match stmt {
            Stmt::Var { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Unset,
                };
                self.locals.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_bool(cond)? {
                    self.run_block(then)
                } else {
                    self.run_block(otherwise)
                }
            }
            Stmt::ForIn { var, subject, body } => {
                let map = match self.eval(subject)? {
                    Value::Map(map) => map,
                    other => {
                        return Err(runtime(format!(
                            "for..in expects a map, got {}",
                            other.type_name()
                        )))
                    }
                };
                // Iterate over a key snapshot; insertion order, deterministic.
                let keys: Vec<String> = map.keys().cloned().collect();
                for key in keys {
                    self.burn()?;
                    self.locals.insert(var.clone(), Value::Str(key));
                    if let Flow::Returned(value) = self.run_block(body)? {
                        return Ok(Flow::Returned(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = self.eval(expr)?;
                Ok(Flow::Returned(value))
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn assign(&mut self, target: &LValue, value: Value) -> Result<()> {
        match target {
            LValue::Ident(name) => {
                if !self.locals.contains_key(name) {
                    return Err(runtime(format!("unresolved reference '{name}'")));
                }
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            LValue::Index { object, index } => {
                let key = match self.eval(index)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(runtime(format!(
                            "map key must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                let Expr::Ident(name) = object.as_ref() else {
                    return Err(runtime("indexed assignment target must be a variable"));
                };
                match self.locals.get_mut(name) {
                    Some(Value::Map(map)) => {
                        map.insert(key, value);
                        Ok(())
                    }
                    Some(Value::Unset) => Err(runtime(format!(
                        "cannot index undefined value '{name}'"
                    ))),
                    Some(other) => Err(runtime(format!(
                        "cannot index a {} with a key",
                        other.type_name()
                    ))),
                    None => Err(runtime(format!("unresolved reference '{name}'"))),
                }
            }
        }
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(runtime(format!(
                "condition must be a bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        self.burn()?;
        match expr {
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Undefined => Ok(Value::Unset),
            Expr::MapLit => Ok(Value::Map(IndexMap::new())),
            Expr::ListLit(elements) => {
                let mut list = Vec::with_capacity(elements.len());
                for e in elements {
                    list.push(self.eval(e)?);
                }
                Ok(Value::List(list))
            }
            Expr::Ident(name) => {
                if wireline_script::CAPABILITY_ROOTS.contains(&name.as_str()) {
                    return Err(runtime(format!(
                        "capability '{name}' is not a value; access a member of it"
                    )));
                }
                match self.locals.get(name) {
                    Some(value) => Ok(value.clone()),
                    None => Err(runtime(format!("unresolved reference '{name}'"))),
                }
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let key = match self.eval(index)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(runtime(format!(
                            "map key must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                match object {
                    Value::Map(map) => Ok(map.get(&key).cloned().unwrap_or(Value::Unset)),
                    Value::Unset => Err(runtime("cannot index undefined value")),
                    other => Err(runtime(format!("cannot index a {}", other.type_name()))),
                }
            }
            Expr::Member { object, field } => self.eval_member(object, field),
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Unary { op, operand } => {
                let UnaryOp::Not = op;
                let b = self.eval_bool(operand)?;
                Ok(Value::Bool(!b))
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
        }
    }

    /// Capability constants: `connectionHelper.attribute*` and friends.
    fn eval_member(&mut self, object: &Expr, field: &str) -> Result<Value> {
        match object {
            Expr::Ident(root) if root == "connectionHelper" => {
                if let Some(key) = attrs::well_known_key(field) {
                    return Ok(Value::Str(key.to_string()));
                }
                if field == "valueAuthModeDBImpersonate" {
                    return Ok(Value::Str(attrs::AUTH_MODE_DB_IMPERSONATE.to_string()));
                }
                Err(violation(format!("connectionHelper.{field}")))
            }
            Expr::Ident(root) if root == "driverLocator" => match field {
                "keywordDriver" => Ok(Value::Str(KEYWORD_DRIVER.to_string())),
                _ => Err(violation(format!("driverLocator.{field}"))),
            },
            Expr::Ident(root) if root == "logging" => Err(violation(format!("logging.{field}"))),
            _ => Err(runtime(format!(
                "no property '{field}' on this value; only capabilities have members"
            ))),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        let Expr::Member { object, field } = callee else {
            return Err(runtime("only capability and list methods are callable"));
        };

        match object.as_ref() {
            Expr::Ident(root) if root == "connectionHelper" => {
                self.call_connection_helper(field, args)
            }
            Expr::Ident(root) if root == "driverLocator" => self.call_driver_locator(field, args),
            Expr::Ident(root) if root == "logging" => self.call_logging(field, args),
            _ => self.call_value_method(object, field, args),
        }
    }

    fn call_connection_helper(&mut self, field: &str, args: &[Expr]) -> Result<Value> {
        match field {
            "formatKeyValuePair" => {
                self.expect_args("connectionHelper.formatKeyValuePair", args, 2)?;
                let key = self.eval_string_arg(&args[0], "key")?;
                let value = match self.eval(&args[1])? {
                    Value::Str(s) => Some(s),
                    Value::Unset => None,
                    other => {
                        return Err(runtime(format!(
                            "formatKeyValuePair value must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Str(helper::format_key_value_pair(
                    &key,
                    value.as_deref(),
                )))
            }
            "ParseODBCConnectString" => {
                self.expect_args("connectionHelper.ParseODBCConnectString", args, 1)?;
                let extras = self.eval_string_arg(&args[0], "extras")?;
                let parsed = helper::parse_odbc_connect_string(&extras);
                let mut map = IndexMap::new();
                for (k, v) in parsed.iter() {
                    map.insert(k.to_string(), Value::Str(v.to_string()));
                }
                Ok(Value::Map(map))
            }
            "MatchesConnectionAttributes" => {
                self.expect_args("connectionHelper.MatchesConnectionAttributes", args, 2)?;
                let a = value_to_attr_map(&self.eval(&args[0])?)?;
                let b = value_to_attr_map(&self.eval(&args[1])?)?;
                Ok(Value::Bool(helper::matches_connection_attributes(&a, &b)))
            }
            "SetImpersonateAttributes" => {
                self.expect_args("connectionHelper.SetImpersonateAttributes", args, 2)?;
                let attr = value_to_attr_map(&self.eval(&args[0])?)?;
                let list = match self.eval(&args[1])? {
                    Value::List(items) => items,
                    other => {
                        return Err(runtime(format!(
                            "SetImpersonateAttributes expects a list, got {}",
                            other.type_name()
                        )))
                    }
                };
                let mut names = Vec::with_capacity(list.len());
                for item in list {
                    match item {
                        Value::Str(s) => names.push(s),
                        other => {
                            return Err(runtime(format!(
                                "required-attribute list holds a {}, expected strings",
                                other.type_name()
                            )))
                        }
                    }
                }
                let extended = helper::impersonation_attributes(&attr, names);
                Ok(Value::List(extended.into_iter().map(Value::Str).collect()))
            }
            _ => Err(violation(format!("connectionHelper.{field}"))),
        }
    }

    fn call_driver_locator(&mut self, field: &str, args: &[Expr]) -> Result<Value> {
        match field {
            "locateDriver" => {
                self.expect_args("driverLocator.locateDriver", args, 1)?;
                let attr = value_to_attr_map(&self.eval(&args[0])?)?;
                let descriptor = self.drivers.locate(&attr)?;
                Ok(Value::Str(descriptor.name))
            }
            "LocateDriverVersion" => {
                self.expect_args("driverLocator.LocateDriverVersion", args, 1)?;
                let attr = value_to_attr_map(&self.eval(&args[0])?)?;
                Ok(Value::Str(self.drivers.locate_version(&attr)?))
            }
            "versionAtLeast" => {
                self.expect_args("driverLocator.versionAtLeast", args, 2)?;
                let attr = value_to_attr_map(&self.eval(&args[0])?)?;
                let threshold = self.eval_string_arg(&args[1], "version")?;
                let version = wireline_types::DriverVersion::parse(&threshold).map_err(|_| {
                    runtime(format!("invalid version threshold '{threshold}'"))
                })?;
                Ok(Value::Bool(self.drivers.version_at_least(
                    &attr,
                    version.major,
                    version.minor,
                )?))
            }
            _ => Err(violation(format!("driverLocator.{field}"))),
        }
    }

    fn call_logging(&mut self, field: &str, args: &[Expr]) -> Result<Value> {
        if field != "log" {
            return Err(violation(format!("logging.{field}")));
        }
        self.expect_args("logging.log", args, 1)?;
        let message = match self.eval(&args[0])? {
            Value::Str(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Unset => "undefined".to_string(),
            other => format!("<{}>", other.type_name()),
        };
        let masked = helper::mask_secrets(&self.secret_source, &message);
        self.logs.push(masked);
        Ok(Value::Unset)
    }

    /// Value methods: `list.push(x)` and `list.join(sep)`.
    fn call_value_method(&mut self, object: &Expr, field: &str, args: &[Expr]) -> Result<Value> {
        match field {
            "push" => {
                self.expect_args("push", args, 1)?;
                let value = self.eval(&args[0])?;
                let Expr::Ident(name) = object else {
                    return Err(runtime("push target must be a variable"));
                };
                match self.locals.get_mut(name) {
                    Some(Value::List(list)) => {
                        list.push(value);
                        Ok(Value::Unset)
                    }
                    Some(Value::Unset) => Err(runtime(format!(
                        "cannot call method 'push' on undefined value '{name}'"
                    ))),
                    Some(other) => Err(runtime(format!(
                        "cannot call 'push' on a {}",
                        other.type_name()
                    ))),
                    None => Err(runtime(format!("unresolved reference '{name}'"))),
                }
            }
            "join" => {
                self.expect_args("join", args, 1)?;
                let separator = self.eval_string_arg(&args[0], "separator")?;
                match self.eval(object)? {
                    Value::List(items) => {
                        let mut parts = Vec::with_capacity(items.len());
                        for item in items {
                            match item {
                                Value::Str(s) => parts.push(s),
                                other => {
                                    return Err(runtime(format!(
                                        "cannot join a list holding a {}",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                        Ok(Value::Str(parts.join(&separator)))
                    }
                    Value::Unset => {
                        Err(runtime("cannot call method 'join' on undefined value"))
                    }
                    other => Err(runtime(format!(
                        "cannot call 'join' on a {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(runtime(format!("unknown method '{field}'"))),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            BinaryOp::Or => {
                if self.eval_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let equal = values_equal(&l, &r)?;
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Concat => {
                fn part(v: &Value) -> Result<&str> {
                    match v {
                        Value::Str(s) => Ok(s.as_str()),
                        Value::Unset => Err(runtime("cannot concatenate undefined value")),
                        other => Err(runtime(format!(
                            "cannot concatenate a {}",
                            other.type_name()
                        ))),
                    }
                }
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(Value::Str(format!("{}{}", part(&l)?, part(&r)?)))
            }
        }
    }

    fn expect_args(&self, name: &str, args: &[Expr], expected: usize) -> Result<()> {
        if args.len() != expected {
            return Err(runtime(format!(
                "{name} takes {expected} argument(s), got {}",
                args.len()
            )));
        }
        Ok(())
    }

    fn eval_string_arg(&mut self, arg: &Expr, what: &str) -> Result<String> {
        match self.eval(arg)? {
            Value::Str(s) => Ok(s),
            other => Err(runtime(format!(
                "{what} must be a string, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Comparable value pairs: strings, bools, and undefined. Present-and-empty
/// is not equal to unset here; only the matcher helper normalizes the two.
fn values_equal(l: &Value, r: &Value) -> Result<bool> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Unset, Value::Unset) => Ok(true),
        (Value::Str(_), Value::Unset) | (Value::Unset, Value::Str(_)) => Ok(false),
        (Value::Bool(_), Value::Unset) | (Value::Unset, Value::Bool(_)) => Ok(false),
        (Value::Str(_), Value::Bool(_)) | (Value::Bool(_), Value::Str(_)) => Ok(false),
        _ => Err(runtime(format!(
            "cannot compare a {} with a {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

/// Hoist `var` declarations (recursively) to function scope, JS-style.
fn hoist_vars(stmts: &[Stmt], locals: &mut IndexMap<String, Value>) {
    for stmt in stmts {
        match stmt {
            Stmt::Var { name, .. } => {
                locals.entry(name.clone()).or_insert(Value::Unset);
            }
            Stmt::If {
                then, otherwise, ..
            } => {
                hoist_vars(then, locals);
                hoist_vars(otherwise, locals);
            }
            Stmt::ForIn { var, body, .. } => {
                locals.entry(var.clone()).or_insert(Value::Unset);
                hoist_vars(body, locals);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Output coercion
// ---------------------------------------------------------------------------

/// Heuristic for the builder kind's two shapes: a lone string whose first
/// `:` comes before any `=` is a URL, everything else is a parameter list.
fn looks_like_url(s: &str) -> bool {
    match (s.find(':'), s.find('=')) {
        (Some(colon), Some(equals)) => colon < equals,
        (Some(_), None) => true,
        _ => false,
    }
}

fn pairs_from_strings(items: Vec<String>) -> ParameterList {
    let mut params = ParameterList::new();
    for item in items {
        match item.split_once('=') {
            Some((key, value)) => params.push(key, value),
            // A pushed fragment without '=' keeps its text as the key; the
            // validator's non-empty-key rule judges it.
            None => params.push(item, ""),
        }
    }
    params
}

fn string_items(list: Vec<Value>) -> Result<Vec<String>> {
    let mut items = Vec::with_capacity(list.len());
    for value in list {
        match value {
            Value::Str(s) => items.push(s),
            other => {
                return Err(runtime(format!(
                    "returned list holds a {}, expected strings",
                    other.type_name()
                )))
            }
        }
    }
    Ok(items)
}

fn map_pairs(map: IndexMap<String, Value>) -> Result<ParameterList> {
    let mut params = ParameterList::new();
    for (key, value) in map {
        match value {
            Value::Str(s) => params.push(key, s),
            // An attribute that was never set formats as empty downstream.
            Value::Unset => params.push(key, ""),
            other => {
                return Err(runtime(format!(
                    "returned map value for '{key}' is a {}, expected a string",
                    other.type_name()
                )))
            }
        }
    }
    Ok(params)
}

/// Coerce the script's return value into the canonical output for its kind.
/// This is the single place shape variance is resolved; downstream code only
/// ever sees [`BuilderOutput`].
pub(crate) fn coerce_output(kind: BuilderKind, value: Value) -> Result<BuilderOutput> {
    match kind {
        BuilderKind::ConnectionBuilder => match value {
            // A bare string is a list-of-one.
            Value::Str(s) => coerce_output(kind, Value::List(vec![Value::Str(s)])),
            Value::List(list) => {
                let items = string_items(list)?;
                if items.len() == 1 && looks_like_url(&items[0]) {
                    Ok(BuilderOutput::Url(items))
                } else {
                    Ok(BuilderOutput::Parameters(pairs_from_strings(items)))
                }
            }
            Value::Map(map) => Ok(BuilderOutput::Parameters(map_pairs(map)?)),
            other => Err(runtime(format!(
                "connection builder returned a {}",
                other.type_name()
            ))),
        },
        BuilderKind::ConnectionProperties => match value {
            Value::Map(map) => Ok(BuilderOutput::Parameters(map_pairs(map)?)),
            Value::List(list) => Ok(BuilderOutput::Parameters(pairs_from_strings(
                string_items(list)?,
            ))),
            Value::Str(s) => Ok(BuilderOutput::Parameters(pairs_from_strings(vec![s]))),
            other => Err(runtime(format!(
                "connection properties returned a {}",
                other.type_name()
            ))),
        },
        BuilderKind::ConnectionRequired => match value {
            Value::List(list) => {
                let items = string_items(list)?;
                Ok(BuilderOutput::Required(
                    items.into_iter().collect::<BTreeSet<_>>(),
                ))
            }
            Value::Str(s) => Ok(BuilderOutput::Required(BTreeSet::from([s]))),
            other => Err(runtime(format!(
                "required-attribute builder returned a {}",
                other.type_name()
            ))),
        },
        BuilderKind::ConnectionMatcher => match value {
            Value::Bool(b) => Ok(BuilderOutput::Matched(b)),
            other => Err(runtime(format!("matcher returned a {}", other.type_name()))),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
