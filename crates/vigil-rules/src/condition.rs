use crate::error::RuleError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Comparison operator of a leaf expression. Checked in the order
/// `==`, `>=`, `>` when parsing, so `>=` is never misread as `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gte,
    Gt,
}

impl CompareOp {
    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Gte => ">=",
            CompareOp::Gt => ">",
        }
    }
}

/// A parsed leaf expression `"field op literal"`.
///
/// The left-hand side is a dot-path into the event; the right-hand side
/// is kept as the raw literal with surrounding quotes stripped. Numeric
/// comparators parse both sides as floats at evaluation time; failures
/// collapse to `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub path: String,
    pub op: CompareOp,
    pub value: String,
}

impl FromStr for Expr {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for op in [CompareOp::Eq, CompareOp::Gte, CompareOp::Gt] {
            if let Some((lhs, rhs)) = s.split_once(op.token()) {
                let path = lhs.trim().to_string();
                if path.is_empty() {
                    return Err(RuleError::InvalidExpression(s.to_string()));
                }
                let value = rhs
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'')
                    .to_string();
                return Ok(Expr { path, op, value });
            }
        }
        Err(RuleError::UnknownOperator(s.to_string()))
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.path, self.op.token(), self.value)
    }
}

impl Expr {
    fn matches(&self, event: &Value) -> bool {
        let Some(got) = lookup(event, &self.path) else {
            tracing::debug!(expr = %self, "condition field absent");
            return false;
        };
        match self.op {
            CompareOp::Eq => scalar_str(got) == self.value,
            CompareOp::Gte | CompareOp::Gt => {
                let (Some(lhs), Ok(rhs)) = (as_f64(got), self.value.parse::<f64>()) else {
                    tracing::debug!(expr = %self, "non-numeric comparison, treating as false");
                    return false;
                };
                match self.op {
                    CompareOp::Gte => lhs >= rhs,
                    _ => lhs > rhs,
                }
            }
        }
    }
}

/// A condition tree evaluated against the JSON rendering of an event.
///
/// `All` short-circuits on the first false sub-condition, `Any` on the
/// first true one. `Fields` is an exact, type-sensitive equality match
/// per dot-path; a missing path never equals any value.
#[derive(Debug, Clone)]
pub enum Condition {
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Expr(Expr),
    Fields(BTreeMap<String, Value>),
}

impl Condition {
    pub fn matches(&self, event: &Value) -> bool {
        match self {
            Condition::All(conds) => conds.iter().all(|c| c.matches(event)),
            Condition::Any(conds) => conds.iter().any(|c| c.matches(event)),
            Condition::Expr(expr) => expr.matches(event),
            Condition::Fields(fields) => fields
                .iter()
                .all(|(path, want)| lookup(event, path) == Some(want)),
        }
    }

    /// JSON rendering of the tree, the inverse of [`parse_condition`].
    pub fn to_value(&self) -> Value {
        match self {
            Condition::All(conds) => {
                serde_json::json!({ "all": conds.iter().map(Condition::to_value).collect::<Vec<_>>() })
            }
            Condition::Any(conds) => {
                serde_json::json!({ "any": conds.iter().map(Condition::to_value).collect::<Vec<_>>() })
            }
            Condition::Expr(expr) => Value::String(expr.to_string()),
            Condition::Fields(fields) => {
                Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
        }
    }
}

/// Parse one condition node: `{all: [...]}`, `{any: [...]}`, an
/// expression string, or a field-equality map.
pub fn parse_condition(value: &Value) -> Result<Condition, RuleError> {
    if let Some(obj) = value.as_object() {
        if let Some(list) = obj.get("all") {
            return Ok(Condition::All(parse_list(list, "all")?));
        }
        if let Some(list) = obj.get("any") {
            return Ok(Condition::Any(parse_list(list, "any")?));
        }
        let fields = obj
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        return Ok(Condition::Fields(fields));
    }
    if let Some(s) = value.as_str() {
        return Ok(Condition::Expr(s.parse()?));
    }
    Err(RuleError::InvalidCondition(format!(
        "expected a map or expression string, got {value}"
    )))
}

fn parse_list(value: &Value, key: &str) -> Result<Vec<Condition>, RuleError> {
    let items = value
        .as_array()
        .ok_or_else(|| RuleError::InvalidCondition(format!("'{key}' must be a list")))?;
    items.iter().map(parse_condition).collect()
}

/// Dot-path lookup: splits on `.` and descends nested objects. Returns
/// `None` (the "absent" sentinel) the moment a non-object is met before
/// the path is exhausted.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// String rendering of a scalar for `==` comparison and templating.
pub(crate) fn scalar_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
