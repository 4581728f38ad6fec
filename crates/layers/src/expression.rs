use foundation::feature::{Properties, PropertyValue};
use serde_json::{Map, Value, json};

use crate::labels::format_number;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }
}

/// Data-driven style expression, a subset of the MapLibre expression language.
///
/// Expressions are plain data: they are handed to the map engine as JSON and
/// can also be evaluated locally against a feature's properties.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Get(String),
    Literal(PropertyValue),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    All(Vec<Expression>),
    Any(Vec<Expression>),
    Not(Box<Expression>),
    Case {
        branches: Vec<(Expression, Expression)>,
        fallback: Box<Expression>,
    },
    Add(Vec<Expression>),
    NumberFormat {
        input: Box<Expression>,
        min_fraction_digits: u8,
        max_fraction_digits: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    UnknownOperator(String),
    Arity {
        op: String,
        expected: &'static str,
        found: usize,
    },
    Malformed(String),
    Type {
        op: &'static str,
        expected: &'static str,
    },
}

impl std::fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionError::UnknownOperator(op) => write!(f, "unknown expression operator: {op}"),
            ExpressionError::Arity {
                op,
                expected,
                found,
            } => write!(f, "\"{op}\" expects {expected} arguments, found {found}"),
            ExpressionError::Malformed(msg) => write!(f, "malformed expression: {msg}"),
            ExpressionError::Type { op, expected } => {
                write!(f, "\"{op}\" expected {expected} input")
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

impl From<f64> for Expression {
    fn from(n: f64) -> Self {
        Expression::Literal(PropertyValue::Number(n))
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::Literal(PropertyValue::Bool(b))
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Literal(PropertyValue::String(s.to_string()))
    }
}

impl Expression {
    pub fn get(key: impl Into<String>) -> Self {
        Expression::Get(key.into())
    }

    pub fn compare(op: CompareOp, lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Self {
        Expression::Compare(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    pub fn equal_to(self, rhs: impl Into<Expression>) -> Self {
        Self::compare(CompareOp::Eq, self, rhs)
    }

    pub fn not_equal_to(self, rhs: impl Into<Expression>) -> Self {
        Self::compare(CompareOp::Ne, self, rhs)
    }

    pub fn less_than(self, rhs: impl Into<Expression>) -> Self {
        Self::compare(CompareOp::Lt, self, rhs)
    }

    pub fn at_least(self, rhs: impl Into<Expression>) -> Self {
        Self::compare(CompareOp::Ge, self, rhs)
    }

    pub fn all(items: Vec<Expression>) -> Self {
        Expression::All(items)
    }

    pub fn case(branches: Vec<(Expression, Expression)>, fallback: impl Into<Expression>) -> Self {
        Expression::Case {
            branches,
            fallback: Box::new(fallback.into()),
        }
    }

    /// MapLibre array form, e.g. `["<", ["get", "mag"], 2]`.
    pub fn to_json(&self) -> Value {
        match self {
            Expression::Get(key) => json!(["get", key]),
            Expression::Literal(v) => literal_to_json(v),
            Expression::Compare(op, a, b) => json!([op.symbol(), a.to_json(), b.to_json()]),
            Expression::All(items) => op_array("all", items.iter().map(Expression::to_json)),
            Expression::Any(items) => op_array("any", items.iter().map(Expression::to_json)),
            Expression::Not(inner) => json!(["!", inner.to_json()]),
            Expression::Case { branches, fallback } => {
                let mut args = Vec::with_capacity(branches.len() * 2 + 1);
                for (cond, out) in branches {
                    args.push(cond.to_json());
                    args.push(out.to_json());
                }
                args.push(fallback.to_json());
                op_array("case", args)
            }
            Expression::Add(items) => op_array("+", items.iter().map(Expression::to_json)),
            Expression::NumberFormat {
                input,
                min_fraction_digits,
                max_fraction_digits,
            } => json!([
                "number-format",
                input.to_json(),
                {
                    "min-fraction-digits": min_fraction_digits,
                    "max-fraction-digits": max_fraction_digits,
                }
            ]),
        }
    }

    /// Parses and validates the MapLibre array form.
    pub fn from_json(value: &Value) -> Result<Self, ExpressionError> {
        let items = match value {
            Value::Null => return Ok(Expression::Literal(PropertyValue::Null)),
            Value::Bool(b) => return Ok((*b).into()),
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| ExpressionError::Malformed(format!("number {n}")))?;
                return Ok(n.into());
            }
            Value::String(s) => return Ok(s.as_str().into()),
            Value::Object(_) => {
                return Err(ExpressionError::Malformed(
                    "bare object outside an operator".to_string(),
                ));
            }
            Value::Array(items) => items,
        };

        let Some((head, args)) = items.split_first() else {
            return Err(ExpressionError::Malformed("empty array".to_string()));
        };
        let Some(op) = head.as_str() else {
            return Err(ExpressionError::Malformed(format!(
                "operator must be a string, found {head}"
            )));
        };

        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(ExpressionError::Arity {
                    op: op.to_string(),
                    expected,
                    found: args.len(),
                })
            }
        };
        let parse_all = |args: &[Value]| -> Result<Vec<Expression>, ExpressionError> {
            args.iter().map(Expression::from_json).collect()
        };

        if let Some(cmp) = CompareOp::from_symbol(op) {
            arity("2", args.len() == 2)?;
            return Ok(Expression::compare(
                cmp,
                Expression::from_json(&args[0])?,
                Expression::from_json(&args[1])?,
            ));
        }

        match op {
            "get" => {
                arity("1", args.len() == 1)?;
                let key = args[0].as_str().ok_or_else(|| {
                    ExpressionError::Malformed("\"get\" key must be a string".to_string())
                })?;
                Ok(Expression::get(key))
            }
            "literal" => {
                arity("1", args.len() == 1)?;
                match &args[0] {
                    Value::Array(_) | Value::Object(_) => Err(ExpressionError::Malformed(
                        "only scalar literals are supported".to_string(),
                    )),
                    scalar => Expression::from_json(scalar),
                }
            }
            "all" => Ok(Expression::All(parse_all(args)?)),
            "any" => Ok(Expression::Any(parse_all(args)?)),
            "!" => {
                arity("1", args.len() == 1)?;
                Ok(Expression::Not(Box::new(Expression::from_json(&args[0])?)))
            }
            "case" => {
                arity("an odd number (>= 3) of", args.len() >= 3 && args.len() % 2 == 1)?;
                let (pairs, fallback) = args.split_at(args.len() - 1);
                let mut branches = Vec::with_capacity(pairs.len() / 2);
                for pair in pairs.chunks(2) {
                    branches.push((
                        Expression::from_json(&pair[0])?,
                        Expression::from_json(&pair[1])?,
                    ));
                }
                Ok(Expression::Case {
                    branches,
                    fallback: Box::new(Expression::from_json(&fallback[0])?),
                })
            }
            // A single operand is the cluster-aggregation form `["+", map_expr]`.
            "+" => {
                arity("at least 1", !args.is_empty())?;
                Ok(Expression::Add(parse_all(args)?))
            }
            "number-format" => {
                arity("2", args.len() == 2)?;
                let Value::Object(options) = &args[1] else {
                    return Err(ExpressionError::Malformed(
                        "\"number-format\" options must be an object".to_string(),
                    ));
                };
                let min = fraction_digits(options, "min-fraction-digits", 0)?;
                let max = fraction_digits(options, "max-fraction-digits", 3u8.max(min))?;
                if min > max {
                    return Err(ExpressionError::Malformed(format!(
                        "min-fraction-digits {min} exceeds max-fraction-digits {max}"
                    )));
                }
                Ok(Expression::NumberFormat {
                    input: Box::new(Expression::from_json(&args[0])?),
                    min_fraction_digits: min,
                    max_fraction_digits: max,
                })
            }
            other => Err(ExpressionError::UnknownOperator(other.to_string())),
        }
    }

    pub fn evaluate(&self, props: &Properties) -> Result<PropertyValue, ExpressionError> {
        match self {
            Expression::Get(key) => Ok(props.get(key).cloned().unwrap_or(PropertyValue::Null)),
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Compare(op, a, b) => {
                let a = a.evaluate(props)?;
                let b = b.evaluate(props)?;
                Ok(PropertyValue::Bool(compare(*op, &a, &b)))
            }
            Expression::All(items) => {
                for item in items {
                    if !item.evaluate_bool(props, "all")? {
                        return Ok(PropertyValue::Bool(false));
                    }
                }
                Ok(PropertyValue::Bool(true))
            }
            Expression::Any(items) => {
                for item in items {
                    if item.evaluate_bool(props, "any")? {
                        return Ok(PropertyValue::Bool(true));
                    }
                }
                Ok(PropertyValue::Bool(false))
            }
            Expression::Not(inner) => Ok(PropertyValue::Bool(!inner.evaluate_bool(props, "!")?)),
            Expression::Case { branches, fallback } => {
                for (cond, out) in branches {
                    if cond.evaluate_bool(props, "case")? {
                        return out.evaluate(props);
                    }
                }
                fallback.evaluate(props)
            }
            Expression::Add(items) => {
                let mut sum = 0.0;
                for item in items {
                    sum += item.evaluate(props)?.as_f64().ok_or(ExpressionError::Type {
                        op: "+",
                        expected: "number",
                    })?;
                }
                Ok(PropertyValue::Number(sum))
            }
            Expression::NumberFormat {
                input,
                min_fraction_digits,
                max_fraction_digits,
            } => {
                let n = input.evaluate(props)?.as_f64().ok_or(ExpressionError::Type {
                    op: "number-format",
                    expected: "number",
                })?;
                Ok(PropertyValue::String(format_number(
                    n,
                    *min_fraction_digits,
                    *max_fraction_digits,
                )))
            }
        }
    }

    /// Filter semantics: anything other than boolean `true` does not match.
    pub fn matches(&self, props: &Properties) -> bool {
        matches!(self.evaluate(props), Ok(PropertyValue::Bool(true)))
    }

    fn evaluate_bool(&self, props: &Properties, op: &'static str) -> Result<bool, ExpressionError> {
        self.evaluate(props)?.as_bool().ok_or(ExpressionError::Type {
            op,
            expected: "boolean",
        })
    }
}

fn compare(op: CompareOp, a: &PropertyValue, b: &PropertyValue) -> bool {
    let ordering = match (a, b) {
        (PropertyValue::Number(x), PropertyValue::Number(y)) => x.partial_cmp(y),
        (PropertyValue::String(x), PropertyValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => ordering.is_some_and(|o| o.is_lt()),
        CompareOp::Le => ordering.is_some_and(|o| o.is_le()),
        CompareOp::Gt => ordering.is_some_and(|o| o.is_gt()),
        CompareOp::Ge => ordering.is_some_and(|o| o.is_ge()),
    }
}

fn op_array(op: &str, args: impl IntoIterator<Item = Value>) -> Value {
    let mut out = vec![Value::String(op.to_string())];
    out.extend(args);
    Value::Array(out)
}

fn literal_to_json(v: &PropertyValue) -> Value {
    match v {
        PropertyValue::Null => Value::Null,
        PropertyValue::Bool(b) => Value::Bool(*b),
        // Integral values print as integers to keep the style JSON tidy.
        PropertyValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => json!(*n as i64),
        PropertyValue::Number(n) => json!(n),
        PropertyValue::String(s) => Value::String(s.clone()),
    }
}

fn fraction_digits(options: &Map<String, Value>, key: &str, default: u8) -> Result<u8, ExpressionError> {
    let Some(v) = options.get(key) else {
        return Ok(default);
    };
    v.as_u64()
        .filter(|n| *n <= 20)
        .map(|n| n as u8)
        .ok_or_else(|| ExpressionError::Malformed(format!("{key} must be an integer in 0..=20")))
}
