//! A small interpreter for the compiled output of the (out of scope) DSL's
//! lambda expressions.
//!
//! Design note from spec §9: "Model \[dynamic lambda values\] as a tagged
//! union with explicit coercion rules; expose the rules as a small
//! interpreter rather than overloaded numeric operators." `Expr` is that
//! tagged union (the shape a DSL compiler would hand us); `eval` is the
//! interpreter. Every operator that takes a predicate or a computed field
//! (`eval`, `where`, alert level predicates, `stateDuration`/`stateCount`,
//! `combine`'s per-position filters) is built on this.

use std::collections::HashMap;
use thiserror::Error;

use flow_core::{Point, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Field(String),
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Lte(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Gte(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
    #[error("type mismatch: cannot apply `{op}` to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("division by zero")]
    DivByZero,
}

impl Expr {
    pub fn eval(&self, point: &Point) -> Result<Value, EvalError> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Field(name) => point
                .field(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownField(name.clone())),
            Expr::Tag(name) => point
                .tag(name)
                .map(|s| Value::Str(s.to_string()))
                .ok_or_else(|| EvalError::UnknownTag(name.clone())),
            Expr::Not(e) => {
                let v = e.eval(point)?;
                let b = v.as_bool().ok_or_else(|| EvalError::TypeMismatch {
                    op: "not",
                    lhs: v.type_name(),
                    rhs: "bool",
                })?;
                Ok(Value::Bool(!b))
            }
            Expr::And(a, b) => {
                let av = truthy(a, point)?;
                if !av {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(b, point)?))
            }
            Expr::Or(a, b) => {
                let av = truthy(a, point)?;
                if av {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(b, point)?))
            }
            Expr::Eq(a, b) => Ok(Value::Bool(values_equal(&a.eval(point)?, &b.eval(point)?))),
            Expr::Neq(a, b) => Ok(Value::Bool(!values_equal(&a.eval(point)?, &b.eval(point)?))),
            Expr::Lt(a, b) => cmp(a, b, point, "<", |o| o == std::cmp::Ordering::Less),
            Expr::Lte(a, b) => cmp(a, b, point, "<=", |o| o != std::cmp::Ordering::Greater),
            Expr::Gt(a, b) => cmp(a, b, point, ">", |o| o == std::cmp::Ordering::Greater),
            Expr::Gte(a, b) => cmp(a, b, point, ">=", |o| o != std::cmp::Ordering::Less),
            Expr::Add(a, b) => arith(a, b, point, "+", |x, y| x + y),
            Expr::Sub(a, b) => arith(a, b, point, "-", |x, y| x - y),
            Expr::Mul(a, b) => arith(a, b, point, "*", |x, y| x * y),
            Expr::Div(a, b) => {
                let lv = a.eval(point)?;
                let rv = b.eval(point)?;
                let (l, r) = numeric_pair(&lv, &rv, "/")?;
                if r == 0.0 {
                    return Err(EvalError::DivByZero);
                }
                Ok(Value::Float(l / r))
            }
        }
    }
}

fn truthy(e: &Expr, point: &Point) -> Result<bool, EvalError> {
    let v = e.eval(point)?;
    v.as_bool().ok_or_else(|| EvalError::TypeMismatch {
        op: "bool",
        lhs: v.type_name(),
        rhs: "bool",
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.render() == b.render(),
    }
}

fn numeric_pair(a: &Value, b: &Value, op: &'static str) -> Result<(f64, f64), EvalError> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(EvalError::TypeMismatch {
            op,
            lhs: a.type_name(),
            rhs: b.type_name(),
        }),
    }
}

fn arith(
    a: &Expr,
    b: &Expr,
    point: &Point,
    op: &'static str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let lv = a.eval(point)?;
    let rv = b.eval(point)?;
    let (l, r) = numeric_pair(&lv, &rv, op)?;
    Ok(Value::Float(f(l, r)))
}

fn cmp(
    a: &Expr,
    b: &Expr,
    point: &Point,
    op: &'static str,
    pred: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let lv = a.eval(point)?;
    let rv = b.eval(point)?;
    let (l, r) = numeric_pair(&lv, &rv, op)?;
    Ok(Value::Bool(pred(l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal))))
}

/// Render `.Name`/`.TaskName`/`.ID`/`.Time`/`.Level`/`.Tags`/`.Fields`
/// templates (spec §4.7 "Templated fields"). Kept separate from `Expr`
/// since templates are string-interpolation, not boolean/arithmetic logic.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if template[i..].starts_with("{{") {
            if let Some(end) = template[i..].find("}}") {
                let inner = template[i + 2..i + end].trim();
                let key = inner
                    .trim_start_matches('.')
                    .trim_start_matches("index ")
                    .trim_matches(|c: char| c == '"' || c.is_whitespace());
                // Support both `.Name` and `index .Tags "host"` shaped keys by
                // just matching against the flattened vars map.
                let resolved = vars
                    .get(inner.trim_start_matches('.'))
                    .or_else(|| vars.get(key))
                    .cloned()
                    .unwrap_or_default();
                out.push_str(&resolved);
                i += end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = &mut chars;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Point;

    fn point_with_value(v: f64) -> Point {
        Point::new("cpu", 0).with_field("value", v)
    }

    #[test]
    fn gt_predicate() {
        let expr = Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(Value::Float(90.0))));
        assert_eq!(expr.eval(&point_with_value(95.0)), Ok(Value::Bool(true)));
        assert_eq!(expr.eval(&point_with_value(50.0)), Ok(Value::Bool(false)));
    }

    #[test]
    fn unknown_field_is_data_error_not_panic() {
        let expr = Expr::Field("missing".into());
        assert_eq!(expr.eval(&point_with_value(1.0)), Err(EvalError::UnknownField("missing".into())));
    }

    #[test]
    fn arithmetic_on_string_is_type_mismatch() {
        let p = Point::new("cpu", 0).with_field("name", "x");
        let expr = Expr::Add(Box::new(Expr::Field("name".into())), Box::new(Expr::Const(Value::Int(1))));
        assert!(matches!(expr.eval(&p), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn division_by_zero_is_explicit_error() {
        let expr = Expr::Div(Box::new(Expr::Const(Value::Int(1))), Box::new(Expr::Const(Value::Int(0))));
        let p = Point::new("cpu", 0);
        assert_eq!(expr.eval(&p), Err(EvalError::DivByZero));
    }

    #[test]
    fn template_resolves_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("Name".to_string(), "cpu".to_string());
        vars.insert("Tags.host".to_string(), "serverA".to_string());
        let rendered = render_template("kapacitor/{{.Name}}/{{index .Tags \"host\"}}", &vars);
        assert_eq!(rendered, "kapacitor/cpu/serverA");
    }
}
