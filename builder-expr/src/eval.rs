use std::fmt;

use crate::{
    ast::{BinaryOp, Expr, UnaryOp},
    env::Environment,
    value::Value,
};

/// An evaluation failure. The driver maps each variant onto the matching
/// preprocessor error kind and attaches the source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Operator applied to incompatible operands, or wrong arity to a
    /// built-in.
    Type(String),
    /// Call to an unknown function.
    Name(String),
    /// A structurally invalid use, such as `defined(1 + 2)`.
    Expr(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Type(message) | EvalError::Expr(message) => f.write_str(message),
            EvalError::Name(name) => write!(f, "unknown function `{name}`"),
        }
    }
}

/// Everything evaluation needs besides the expression itself: the variable
/// environment and the current source position for the `__FILE__`,
/// `__PATH__`, and `__LINE__` pseudo-identifiers.
pub struct EvalContext<'a> {
    pub env: &'a Environment,
    pub file: &'a str,
    pub path: &'a str,
    pub line: u32,
}

/// Evaluates an expression to a value. Pure tree walk; the only state is the
/// environment in the context.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    Ok(match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::String(s) => Value::String(s.clone()),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Null => Value::Null,

        Expr::Ident(name) => match name.as_str() {
            "__LINE__" => Value::Number(f64::from(ctx.line)),
            "__FILE__" => Value::String(ctx.file.to_owned()),
            "__PATH__" => Value::String(ctx.path.to_owned()),
            // An unresolved identifier is not an error; it reads as null.
            _ => ctx.env.lookup(name).cloned().unwrap_or(Value::Null),
        },

        Expr::Array(elements) => Value::Array(
            elements
                .iter()
                .map(|element| evaluate(element, ctx))
                .collect::<Result<_, _>>()?,
        ),

        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Plus | UnaryOp::Minus => match value {
                    Value::Number(n) => {
                        Value::Number(if *op == UnaryOp::Minus { -n } else { n })
                    }
                    other => {
                        return Err(EvalError::Type(format!(
                            "unary `{}` is not defined on {}",
                            if *op == UnaryOp::Minus { '-' } else { '+' },
                            other.kind_name()
                        )))
                    }
                },
            }
        }

        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, ctx)?,

        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, ctx)?.is_truthy() {
                evaluate(then, ctx)?
            } else {
                evaluate(otherwise, ctx)?
            }
        }

        Expr::Member { object, field } => member(&evaluate(object, ctx)?, field),

        Expr::Index { object, index } => {
            let object = evaluate(object, ctx)?;
            match evaluate(index, ctx)? {
                Value::Number(n) => element_at(&object, n),
                Value::String(field) => member(&object, &field),
                _ => Value::Null,
            }
        }

        Expr::Call { callee, args } => call(callee, args, ctx)?,
    })
}

fn evaluate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    // `&&` and `||` short-circuit, and their result is the last evaluated
    // operand rather than a bool.
    match op {
        BinaryOp::And => {
            let left = evaluate(left, ctx)?;
            return if left.is_truthy() {
                evaluate(right, ctx)
            } else {
                Ok(left)
            };
        }
        BinaryOp::Or => {
            let left = evaluate(left, ctx)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                evaluate(right, ctx)
            };
        }
        _ => (),
    }

    let left = evaluate(left, ctx)?;
    let right = evaluate(right, ctx)?;
    let incompatible = || {
        EvalError::Type(format!(
            "operator `{}` is not defined on {} and {}",
            op.symbol(),
            left.kind_name(),
            right.kind_name()
        ))
    };

    Ok(match op {
        BinaryOp::Eq => Value::Bool(left == right),
        BinaryOp::Ne => Value::Bool(left != right),

        // Either operand being a string makes `+` a concatenation; the other
        // operand goes through the canonical toString.
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(s), other) => Value::String(format!("{s}{}", other.to_display_string())),
            (other, Value::String(s)) => Value::String(format!("{}{s}", other.to_display_string())),
            _ => return Err(incompatible()),
        },

        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(incompatible());
            };
            Value::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                // Division by zero does not fail; it reads as NaN.
                BinaryOp::Div if *b == 0.0 => f64::NAN,
                BinaryOp::Div => a / b,
                BinaryOp::Rem if *b == 0.0 => f64::NAN,
                BinaryOp::Rem => a % b,
                _ => unreachable!(),
            })
        }

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }),
            (Value::String(a), Value::String(b)) => Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }),
            _ => return Err(incompatible()),
        },

        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    })
}

fn member(object: &Value, field: &str) -> Value {
    match object {
        Value::String(s) if field == "length" => Value::Number(s.chars().count() as f64),
        Value::Array(elements) if field == "length" => Value::Number(elements.len() as f64),
        _ => Value::Null,
    }
}

fn element_at(object: &Value, index: f64) -> Value {
    if index.fract() != 0.0 || index < 0.0 {
        return Value::Null;
    }
    let index = index as usize;
    match object {
        Value::String(s) => s
            .chars()
            .nth(index)
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Array(elements) => elements.get(index).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn call(callee: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
    match callee {
        // `defined` inspects the identifier itself, not its value, so it is
        // dispatched before argument evaluation.
        "defined" => {
            let [arg] = args else {
                return Err(EvalError::Type(format!(
                    "defined() expects exactly 1 argument, but {} were given",
                    args.len()
                )));
            };
            let Expr::Ident(name) = arg else {
                return Err(EvalError::Expr(
                    "defined() expects an identifier, not a value".to_owned(),
                ));
            };
            let bound = matches!(name.as_str(), "__LINE__" | "__FILE__" | "__PATH__")
                || ctx.env.is_defined(name);
            Ok(Value::Bool(bound))
        }
        "min" | "max" => {
            let numbers = numeric_args(callee, args, ctx)?;
            if numbers.is_empty() {
                return Err(EvalError::Type(format!(
                    "{callee}() expects at least 1 argument"
                )));
            }
            let folded = numbers
                .into_iter()
                .reduce(|a, b| if callee == "min" { a.min(b) } else { a.max(b) })
                .unwrap_or(f64::NAN);
            Ok(Value::Number(folded))
        }
        "abs" => {
            let numbers = numeric_args(callee, args, ctx)?;
            let [n] = numbers.as_slice() else {
                return Err(EvalError::Type(format!(
                    "abs() expects exactly 1 argument, but {} were given",
                    numbers.len()
                )));
            };
            Ok(Value::Number(n.abs()))
        }
        unknown => Err(EvalError::Name(unknown.to_owned())),
    }
}

fn numeric_args(callee: &str, args: &[Expr], ctx: &EvalContext) -> Result<Vec<f64>, EvalError> {
    args.iter()
        .map(|arg| match evaluate(arg, ctx)? {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::Type(format!(
                "{callee}() expects numeric arguments, but got {}",
                other.kind_name()
            ))),
        })
        .collect()
}
