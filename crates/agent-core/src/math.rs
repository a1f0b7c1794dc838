//! Expression Evaluator
//!
//! Evaluates the single-line expressions the calculator tool produces. The
//! parsing and evaluation are done by `meval`; this module normalises the
//! notations models like to emit (`**`, `×`, `÷`, digit separators), bounds
//! parenthesis nesting and renders results.

use meval::{Context, Expr};
use thiserror::Error;

/// Deepest parenthesis nesting accepted
pub const MAX_NESTING: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Empty expression")]
    Empty,

    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Invalid expression: {0}")]
    Invalid(String),

    #[error("Result is not a finite number")]
    NotFinite,
}

impl From<meval::Error> for MathError {
    fn from(err: meval::Error) -> Self {
        match err {
            meval::Error::UnknownVariable(name) => Self::UnknownIdentifier(name),
            other => Self::Invalid(other.to_string()),
        }
    }
}

fn normalize(expr: &str) -> String {
    expr.trim()
        .replace("**", "^")
        .chars()
        .filter(|c| *c != '_')
        .map(|c| match c {
            '×' => '*',
            '÷' => '/',
            '−' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

fn check_nesting(expr: &str) -> Result<(), MathError> {
    let mut depth = 0usize;
    for c in expr.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(MathError::TooDeep(MAX_NESTING));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn context() -> Context<'static> {
    let mut ctx = Context::new();
    ctx.var("tau", std::f64::consts::TAU)
        .func("log", f64::ln)
        .func("log10", f64::log10)
        .func("log2", f64::log2);
    ctx
}

/// Evaluate a single-line arithmetic expression
pub fn evaluate(expr: &str) -> Result<f64, MathError> {
    let expr = normalize(expr);
    if expr.is_empty() {
        return Err(MathError::Empty);
    }
    check_nesting(&expr)?;

    let value = expr.parse::<Expr>()?.eval_with_context(context())?;
    if !value.is_finite() {
        return Err(MathError::NotFinite);
    }

    Ok(value)
}

/// Render a result the way people write numbers: integers without a
/// trailing `.0`, very small or very large magnitudes in scientific
/// notation, everything else with at most 10 fractional digits.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs();
    if !(1e-4..1e21).contains(&magnitude) {
        return format!("{value:e}");
    }
    if value.fract() == 0.0 {
        return format!("{value:.0}");
    }

    let rendered = format!("{value:.10}");
    match rendered.trim_end_matches('0').trim_end_matches('.') {
        "-0" => "0".to_string(),
        trimmed => trimmed.to_string(),
    }
}
