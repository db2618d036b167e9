//! C1 — Expression Evaluator. A sandboxed, bounded arithmetic/comparison/
//! boolean expression language with dice macros and named-variable lookup.
//! Never panics into callers: syntax and type errors return 0.0 and push a
//! message into the supplied [`ErrorSink`] instead.

mod ast;
mod dice;
mod lexer;
mod parser;

use crate::rng::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ExprLimits {
    pub dice_max_count: u32,
    pub dice_max_sides: u32,
    pub formula_max_len: usize,
}

impl Default for ExprLimits {
    fn default() -> Self {
        Self {
            dice_max_count: 20,
            dice_max_sides: 1000,
            formula_max_len: 500,
        }
    }
}

#[derive(Debug, Default)]
pub struct ErrorSink(Vec<String>);

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

pub type Vars = HashMap<String, f64>;

/// Evaluate `expr` against `vars`, recording any failure into `errors` and
/// returning `0.0` rather than propagating it. Dice macros (`NdM`) are
/// pre-expanded using `rng` before parsing.
pub fn evaluate(
    expr: &str,
    vars: &Vars,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
    errors: &mut ErrorSink,
) -> f64 {
    if expr.len() > limits.formula_max_len {
        errors.push(format!(
            "expression exceeds max length of {} characters",
            limits.formula_max_len
        ));
        return 0.0;
    }
    let expanded = dice::expand_dice(expr, limits, rng, errors);
    let tokens = match lexer::lex(&expanded) {
        Ok(t) => t,
        Err(e) => {
            errors.push(e);
            return 0.0;
        }
    };
    let tree = match parser::parse(tokens) {
        Ok(t) => t,
        Err(e) => {
            errors.push(e);
            return 0.0;
        }
    };
    ast::eval(&tree, vars, errors)
}

/// Boolean convenience wrapper: non-zero is truthy, matching the 0/1
/// encoding comparisons and boolean operators produce.
pub fn evaluate_bool(
    expr: &str,
    vars: &Vars,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
    errors: &mut ErrorSink,
) -> bool {
    evaluate(expr, vars, limits, rng, errors) != 0.0
}

pub use ast::Expr;
pub use lexer::lex;
pub use parser::parse;
