use super::{ErrorSink, Vars};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    /// Chained comparisons, e.g. `1 < x < 10`: every adjacent pair must hold.
    Chain(Box<Expr>, Vec<(CmpOp, Expr)>),
    Bool(BoolOp, Box<Expr>, Box<Expr>),
}

pub fn eval(expr: &Expr, vars: &Vars, errors: &mut ErrorSink) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Var(name) => *vars.get(name).unwrap_or(&0.0),
        Expr::Neg(inner) => -eval(inner, vars, errors),
        Expr::Not(inner) => {
            if eval(inner, vars, errors) == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Expr::Bin(op, lhs, rhs) => {
            let l = eval(lhs, vars, errors);
            let r = eval(rhs, vars, errors);
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        0.0
                    } else {
                        l / r
                    }
                }
                BinOp::FloorDiv => {
                    if r == 0.0 {
                        0.0
                    } else {
                        (l / r).floor()
                    }
                }
            }
        }
        Expr::Chain(first, rest) => {
            let mut lhs_val = eval(first, vars, errors);
            for (op, rhs_expr) in rest {
                let rhs_val = eval(rhs_expr, vars, errors);
                let holds = match op {
                    CmpOp::Lt => lhs_val < rhs_val,
                    CmpOp::Le => lhs_val <= rhs_val,
                    CmpOp::Gt => lhs_val > rhs_val,
                    CmpOp::Ge => lhs_val >= rhs_val,
                    CmpOp::Eq => lhs_val == rhs_val,
                    CmpOp::NotEq => lhs_val != rhs_val,
                };
                if !holds {
                    return 0.0;
                }
                lhs_val = rhs_val;
            }
            1.0
        }
        Expr::Bool(op, lhs, rhs) => {
            let l = eval(lhs, vars, errors);
            match op {
                BoolOp::And => {
                    if l == 0.0 {
                        0.0
                    } else if eval(rhs, vars, errors) != 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                BoolOp::Or => {
                    if l != 0.0 {
                        1.0
                    } else if eval(rhs, vars, errors) != 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            }
        }
    }
}
