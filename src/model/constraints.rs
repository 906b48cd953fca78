use serde::{Deserialize, Serialize};

use super::expr::{LinExpr, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `expr (sense) rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn le(expr: impl Into<LinExpr>, rhs: f64) -> Self {
        Self {
            expr: expr.into(),
            sense: Sense::Le,
            rhs,
        }
    }

    pub fn ge(expr: impl Into<LinExpr>, rhs: f64) -> Self {
        Self {
            expr: expr.into(),
            sense: Sense::Ge,
            rhs,
        }
    }

    pub fn equals(expr: impl Into<LinExpr>, rhs: f64) -> Self {
        Self {
            expr: expr.into(),
            sense: Sense::Eq,
            rhs,
        }
    }

    /// `lhs (sense) rhs` with all constants moved to the right-hand side.
    pub fn compare(lhs: impl Into<LinExpr>, sense: Sense, rhs: impl Into<LinExpr>) -> Self {
        let diff = lhs.into() - rhs.into();
        Self {
            rhs: -diff.constant,
            expr: LinExpr {
                terms: diff.terms,
                constant: 0.0,
            },
            sense,
        }
    }

    /// Amount by which an assignment violates the constraint; zero when
    /// satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.eval(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// Piecewise-linear function given by its breakpoints. Outside the first
/// and last breakpoint the curve is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinear {
    points: Vec<(f64, f64)>,
}

impl PiecewiseLinear {
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn eval(&self, x: f64) -> f64 {
        let Some(&(x0, y0)) = self.points.first() else {
            return 0.0;
        };
        if x <= x0 {
            return y0;
        }
        for w in self.points.windows(2) {
            let (xa, ya) = w[0];
            let (xb, yb) = w[1];
            if x <= xb {
                return ya + (yb - ya) * (x - xa) / (xb - xa);
            }
        }
        self.points.last().map(|p| p.1).unwrap_or(y0)
    }

    /// Same function with flat breakpoints added so that its table spans
    /// `[lo, hi]`. Solver encodings need the argument to stay inside the table.
    pub fn covering(&self, lo: f64, hi: f64) -> Self {
        let mut points = self.points.clone();
        if let Some(&(x0, y0)) = points.first() {
            if lo < x0 {
                points.insert(0, (lo, y0));
            }
        }
        if let Some(&(xn, yn)) = points.last() {
            if hi > xn {
                points.push((hi, yn));
            }
        }
        Self { points }
    }
}

/// One constraint of the model. Non-linear forms are kept symbolic; each
/// solving backend lowers them its own way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Linear {
        name: String,
        inner: LinearConstraint,
    },
    /// `target = min(args)`
    Min {
        name: String,
        target: VarId,
        args: Vec<LinExpr>,
    },
    /// `target = max(args)`
    Max {
        name: String,
        target: VarId,
        args: Vec<LinExpr>,
    },
    /// `flag == active_when` implies `inner`.
    Indicator {
        name: String,
        flag: VarId,
        active_when: bool,
        inner: LinearConstraint,
    },
    /// `y = curve(x)`
    Piecewise {
        name: String,
        x: LinExpr,
        y: VarId,
        curve: PiecewiseLinear,
    },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Linear { name, .. }
            | Constraint::Min { name, .. }
            | Constraint::Max { name, .. }
            | Constraint::Indicator { name, .. }
            | Constraint::Piecewise { name, .. } => name,
        }
    }

    pub fn violation(&self, values: &[f64]) -> f64 {
        let value_of = |id: &VarId| values.get(id.0).copied().unwrap_or(f64::NAN);
        match self {
            Constraint::Linear { inner, .. } => inner.violation(values),
            Constraint::Min { target, args, .. } => {
                let m = args
                    .iter()
                    .map(|a| a.eval(values))
                    .fold(f64::INFINITY, f64::min);
                (value_of(target) - m).abs()
            }
            Constraint::Max { target, args, .. } => {
                let m = args
                    .iter()
                    .map(|a| a.eval(values))
                    .fold(f64::NEG_INFINITY, f64::max);
                (value_of(target) - m).abs()
            }
            Constraint::Indicator {
                flag,
                active_when,
                inner,
                ..
            } => {
                let on = value_of(flag) > 0.5;
                if on == *active_when {
                    inner.violation(values)
                } else {
                    0.0
                }
            }
            Constraint::Piecewise { x, y, curve, .. } => {
                (value_of(y) - curve.eval(x.eval(values))).abs()
            }
        }
    }
}

/// A constraint or bound an assignment fails to satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub name: String,
    pub amount: f64,
}
