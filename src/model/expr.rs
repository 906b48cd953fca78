use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Handle of a decision variable inside one [`ConstraintModel`](super::ConstraintModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above.
    pub upper: f64,
}

impl Variable {
    pub fn is_binary(&self) -> bool {
        self.kind == VarKind::Binary
    }
}

/// Affine expression `constant + Σ coefficient × variable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn var(id: VarId) -> Self {
        Self::term(id, 1.0)
    }

    pub fn term(id: VarId, coefficient: f64) -> Self {
        Self {
            terms: vec![(id, coefficient)],
            constant: 0.0,
        }
    }

    pub fn sum<I: IntoIterator<Item = VarId>>(ids: I) -> Self {
        Self {
            terms: ids.into_iter().map(|id| (id, 1.0)).collect(),
            constant: 0.0,
        }
    }

    /// Constant value when the expression has no variable terms.
    pub fn as_constant(&self) -> Option<f64> {
        if self.terms.iter().all(|(_, c)| *c == 0.0) {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn scale(mut self, factor: f64) -> Self {
        for (_, c) in &mut self.terms {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }

    /// Evaluate against a full assignment indexed by [`VarId`].
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms.iter().fold(self.constant, |acc, (id, c)| {
            acc + c * values.get(id.0).copied().unwrap_or(f64::NAN)
        })
    }

    pub fn max_var_index(&self) -> Option<usize> {
        self.terms.iter().map(|(id, _)| id.0).max()
    }
}

impl From<VarId> for LinExpr {
    fn from(id: VarId) -> Self {
        LinExpr::var(id)
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl AddAssign<LinExpr> for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> LinExpr {
        self += rhs.into();
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> LinExpr {
        self += rhs.into().neg();
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self.scale(-1.0)
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(self, rhs: f64) -> LinExpr {
        self.scale(rhs)
    }
}
