use serde::{Deserialize, Serialize};

use super::constraints::{Constraint, LinearConstraint, PiecewiseLinear, Sense, Violation};
use super::expr::{LinExpr, VarId, VarKind, Variable};
use super::scenario::{ModelLayout, ScenarioFrame};

/// Solver-neutral optimisation model of one scenario.
///
/// Holds the variables, the constraints and a minimisation objective, plus
/// the scenario frame and variable layout so that any backend can read the
/// solution back as allocation records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintModel {
    pub name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
    /// Bound used by backends that linearise min/max/indicator constraints.
    pub big_m: f64,
    pub frame: ScenarioFrame,
    pub layout: ModelLayout,
}

impl ConstraintModel {
    pub fn new(name: impl Into<String>, frame: ScenarioFrame, big_m: f64) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: LinExpr::zero(),
            big_m,
            frame,
            layout: ModelLayout::default(),
        }
    }

    pub fn add_var(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            kind: VarKind::Continuous,
            lower,
            upper,
        });
        id
    }

    /// Continuous variable with a zero lower bound and no upper bound.
    pub fn add_nonneg(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, 0.0, f64::INFINITY)
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: 1.0,
        });
        id
    }

    pub fn add_linear(&mut self, name: impl Into<String>, inner: LinearConstraint) {
        self.constraints.push(Constraint::Linear {
            name: name.into(),
            inner,
        });
    }

    /// `lhs == rhs`
    pub fn add_eq(&mut self, name: impl Into<String>, lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) {
        self.add_linear(name, LinearConstraint::compare(lhs, Sense::Eq, rhs));
    }

    /// `lhs <= rhs`
    pub fn add_le(&mut self, name: impl Into<String>, lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) {
        self.add_linear(name, LinearConstraint::compare(lhs, Sense::Le, rhs));
    }

    pub fn add_min(&mut self, name: impl Into<String>, target: VarId, args: Vec<LinExpr>) {
        self.constraints.push(Constraint::Min {
            name: name.into(),
            target,
            args,
        });
    }

    pub fn add_max(&mut self, name: impl Into<String>, target: VarId, args: Vec<LinExpr>) {
        self.constraints.push(Constraint::Max {
            name: name.into(),
            target,
            args,
        });
    }

    pub fn add_indicator(
        &mut self,
        name: impl Into<String>,
        flag: VarId,
        active_when: bool,
        inner: LinearConstraint,
    ) {
        self.constraints.push(Constraint::Indicator {
            name: name.into(),
            flag,
            active_when,
            inner,
        });
    }

    pub fn add_piecewise(&mut self, name: impl Into<String>, x: LinExpr, y: VarId, curve: PiecewiseLinear) {
        self.constraints.push(Constraint::Piecewise {
            name: name.into(),
            x,
            y,
            curve,
        });
    }

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables.iter().filter(|v| v.is_binary()).count()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.eval(values)
    }

    /// Every bound or constraint the assignment violates by more than `tol`.
    pub fn check(&self, values: &[f64], tol: f64) -> Vec<Violation> {
        let mut out = Vec::new();
        if values.len() != self.variables.len() {
            out.push(Violation {
                name: format!(
                    "assignment has {} values for {} variables",
                    values.len(),
                    self.variables.len()
                ),
                amount: f64::INFINITY,
            });
            return out;
        }

        for (var, &v) in self.variables.iter().zip(values) {
            let amount = if v.is_nan() {
                f64::INFINITY
            } else {
                (var.lower - v).max(v - var.upper).max(0.0)
            };
            if amount > tol {
                out.push(Violation {
                    name: format!("bound:{}", var.name),
                    amount,
                });
            }
            if var.is_binary() && (v - v.round()).abs() > tol {
                out.push(Violation {
                    name: format!("integrality:{}", var.name),
                    amount: (v - v.round()).abs(),
                });
            }
        }

        for c in &self.constraints {
            let amount = c.violation(values);
            if !(amount <= tol) {
                out.push(Violation {
                    name: c.name().to_string(),
                    amount,
                });
            }
        }
        out
    }

    /// Shorthand for `check(values, tol).is_empty()`.
    pub fn is_feasible(&self, values: &[f64], tol: f64) -> bool {
        self.check(values, tol).is_empty()
    }
}
