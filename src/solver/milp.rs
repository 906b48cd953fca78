//! MILP (Mixed-Integer Linear Programming) backend
//!
//! Lowers the constraint model to a mixed-integer program and solves it
//! with CBC through `good_lp`. Non-linear constraint forms are linearised:
//! - `min`/`max`: one selector binary per argument with big-M bounds
//! - indicators: big-M relaxation on the inactive side
//! - piecewise curves: convex-combination weights with segment binaries

#[cfg(feature = "optimization")]
use std::time::Instant;

#[cfg(feature = "optimization")]
use good_lp::{
    coin_cbc, constraint, variable, Expression, ProblemVariables, ResolutionError, Solution as _,
    SolverModel, Variable,
};
#[cfg(feature = "optimization")]
use tracing::{debug, warn};

use super::{Solution, SolveError, SolveLimits, SolveStatus, SolvingService};
use crate::model::ConstraintModel;
#[cfg(feature = "optimization")]
use crate::model::{Constraint, LinExpr, LinearConstraint, Sense};

/// Exact backend built on `good_lp` + CBC.
#[derive(Debug, Clone, Default)]
pub struct MilpSolver;

impl MilpSolver {
    pub fn new() -> Self {
        Self
    }

    #[cfg(feature = "optimization")]
    fn solve_milp(
        &self,
        model: &ConstraintModel,
        limits: &SolveLimits,
    ) -> Result<Solution, SolveError> {
        let start = Instant::now();
        let big_m = model.big_m;

        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .variables()
            .iter()
            .map(|v| {
                let mut def = variable().min(v.lower);
                if v.upper.is_finite() {
                    def = def.max(v.upper);
                }
                if v.is_binary() {
                    def = def.binary();
                }
                problem.add(def)
            })
            .collect();

        let lower = |e: &LinExpr| -> Expression {
            let mut out = Expression::from(e.constant);
            for (id, c) in &e.terms {
                out += *c * vars[id.0];
            }
            out
        };

        let mut rows: Vec<good_lp::Constraint> = Vec::new();
        let linear = |inner: &LinearConstraint, slack: Expression| -> Vec<good_lp::Constraint> {
            let lhs = lower(&inner.expr);
            match inner.sense {
                Sense::Le => vec![constraint!(lhs - slack <= inner.rhs)],
                Sense::Ge => vec![constraint!(lhs + slack >= inner.rhs)],
                Sense::Eq => vec![
                    constraint!(lhs.clone() - slack.clone() <= inner.rhs),
                    constraint!(lhs + slack >= inner.rhs),
                ],
            }
        };

        for c in model.constraints() {
            match c {
                Constraint::Linear { inner, .. } => {
                    rows.extend(linear(inner, Expression::from(0.0)));
                }
                Constraint::Min { target, args, .. } | Constraint::Max { target, args, .. } => {
                    let is_min = matches!(c, Constraint::Min { .. });
                    let t = vars[target.0];
                    if let [only] = args.as_slice() {
                        rows.push(constraint!(t == lower(only)));
                        continue;
                    }
                    let mut selector = Expression::from(0.0);
                    for arg in args {
                        let a = lower(arg);
                        let z = problem.add(variable().binary());
                        selector += z;
                        if is_min {
                            rows.push(constraint!(t <= a.clone()));
                            rows.push(constraint!(t >= a - big_m + big_m * z));
                        } else {
                            rows.push(constraint!(t >= a.clone()));
                            rows.push(constraint!(t <= a + big_m - big_m * z));
                        }
                    }
                    rows.push(constraint!(selector == 1.0));
                }
                Constraint::Indicator {
                    flag,
                    active_when,
                    inner,
                    ..
                } => {
                    let b = vars[flag.0];
                    let inactive = if *active_when {
                        Expression::from(big_m) - big_m * b
                    } else {
                        Expression::from(0.0) + big_m * b
                    };
                    rows.extend(linear(inner, inactive));
                }
                Constraint::Piecewise { x, y, curve, .. } => {
                    let points = curve.points();
                    if points.len() < 2 {
                        return Err(SolveError::MalformedModel(format!(
                            "piecewise constraint '{}' has fewer than two breakpoints",
                            c.name()
                        )));
                    }
                    let lambdas: Vec<Variable> = points
                        .iter()
                        .map(|_| problem.add(variable().min(0.0).max(1.0)))
                        .collect();
                    let segments: Vec<Variable> = (0..points.len() - 1)
                        .map(|_| problem.add(variable().binary()))
                        .collect();

                    let mut weight = Expression::from(0.0);
                    let mut x_sum = Expression::from(0.0);
                    let mut y_sum = Expression::from(0.0);
                    for (l, (px, py)) in lambdas.iter().zip(points) {
                        weight += *l;
                        x_sum += *px * *l;
                        y_sum += *py * *l;
                    }
                    let mut seg_sum = Expression::from(0.0);
                    for s in &segments {
                        seg_sum += *s;
                    }
                    rows.push(constraint!(weight == 1.0));
                    rows.push(constraint!(seg_sum == 1.0));
                    rows.push(constraint!(lower(x) == x_sum));
                    rows.push(constraint!(vars[y.0] == y_sum));
                    for (i, l) in lambdas.iter().enumerate() {
                        let mut adjacent = Expression::from(0.0);
                        if i > 0 {
                            adjacent += segments[i - 1];
                        }
                        if i < segments.len() {
                            adjacent += segments[i];
                        }
                        rows.push(constraint!(*l <= adjacent));
                    }
                }
            }
        }

        let objective = lower(model.objective());
        let mut lp = problem.minimise(objective).using(coin_cbc);
        lp.set_parameter("seconds", &limits.time_limit.as_secs_f64().to_string());
        lp.set_parameter("ratioGap", &limits.mip_gap.to_string());
        lp.set_parameter("log", "0");
        for row in rows {
            lp.add_constraint(row);
        }

        debug!(
            model = %model.name,
            variables = model.num_vars(),
            constraints = model.constraints().len(),
            "solving MILP"
        );

        match lp.solve() {
            Ok(solution) => {
                let cbc = solution.model();
                let outcome = CbcOutcome {
                    proven_optimal: cbc.is_proven_optimal(),
                    time_limit_reached: cbc.is_seconds_limit_reached(),
                    objective: cbc.obj_value(),
                    bound: cbc.best_possible_value(),
                };
                let (status, gap) = outcome.classify();
                if status == SolveStatus::TimeLimit {
                    warn!(model = %model.name, ?gap, "MILP stopped at the time limit");
                }
                let values: Vec<f64> = vars.iter().map(|v| solution.value(*v)).collect();
                Ok(Solution {
                    status,
                    objective: model.objective_value(&values),
                    gap,
                    runtime: start.elapsed(),
                    values,
                })
            }
            Err(ResolutionError::Infeasible) => Ok(Solution::infeasible(start.elapsed())),
            // CBC stopped before finding an incumbent
            Err(ResolutionError::Other(reason)) if reason == "Stopped" => {
                warn!(model = %model.name, "MILP stopped without a solution");
                Ok(Solution::without_values(SolveStatus::TimeLimit, start.elapsed()))
            }
            Err(e) => Err(SolveError::Backend(e.to_string())),
        }
    }
}

/// Relative gap below which a proven solve is reported as optimal.
#[cfg_attr(not(feature = "optimization"), allow(dead_code))]
const OPTIMALITY_GAP: f64 = 1e-6;

/// Termination facts CBC reports alongside a returned solution.
#[cfg_attr(not(feature = "optimization"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq)]
struct CbcOutcome {
    proven_optimal: bool,
    time_limit_reached: bool,
    objective: f64,
    bound: f64,
}

#[cfg_attr(not(feature = "optimization"), allow(dead_code))]
impl CbcOutcome {
    /// Distance between incumbent and best bound, relative to the incumbent
    /// (floored at one so near-zero objectives stay meaningful).
    fn relative_gap(&self) -> Option<f64> {
        if !self.objective.is_finite() || !self.bound.is_finite() {
            return None;
        }
        Some((self.objective - self.bound).abs() / self.objective.abs().max(1.0))
    }

    fn classify(&self) -> (SolveStatus, Option<f64>) {
        let gap = match self.relative_gap() {
            Some(g) => Some(g),
            None if self.proven_optimal && !self.time_limit_reached => Some(0.0),
            None => None,
        };
        let status = if self.time_limit_reached {
            SolveStatus::TimeLimit
        } else if self.proven_optimal && gap.is_some_and(|g| g <= OPTIMALITY_GAP) {
            SolveStatus::Optimal
        } else {
            SolveStatus::Suboptimal
        };
        (status, gap)
    }
}

impl SolvingService for MilpSolver {
    fn name(&self) -> &str {
        "milp"
    }

    #[cfg(feature = "optimization")]
    fn solve(&self, model: &ConstraintModel, limits: &SolveLimits) -> Result<Solution, SolveError> {
        self.solve_milp(model, limits)
    }

    #[cfg(not(feature = "optimization"))]
    fn solve(&self, _model: &ConstraintModel, _limits: &SolveLimits) -> Result<Solution, SolveError> {
        Err(SolveError::BackendUnavailable(
            "milp (build with the 'optimization' feature)".to_string(),
        ))
    }
}

#[cfg(test)]
mod outcome_tests {
    use super::*;

    fn outcome(
        proven_optimal: bool,
        time_limit_reached: bool,
        objective: f64,
        bound: f64,
    ) -> CbcOutcome {
        CbcOutcome {
            proven_optimal,
            time_limit_reached,
            objective,
            bound,
        }
    }

    #[test]
    fn test_closed_gap_is_optimal() {
        let (status, gap) = outcome(true, false, 120.0, 120.0).classify();
        assert_eq!(status, SolveStatus::Optimal);
        assert_eq!(gap, Some(0.0));
    }

    #[test]
    fn test_stop_at_ratio_gap_is_not_optimal() {
        let (status, gap) = outcome(true, false, 100.0, 99.0).classify();
        assert_eq!(status, SolveStatus::Suboptimal);
        assert!((gap.unwrap() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_time_limit_keeps_incumbent_gap() {
        let (status, gap) = outcome(false, true, 50.0, 40.0).classify();
        assert_eq!(status, SolveStatus::TimeLimit);
        assert!((gap.unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_missing_bound_leaves_gap_unknown() {
        let (status, gap) = outcome(false, true, 50.0, f64::NEG_INFINITY).classify();
        assert_eq!(status, SolveStatus::TimeLimit);
        assert_eq!(gap, None);

        let (status, gap) = outcome(true, false, 50.0, f64::NAN).classify();
        assert_eq!(status, SolveStatus::Optimal);
        assert_eq!(gap, Some(0.0));
    }

    #[test]
    fn test_gap_floored_near_zero_objective() {
        let (_, gap) = outcome(true, false, 1e-4, 0.0).classify();
        assert!((gap.unwrap() - 1e-4).abs() < 1e-15);
    }
}
