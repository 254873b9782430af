//! Inverse of the leverage model.
//!
//! Given a leverage target and a reserve's max LTV, find the fewest loops
//! that can reach the target without exceeding the LTV, then bisect the
//! borrow ratio for that loop count.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LoopError;
use crate::model::{leverage, SCALE};
use crate::plan::{LeverageRequest, LoopPlan, ReserveConstraint};

/// Solver bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Upper bound on loop count
    pub max_loop_count: u32,
    /// Accepted distance from the target (SCALE units)
    pub epsilon: u64,
    /// Bisection iteration budget
    pub max_iterations: u32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_loop_count: 40,
            epsilon: 100,
            max_iterations: 100,
        }
    }
}

/// Pure leverage solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeverageSolver {
    params: SolverParams,
}

impl LeverageSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Highest leverage reachable on a reserve within the loop bound.
    pub fn max_achievable(&self, max_ltv: u64) -> u64 {
        leverage(self.params.max_loop_count, max_ltv)
    }

    /// Solve a request against its reserve constraint.
    pub fn solve_request(
        &self,
        request: &LeverageRequest,
        constraint: &ReserveConstraint,
    ) -> Result<LoopPlan, LoopError> {
        if request.asset != constraint.asset {
            return Err(LoopError::validation(format!(
                "constraint for {} does not apply to {}",
                constraint.asset, request.asset
            )));
        }
        self.solve(request.target_leverage, constraint.max_ltv)
    }

    /// Find a plan whose leverage is within epsilon of `target`.
    pub fn solve(&self, target: u64, max_ltv: u64) -> Result<LoopPlan, LoopError> {
        if max_ltv >= SCALE {
            return Err(LoopError::validation(format!(
                "max LTV {} must be below {}",
                max_ltv, SCALE
            )));
        }
        if target < SCALE {
            return Err(LoopError::validation("leverage below 1x"));
        }
        if target == SCALE {
            return Ok(LoopPlan::new(0, 0));
        }
        if target <= SCALE + max_ltv {
            return Ok(LoopPlan::new(1, target - SCALE));
        }

        let first = (2..=self.params.max_loop_count)
            .find(|&n| leverage(n, max_ltv) >= target)
            .ok_or_else(|| LoopError::LeverageTooHigh {
                target,
                max_achievable: self.max_achievable(max_ltv),
                max_loop_count: self.params.max_loop_count,
            })?;

        // At high LTVs one ratio step can jump over the epsilon window, so a
        // deeper loop count with finer steps may still land on the target.
        let mut iterations = 0u32;
        let mut nearest: Option<(u32, u64)> = None;
        for loop_count in first..=self.params.max_loop_count {
            match self.bisect_ratio(target, loop_count, max_ltv) {
                Ok(ratio) => return Ok(LoopPlan::new(loop_count, ratio)),
                Err(miss) => {
                    iterations += miss.iterations;
                    if nearest.map_or(true, |(_, c)| miss.closest.abs_diff(target) < c.abs_diff(target)) {
                        nearest = Some((loop_count, miss.closest));
                    }
                }
            }
        }

        let (loop_count, closest) = nearest.unwrap_or((first, SCALE));
        Err(LoopError::Convergence {
            target,
            loop_count,
            iterations,
            closest,
        })
    }

    fn bisect_ratio(&self, target: u64, loop_count: u32, max_ltv: u64) -> Result<u64, Miss> {
        let epsilon = self.params.epsilon;
        let mut lo = 0u64;
        let mut hi = max_ltv;
        let mut closest = SCALE;
        let mut iterations = 0u32;

        while iterations < self.params.max_iterations {
            iterations += 1;
            let mid = lo + (hi - lo) / 2;
            let value = leverage(loop_count, mid);
            if value.abs_diff(target) < closest.abs_diff(target) {
                closest = value;
            }

            if value.abs_diff(target) <= epsilon {
                debug!(target, loop_count, ratio = mid, value, iterations, "Solved borrow ratio");
                return Ok(mid);
            }

            if value < target {
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
            if lo > hi {
                break;
            }
        }

        debug!(target, loop_count, closest, iterations, "No ratio within epsilon");
        Err(Miss {
            iterations,
            closest,
        })
    }
}

/// Bisection at one loop count that ended outside the epsilon window.
struct Miss {
    iterations: u32,
    closest: u64,
}
