//! Account-wide collateral health check.
//!
//! The guard looks at every reserve an account participates in, not only
//! the one being looped, so an existing position elsewhere tightens what a
//! new loop may borrow.

use alloy::primitives::U256;
use looper_chain::AccountSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LoopError;
use crate::math::{base_value_wad, calculate_hf_wad, f64_to_wad, wad_to_f64, BPS_DENOMINATOR, WAD};
use crate::model::SCALE;

/// Guard thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardParams {
    /// Lowest health factor a settled run may leave (1.0 = liquidation boundary)
    pub min_health_factor: f64,
}

impl Default for GuardParams {
    fn default() -> Self {
        Self {
            min_health_factor: 1.0,
        }
    }
}

/// Aggregate health of an account, all values in WAD base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub collateral_wad: U256,
    pub debt_wad: U256,
    pub borrow_capacity_wad: U256,
    /// `U256::MAX` when the account has no debt
    pub health_factor_wad: U256,
}

impl HealthReport {
    /// Health factor for display.
    pub fn health_factor(&self) -> Option<f64> {
        if self.health_factor_wad == U256::MAX {
            None
        } else {
            Some(wad_to_f64(self.health_factor_wad))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollateralHealthGuard {
    min_health_factor_wad: U256,
}

impl Default for CollateralHealthGuard {
    fn default() -> Self {
        Self::new(WAD)
    }
}

impl CollateralHealthGuard {
    pub fn new(min_health_factor_wad: U256) -> Self {
        Self {
            min_health_factor_wad,
        }
    }

    pub fn from_params(params: &GuardParams) -> Self {
        Self::new(f64_to_wad(params.min_health_factor))
    }

    pub fn min_health_factor_wad(&self) -> U256 {
        self.min_health_factor_wad
    }

    /// Compute capacity and health factor across every reserve in the snapshot.
    pub fn assess(&self, snapshot: &AccountSnapshot) -> HealthReport {
        let mut collateral = U256::ZERO;
        let mut ltv_weighted = U256::ZERO;
        let mut threshold_weighted = U256::ZERO;
        let mut debt = U256::ZERO;

        for reserve in &snapshot.reserves {
            if reserve.collateral_enabled && !reserve.collateral.is_zero() {
                let value = base_value_wad(reserve.collateral, reserve.price, reserve.decimals);
                collateral += value;
                ltv_weighted += value * U256::from(reserve.ltv_bps);
                threshold_weighted += value * U256::from(reserve.liquidation_threshold_bps);
            }
            if !reserve.debt.is_zero() {
                debt += base_value_wad(reserve.debt, reserve.price, reserve.decimals);
            }
        }

        HealthReport {
            collateral_wad: collateral,
            debt_wad: debt,
            borrow_capacity_wad: ltv_weighted / BPS_DENOMINATOR,
            health_factor_wad: calculate_hf_wad(threshold_weighted, debt),
        }
    }

    /// Assess and reject an account below the health factor floor.
    ///
    /// When the run took on debt (`borrowed`) the account must also stay
    /// within its LTV borrow capacity, matching the pool's borrow-time check.
    /// A deposit-only run is judged by the floor alone. An account without
    /// debt always passes.
    pub fn check(
        &self,
        snapshot: &AccountSnapshot,
        borrowed: bool,
    ) -> Result<HealthReport, LoopError> {
        let report = self.assess(snapshot);
        debug!(
            account = %snapshot.account,
            collateral = wad_to_f64(report.collateral_wad),
            debt = wad_to_f64(report.debt_wad),
            capacity = wad_to_f64(report.borrow_capacity_wad),
            hf = ?report.health_factor(),
            "Health check"
        );

        if report.debt_wad.is_zero() {
            return Ok(report);
        }
        let over_capacity = borrowed && report.debt_wad > report.borrow_capacity_wad;
        if over_capacity || report.health_factor_wad < self.min_health_factor_wad
        {
            return Err(LoopError::InsufficientCollateral {
                debt_wad: report.debt_wad,
                borrow_capacity_wad: report.borrow_capacity_wad,
                health_factor_wad: report.health_factor_wad,
                min_health_factor_wad: self.min_health_factor_wad,
            });
        }
        Ok(report)
    }

    /// Largest single borrow that keeps `principal` plus the redeposited
    /// borrow within `max_ltv`: `principal * max_ltv / (SCALE - max_ltv)`.
    pub fn max_single_shot_borrow(principal: U256, max_ltv: u64) -> Result<U256, LoopError> {
        if max_ltv >= SCALE {
            return Err(LoopError::validation(format!(
                "max LTV {} must be below {}",
                max_ltv, SCALE
            )));
        }
        Ok(principal * U256::from(max_ltv) / U256::from(SCALE - max_ltv))
    }
}
