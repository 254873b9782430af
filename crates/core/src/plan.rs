//! Plans, requests and the tranche schedule both call shapes normalize into.

use alloy::primitives::{Address, U256};
use looper_chain::ReserveData;
use serde::{Deserialize, Serialize};

use crate::error::LoopError;
use crate::math::apply_bps;
use crate::model::{leverage, SCALE};

/// Loop count and per-loop borrow ratio realizing a leverage target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopPlan {
    pub loop_count: u32,
    /// Fraction of the previous tranche borrowed each loop (SCALE units)
    pub borrow_ratio: u64,
}

impl LoopPlan {
    pub fn new(loop_count: u32, borrow_ratio: u64) -> Self {
        Self {
            loop_count,
            borrow_ratio,
        }
    }

    /// Leverage this plan realizes (SCALE units).
    pub fn leverage(&self) -> u64 {
        leverage(self.loop_count, self.borrow_ratio)
    }
}

/// A caller asking for `target_leverage` on `principal` of `asset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageRequest {
    pub asset: Address,
    pub principal: U256,
    /// Desired exposure (SCALE units, 10000 = 1x)
    pub target_leverage: u64,
}

impl LeverageRequest {
    pub fn new(asset: Address, principal: U256, target_leverage: u64) -> Result<Self, LoopError> {
        if principal.is_zero() {
            return Err(LoopError::validation("principal must be positive"));
        }
        if target_leverage < SCALE {
            return Err(LoopError::validation("leverage below 1x"));
        }
        Ok(Self {
            asset,
            principal,
            target_leverage,
        })
    }
}

/// Borrow ceiling of a reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConstraint {
    pub asset: Address,
    /// Maximum loan-to-value (SCALE units)
    pub max_ltv: u64,
}

impl ReserveConstraint {
    pub fn new(asset: Address, max_ltv: u64) -> Result<Self, LoopError> {
        if max_ltv >= SCALE {
            return Err(LoopError::validation(format!(
                "max LTV {} must be below {}",
                max_ltv, SCALE
            )));
        }
        Ok(Self { asset, max_ltv })
    }

    pub fn from_reserve(reserve: &ReserveData) -> Result<Self, LoopError> {
        Self::new(reserve.asset, reserve.ltv_bps as u64)
    }
}

/// Absolute tranche amounts `a_0..a_n` of one run.
///
/// `a_0` is the caller's principal; every later tranche is borrowed and
/// deposited again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    tranches: Vec<U256>,
}

impl Schedule {
    /// Tranches of a ratio/loop-count plan: `a_i = a_{i-1} * r / SCALE`.
    pub fn from_plan(principal: U256, plan: &LoopPlan) -> Result<Self, LoopError> {
        let ratio = U256::from(plan.borrow_ratio);
        let scale = U256::from(SCALE);

        let mut tranches = Vec::with_capacity(plan.loop_count as usize + 1);
        tranches.push(principal);
        let mut each = principal;
        for _ in 0..plan.loop_count {
            each = each
                .checked_mul(ratio)
                .ok_or_else(|| LoopError::validation("tranche amount overflows"))?
                / scale;
            tranches.push(each);
        }
        Ok(Self { tranches })
    }

    /// Single-shot schedule: deposit principal, borrow and redeposit `borrow_amount`.
    pub fn explicit(principal: U256, borrow_amount: U256) -> Self {
        Self {
            tranches: vec![principal, borrow_amount],
        }
    }

    pub fn principal(&self) -> U256 {
        self.tranches[0]
    }

    pub fn tranches(&self) -> &[U256] {
        &self.tranches
    }

    /// Number of borrow cycles.
    pub fn loop_count(&self) -> usize {
        self.tranches.len() - 1
    }

    /// Sum of borrowed tranches `a_1..a_n`, also the flash amount.
    pub fn total_borrow(&self) -> U256 {
        self.tranches[1..].iter().fold(U256::ZERO, |acc, a| acc + *a)
    }

    /// Sum of every tranche `a_0..a_n`.
    pub fn total_deposit(&self) -> U256 {
        self.principal() + self.total_borrow()
    }

    /// Truncating flash fee on the total borrow.
    pub fn flash_fee(&self, fee_bps: u16) -> U256 {
        apply_bps(self.total_borrow(), fee_bps as u64)
    }
}
