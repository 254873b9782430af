//! Engine error type.

use alloy::primitives::{Address, U256};
use looper_chain::PoolError;
use thiserror::Error;

/// Errors returned by the solver, guard and executor.
///
/// Every variant raised after flash liquidity is acquired has already been
/// rolled back by the time the caller sees it, unless it is
/// [`LoopError::RollbackFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(
        "no borrow ratio within epsilon of {target} at {loop_count} loops after {iterations} iterations (closest {closest})"
    )]
    Convergence {
        target: u64,
        loop_count: u32,
        iterations: u32,
        closest: u64,
    },

    #[error("target leverage {target} exceeds {max_achievable} achievable in {max_loop_count} loops")]
    LeverageTooHigh {
        target: u64,
        max_achievable: u64,
        max_loop_count: u32,
    },

    #[error("reserve {asset} not usable (active: {active}, borrowing enabled: {borrowing_enabled})")]
    InactiveReserve {
        asset: Address,
        active: bool,
        borrowing_enabled: bool,
    },

    #[error("borrow delegation on {asset} too low: required {required}, available {available}")]
    InsufficientDelegation {
        asset: Address,
        required: U256,
        available: U256,
    },

    #[error(
        "insufficient collateral: debt {debt_wad}, borrow capacity {borrow_capacity_wad}, health factor {health_factor_wad} (min {min_health_factor_wad})"
    )]
    InsufficientCollateral {
        debt_wad: U256,
        borrow_capacity_wad: U256,
        health_factor_wad: U256,
        min_health_factor_wad: U256,
    },

    #[error("flash settlement left {remaining} of {expected} unaccounted")]
    Settlement { expected: U256, remaining: U256 },

    #[error("rollback failed after {cause}: {rollback}")]
    RollbackFailed {
        cause: Box<LoopError>,
        rollback: PoolError,
    },

    #[error(transparent)]
    Pool(PoolError),
}

impl From<PoolError> for LoopError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InsufficientAllowance {
                asset,
                required,
                available,
            } => LoopError::InsufficientDelegation {
                asset,
                required,
                available,
            },
            PoolError::ReserveInactive(asset) => LoopError::InactiveReserve {
                asset,
                active: false,
                borrowing_enabled: false,
            },
            PoolError::BorrowingDisabled(asset) => LoopError::InactiveReserve {
                asset,
                active: true,
                borrowing_enabled: false,
            },
            other => LoopError::Pool(other),
        }
    }
}

impl LoopError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LoopError::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_mapping() {
        let err: LoopError = PoolError::InsufficientAllowance {
            asset: Address::ZERO,
            required: U256::from(10u64),
            available: U256::from(3u64),
        }
        .into();
        assert!(matches!(err, LoopError::InsufficientDelegation { .. }));

        let err: LoopError = PoolError::BorrowingDisabled(Address::ZERO).into();
        assert_eq!(
            err,
            LoopError::InactiveReserve {
                asset: Address::ZERO,
                active: true,
                borrowing_enabled: false,
            }
        );

        let err: LoopError = PoolError::UnknownTicket(7).into();
        assert_eq!(err, LoopError::Pool(PoolError::UnknownTicket(7)));
    }

    #[test]
    fn test_messages_carry_numbers() {
        let err = LoopError::LeverageTooHigh {
            target: 60_000,
            max_achievable: 49_990,
            max_loop_count: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("60000"));
        assert!(msg.contains("49990"));
    }
}
