//! U256 fixed-point helpers for collateral valuation.
//!
//! Values are carried in 18-decimal WAD base-currency units; oracle prices
//! carry 8 decimals and basis-point parameters are scaled by 10000.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Oracle price decimals (8)
pub const PRICE_DECIMALS: u8 = 8;

/// Power of 10 as U256.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(10u128.pow(exp as u32))
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Value of a token amount in WAD base-currency units.
///
/// Formula: `amount * price * 10^18 / (10^decimals * 10^8)`
///
/// Example: 1000 USDC (6 decimals) at $1 price = 1000 * 10^18 WAD
#[inline(always)]
pub fn base_value_wad(amount: U256, price: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }

    let scale_adjustment = 18i32 - decimals as i32 - PRICE_DECIMALS as i32;
    if scale_adjustment >= 0 {
        amount * price * pow10(scale_adjustment as u8)
    } else {
        (amount * price) / pow10((-scale_adjustment) as u8)
    }
}

/// Apply a basis-point weight: `value * bps / 10000`.
#[inline(always)]
pub fn apply_bps(value: U256, bps: u64) -> U256 {
    value * U256::from(bps) / BPS_DENOMINATOR
}

/// Health factor in WAD from a basis-point weighted collateral sum.
///
/// `HF = weighted_collateral * WAD / (debt * 10000)`; the weighted sum is
/// divided exactly once. Returns `U256::MAX` when debt is zero.
#[inline(always)]
pub fn calculate_hf_wad(threshold_weighted_collateral: U256, debt_wad: U256) -> U256 {
    if debt_wad.is_zero() {
        return U256::MAX;
    }
    (threshold_weighted_collateral * WAD) / (debt_wad * BPS_DENOMINATOR)
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Convert f64 to WAD (18 decimals).
#[inline(always)]
pub fn f64_to_wad(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_value_usdc() {
        let amount = U256::from(1000_000000u64);
        let price = U256::from(100_000_000u64);
        assert_eq!(base_value_wad(amount, price, 6), U256::from(1000u64) * WAD);
    }

    #[test]
    fn test_base_value_eth() {
        // 1.5 ETH at $2000
        let amount = U256::from(1_500_000_000_000_000_000u128);
        let price = U256::from(200_000_000_000u64);
        assert_eq!(base_value_wad(amount, price, 18), U256::from(3000u64) * WAD);
    }

    #[test]
    fn test_base_value_zero() {
        assert_eq!(base_value_wad(U256::ZERO, U256::from(1u64), 6), U256::ZERO);
        assert_eq!(base_value_wad(U256::from(1u64), U256::ZERO, 6), U256::ZERO);
    }

    #[test]
    fn test_hf_divides_once() {
        // 1000 collateral at 85% threshold against 500 debt -> 1.7
        let weighted = U256::from(1000u64) * WAD * U256::from(8500u64);
        let debt = U256::from(500u64) * WAD;
        let hf = calculate_hf_wad(weighted, debt);
        assert_eq!(hf, WAD * U256::from(17u64) / U256::from(10u64));

        assert_eq!(calculate_hf_wad(weighted, U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(U256::from(1000u64), 8000), U256::from(800u64));
        assert_eq!(apply_bps(U256::from(3u64), 5000), U256::from(1u64));
    }

    #[test]
    fn test_wad_conversions() {
        assert_eq!(f64_to_wad(1.0), WAD);
        assert_eq!(f64_to_wad(-2.0), U256::ZERO);
        assert!((wad_to_f64(U256::from(1000u64) * WAD) - 1000.0).abs() < 0.001);
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(40), U256::from(10u64).pow(U256::from(40u64)));
    }
}
