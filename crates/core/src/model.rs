//! Geometric leverage model.
//!
//! Each loop borrows `r / SCALE` of the previous tranche and deposits it
//! again, so total exposure is a truncated geometric series:
//!
//! ```text
//! each(0) = SCALE
//! each(i) = each(i-1) * r / SCALE
//! Leverage(n, r) = each(0) + ... + each(n)
//! ```
//!
//! The same recurrence over an absolute principal yields the executor's
//! tranche amounts (see [`crate::Schedule`]).

/// Fixed-point base for ratios and leverage (10000 = 100% = 1x).
pub const SCALE: u64 = 10_000;

/// Leverage of `loop_count` cycles at `borrow_ratio`, in SCALE units.
///
/// Non-decreasing in both arguments.
pub fn leverage(loop_count: u32, borrow_ratio: u64) -> u64 {
    let mut each = SCALE;
    let mut total = SCALE;
    for _ in 0..loop_count {
        each = each.saturating_mul(borrow_ratio) / SCALE;
        if each == 0 {
            break;
        }
        total = total.saturating_add(each);
    }
    total
}

/// Limit of [`leverage`] as the loop count grows: `SCALE² / (SCALE - r)`.
///
/// `None` when `borrow_ratio >= SCALE` (the series diverges).
pub fn asymptotic_leverage(borrow_ratio: u64) -> Option<u64> {
    if borrow_ratio >= SCALE {
        return None;
    }
    Some(SCALE * SCALE / (SCALE - borrow_ratio))
}
