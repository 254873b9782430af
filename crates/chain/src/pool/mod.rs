//! Lending pool abstraction consumed by the looping engine.
//!
//! The engine never owns pool accounting. It talks to three collaborators:
//!
//! - [`LendingPool`]: reserve configuration, per-account positions, deposits,
//!   delegated borrows and per-account checkpoints for all-or-nothing runs
//! - [`FlashLiquidityProvider`]: same-run liquidity with a flat basis-point fee
//! - [`NativeGateway`]: wrap/unwrap of the chain-native coin
//!
//! [`MemoryPool`] implements all three for tests and simulation.

mod memory;

pub use memory::MemoryPool;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Debug;
use thiserror::Error;

/// RAY constant: 1e27, base for liquidity and borrow indices.
pub const RAY: U256 = U256::from_limbs([0x9fd0803ce8000000, 0x33b2e3c, 0, 0]);

/// Basis points denominator for fee and LTV parameters (10000 = 100%).
pub const BPS: u64 = 10_000;

/// Errors surfaced by pool collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("unknown reserve {0}")]
    UnknownReserve(Address),

    #[error("reserve {0} is not active")]
    ReserveInactive(Address),

    #[error("borrowing is disabled on reserve {0}")]
    BorrowingDisabled(Address),

    #[error("insufficient liquidity in {asset}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        asset: Address,
        requested: U256,
        available: U256,
    },

    #[error("borrow allowance for {asset} too low: required {required}, available {available}")]
    InsufficientAllowance {
        asset: Address,
        required: U256,
        available: U256,
    },

    #[error("flash ticket {ticket} underpaid: expected {expected}, paid {paid}")]
    FlashUnderpaid { ticket: u64, expected: U256, paid: U256 },

    #[error("unknown flash ticket {0}")]
    UnknownTicket(u64),

    #[error("account {0} already has an open checkpoint")]
    CheckpointOpen(Address),

    #[error("unknown checkpoint {0}")]
    UnknownCheckpoint(u64),

    #[error("native gateway: {0}")]
    Native(String),
}

/// Reserve configuration and live state as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveData {
    /// Underlying token address
    pub asset: Address,
    /// Display symbol
    pub symbol: String,
    /// Token decimals
    pub decimals: u8,
    /// Max loan-to-value (basis points)
    pub ltv_bps: u16,
    /// Liquidation threshold (basis points)
    pub liquidation_threshold_bps: u16,
    /// Liquidation bonus (basis points, 11500 = 15% bonus)
    pub liquidation_bonus_bps: u16,
    /// Whether the reserve accepts operations at all
    pub active: bool,
    /// Whether variable borrowing is enabled
    pub borrowing_enabled: bool,
    /// Oracle price in base currency (8 decimals)
    pub price: U256,
    /// Liquidity index (ray)
    pub liquidity_index: U256,
    /// Variable borrow index (ray)
    pub variable_borrow_index: U256,
    /// Underlying held by the reserve and free to lend
    pub available_liquidity: U256,
}

impl ReserveData {
    /// Create an active, borrowable reserve with unit indices and no liquidity.
    pub fn new(asset: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            asset,
            symbol: symbol.into(),
            decimals,
            ltv_bps: 0,
            liquidation_threshold_bps: 0,
            liquidation_bonus_bps: 0,
            active: true,
            borrowing_enabled: true,
            price: U256::from(100_000_000u64),
            liquidity_index: RAY,
            variable_borrow_index: RAY,
            available_liquidity: U256::ZERO,
        }
    }

    /// Set LTV and liquidation threshold.
    pub fn with_risk(mut self, ltv_bps: u16, liquidation_threshold_bps: u16) -> Self {
        self.ltv_bps = ltv_bps;
        self.liquidation_threshold_bps = liquidation_threshold_bps;
        self
    }

    /// Set oracle price (8 decimals).
    pub fn with_price(mut self, price: U256) -> Self {
        self.price = price;
        self
    }

    /// Whether the engine may borrow from this reserve.
    pub fn is_borrowable(&self) -> bool {
        self.active && self.borrowing_enabled
    }
}

/// One account's balances on one reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account: Address,
    pub asset: Address,
    /// Underlying supplied (liquidity index applied)
    pub deposited_total: U256,
    /// Underlying owed (borrow index applied)
    pub borrowed_total: U256,
}

/// Balances plus risk parameters for one reserve an account participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservePosition {
    pub asset: Address,
    pub collateral: U256,
    pub debt: U256,
    /// Oracle price (8 decimals)
    pub price: U256,
    pub decimals: u8,
    pub ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    /// Whether the supplied balance counts as collateral
    pub collateral_enabled: bool,
}

/// Cross-reserve view of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub account: Address,
    pub reserves: SmallVec<[ReservePosition; 4]>,
}

impl AccountSnapshot {
    /// Find the entry for a reserve.
    pub fn reserve(&self, asset: Address) -> Option<&ReservePosition> {
        self.reserves.iter().find(|r| r.asset == asset)
    }
}

/// Handle for a per-account undo journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointId(pub u64);

/// Outstanding flash liquidity.
///
/// Not `Clone`: a ticket is consumed exactly once by
/// [`FlashLiquidityProvider::repay`].
#[derive(Debug, PartialEq, Eq)]
pub struct FlashTicket {
    id: u64,
    asset: Address,
    amount: U256,
    fee: U256,
}

impl FlashTicket {
    pub(crate) fn new(id: u64, asset: Address, amount: U256, fee: U256) -> Self {
        Self { id, asset, amount, fee }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asset(&self) -> Address {
        self.asset
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn fee(&self) -> U256 {
        self.fee
    }

    /// Principal plus fee.
    pub fn amount_owed(&self) -> U256 {
        self.amount + self.fee
    }
}

/// Lending pool operations the looping engine relies on.
#[async_trait]
pub trait LendingPool: Send + Sync + Debug {
    /// Pool identifier (for logging).
    fn pool_id(&self) -> &str;

    /// Reserve configuration and state.
    async fn reserve(&self, asset: Address) -> Result<ReserveData, PoolError>;

    /// Position of one account on one reserve.
    async fn position(&self, account: Address, asset: Address) -> Result<Position, PoolError>;

    /// Every reserve the account has supplied to or borrowed from.
    async fn account_snapshot(&self, account: Address) -> Result<AccountSnapshot, PoolError>;

    /// Debt the delegatee may still incur on the account's behalf.
    async fn borrow_allowance(
        &self,
        account: Address,
        delegatee: Address,
        asset: Address,
    ) -> Result<U256, PoolError>;

    /// Supply underlying on behalf of an account.
    async fn deposit(
        &self,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), PoolError>;

    /// Borrow at variable rate, charging the debt to `on_behalf_of`.
    ///
    /// When `delegatee` differs from `on_behalf_of` the delegation
    /// allowance is consumed. Health is not checked here.
    async fn borrow(
        &self,
        asset: Address,
        amount: U256,
        delegatee: Address,
        on_behalf_of: Address,
    ) -> Result<(), PoolError>;

    /// Open an undo journal for every mutation touching `account`.
    async fn checkpoint(&self, account: Address) -> Result<CheckpointId, PoolError>;

    /// Undo every journaled mutation since the checkpoint and close it.
    async fn revert_to(&self, checkpoint: CheckpointId) -> Result<(), PoolError>;

    /// Keep every journaled mutation and close the checkpoint.
    async fn commit(&self, checkpoint: CheckpointId) -> Result<(), PoolError>;
}

/// Flash liquidity with a flat basis-point fee.
#[async_trait]
pub trait FlashLiquidityProvider: Send + Sync + Debug {
    /// Fee in basis points of the borrowed amount.
    fn flash_fee_bps(&self) -> u16;

    /// Fee for a given amount (truncating).
    fn flash_fee(&self, amount: U256) -> U256 {
        amount * U256::from(self.flash_fee_bps()) / U256::from(BPS)
    }

    /// Hand out `amount` of `asset`, journaled against `on_behalf_of`.
    async fn acquire(
        &self,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<FlashTicket, PoolError>;

    /// Return principal plus fee. `paid` below the amount owed fails.
    async fn repay(&self, ticket: FlashTicket, paid: U256) -> Result<(), PoolError>;
}

/// Wrapping of the chain-native coin into its ERC20 form.
#[async_trait]
pub trait NativeGateway: Send + Sync + Debug {
    /// Reserve asset that wrapped native coins are looped in.
    fn wrapped_asset(&self) -> Address;

    async fn wrap(&self, amount: U256) -> Result<(), PoolError>;

    async fn unwrap(&self, amount: U256) -> Result<(), PoolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_constant() {
        let expected = U256::from(10u64).pow(U256::from(27u64));
        assert_eq!(RAY, expected);
    }

    #[test]
    fn test_reserve_builder() {
        let reserve = ReserveData::new(Address::ZERO, "USDC", 6).with_risk(8000, 8500);
        assert_eq!(reserve.ltv_bps, 8000);
        assert_eq!(reserve.liquidation_threshold_bps, 8500);
        assert!(reserve.is_borrowable());

        let frozen = ReserveData {
            borrowing_enabled: false,
            ..reserve
        };
        assert!(!frozen.is_borrowable());
    }

    #[test]
    fn test_ticket_amount_owed() {
        let ticket = FlashTicket::new(1, Address::ZERO, U256::from(1000u64), U256::from(9u64));
        assert_eq!(ticket.amount_owed(), U256::from(1009u64));
    }
}
