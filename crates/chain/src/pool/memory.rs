//! In-memory lending pool with per-account undo journals.
//!
//! Balances are stored scaled by the reserve indices the same way an
//! Aave-v2 pool stores aToken and variable debt balances, so reading a
//! position back can differ from the sum of deposits by index rounding.
//! Indices are static; nothing accrues interest here.
//!
//! Checkpoints mirror EVM snapshot/revert but are scoped to one account:
//! reverting undoes only the journaled mutations of that account, leaving
//! concurrent activity on other accounts intact.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{
    AccountSnapshot, CheckpointId, FlashLiquidityProvider, FlashTicket, LendingPool,
    NativeGateway, PoolError, Position, ReserveData, ReservePosition, BPS, RAY,
};

/// Half-up ray multiplication.
fn ray_mul(a: U256, b: U256) -> U256 {
    (a * b + RAY / U256::from(2u8)) / RAY
}

/// Half-up ray division.
fn ray_div(a: U256, b: U256) -> U256 {
    (a * RAY + b / U256::from(2u8)) / b
}

#[derive(Debug, Default, Clone, Copy)]
struct Balances {
    scaled_deposit: U256,
    scaled_debt: U256,
    collateral_enabled: bool,
}

#[derive(Debug)]
enum JournalEntry {
    Deposit {
        asset: Address,
        account: Address,
        scaled: U256,
        amount: U256,
        enabled_collateral: bool,
    },
    Borrow {
        asset: Address,
        account: Address,
        scaled: U256,
        amount: U256,
        delegatee: Address,
        allowance_used: U256,
    },
    FlashAcquire {
        ticket: u64,
        asset: Address,
        amount: U256,
    },
    FlashRepay {
        asset: Address,
        amount: U256,
        fee: U256,
    },
}

#[derive(Debug)]
struct Journal {
    account: Address,
    entries: Vec<JournalEntry>,
}

#[derive(Debug)]
struct OutstandingFlash {
    asset: Address,
    amount: U256,
    fee: U256,
    account: Address,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Reserves in listing order
    reserves: Vec<ReserveData>,
    /// (account, asset) -> balances
    balances: HashMap<(Address, Address), Balances>,
    /// (account, delegatee, asset) -> remaining borrow allowance
    allowances: HashMap<(Address, Address, Address), U256>,
    flash: HashMap<u64, OutstandingFlash>,
    flash_fees: HashMap<Address, U256>,
    journals: HashMap<u64, Journal>,
    /// account -> open checkpoint id
    open: HashMap<Address, u64>,
    wrapped_supply: U256,
    next_ticket: u64,
    next_checkpoint: u64,
}

impl PoolState {
    fn reserve(&self, asset: Address) -> Result<&ReserveData, PoolError> {
        self.reserves
            .iter()
            .find(|r| r.asset == asset)
            .ok_or(PoolError::UnknownReserve(asset))
    }

    fn reserve_mut(&mut self, asset: Address) -> Result<&mut ReserveData, PoolError> {
        self.reserves
            .iter_mut()
            .find(|r| r.asset == asset)
            .ok_or(PoolError::UnknownReserve(asset))
    }

    fn active_reserve_mut(&mut self, asset: Address) -> Result<&mut ReserveData, PoolError> {
        let reserve = self.reserve_mut(asset)?;
        if !reserve.active {
            return Err(PoolError::ReserveInactive(asset));
        }
        Ok(reserve)
    }

    fn record(&mut self, account: Address, entry: JournalEntry) {
        if let Some(id) = self.open.get(&account) {
            if let Some(journal) = self.journals.get_mut(id) {
                journal.entries.push(entry);
            }
        }
    }

    fn release_liquidity(&mut self, asset: Address, amount: U256) {
        if let Ok(reserve) = self.reserve_mut(asset) {
            if reserve.available_liquidity < amount {
                warn!(
                    asset = %asset,
                    amount = %amount,
                    available = %reserve.available_liquidity,
                    "Liquidity already lent out while undoing, clamping at zero"
                );
            }
            reserve.available_liquidity = reserve.available_liquidity.saturating_sub(amount);
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Deposit {
                asset,
                account,
                scaled,
                amount,
                enabled_collateral,
            } => {
                if let Some(bal) = self.balances.get_mut(&(account, asset)) {
                    bal.scaled_deposit = bal.scaled_deposit.saturating_sub(scaled);
                    if enabled_collateral {
                        bal.collateral_enabled = false;
                    }
                }
                self.release_liquidity(asset, amount);
            }
            JournalEntry::Borrow {
                asset,
                account,
                scaled,
                amount,
                delegatee,
                allowance_used,
            } => {
                if let Some(bal) = self.balances.get_mut(&(account, asset)) {
                    bal.scaled_debt = bal.scaled_debt.saturating_sub(scaled);
                }
                if let Ok(reserve) = self.reserve_mut(asset) {
                    reserve.available_liquidity += amount;
                }
                if !allowance_used.is_zero() {
                    *self
                        .allowances
                        .entry((account, delegatee, asset))
                        .or_default() += allowance_used;
                }
            }
            JournalEntry::FlashAcquire {
                ticket,
                asset,
                amount,
            } => {
                self.flash.remove(&ticket);
                if let Ok(reserve) = self.reserve_mut(asset) {
                    reserve.available_liquidity += amount;
                }
            }
            JournalEntry::FlashRepay { asset, amount, fee } => {
                self.release_liquidity(asset, amount + fee);
                if let Some(collected) = self.flash_fees.get_mut(&asset) {
                    *collected = collected.saturating_sub(fee);
                }
            }
        }
    }
}

/// In-memory pool implementing every collaborator trait.
#[derive(Debug)]
pub struct MemoryPool {
    id: String,
    flash_fee_bps: u16,
    wrapped_native: Address,
    state: Mutex<PoolState>,
}

impl MemoryPool {
    /// Create an empty pool charging `flash_fee_bps` on flash liquidity.
    pub fn new(id: impl Into<String>, flash_fee_bps: u16) -> Self {
        Self {
            id: id.into(),
            flash_fee_bps,
            wrapped_native: Address::ZERO,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Set the reserve used for wrapped native coins.
    pub fn with_wrapped_native(mut self, asset: Address) -> Self {
        self.wrapped_native = asset;
        self
    }

    /// List a reserve, replacing any existing entry for the same asset.
    pub fn add_reserve(&self, reserve: ReserveData) {
        let mut state = self.state.lock();
        if let Some(existing) = state.reserves.iter_mut().find(|r| r.asset == reserve.asset) {
            *existing = reserve;
        } else {
            state.reserves.push(reserve);
        }
    }

    /// Mutate reserve configuration (price, indices, flags).
    pub fn update_reserve(
        &self,
        asset: Address,
        update: impl FnOnce(&mut ReserveData),
    ) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        update(state.reserve_mut(asset)?);
        Ok(())
    }

    /// Add lendable liquidity from outside any account.
    pub fn supply_liquidity(&self, asset: Address, amount: U256) -> Result<(), PoolError> {
        self.update_reserve(asset, |r| r.available_liquidity += amount)
    }

    /// Grant `delegatee` the right to borrow `amount` of `asset` for `account`.
    pub fn approve_delegation(
        &self,
        account: Address,
        delegatee: Address,
        asset: Address,
        amount: U256,
    ) {
        self.state
            .lock()
            .allowances
            .insert((account, delegatee, asset), amount);
    }

    /// Fees collected by flash liquidity on a reserve.
    pub fn flash_fees_collected(&self, asset: Address) -> U256 {
        self.state
            .lock()
            .flash_fees
            .get(&asset)
            .copied()
            .unwrap_or_default()
    }

    /// Outstanding wrapped-native supply.
    pub fn wrapped_supply(&self) -> U256 {
        self.state.lock().wrapped_supply
    }

    /// Whether the account has an open checkpoint.
    pub fn has_open_checkpoint(&self, account: Address) -> bool {
        self.state.lock().open.contains_key(&account)
    }

    /// Number of flash tickets not yet repaid.
    pub fn outstanding_flash(&self) -> usize {
        self.state.lock().flash.len()
    }
}

#[async_trait]
impl LendingPool for MemoryPool {
    fn pool_id(&self) -> &str {
        &self.id
    }

    async fn reserve(&self, asset: Address) -> Result<ReserveData, PoolError> {
        self.state.lock().reserve(asset).cloned()
    }

    async fn position(&self, account: Address, asset: Address) -> Result<Position, PoolError> {
        let state = self.state.lock();
        let reserve = state.reserve(asset)?;
        let bal = state
            .balances
            .get(&(account, asset))
            .copied()
            .unwrap_or_default();

        Ok(Position {
            account,
            asset,
            deposited_total: ray_mul(bal.scaled_deposit, reserve.liquidity_index),
            borrowed_total: ray_mul(bal.scaled_debt, reserve.variable_borrow_index),
        })
    }

    async fn account_snapshot(&self, account: Address) -> Result<AccountSnapshot, PoolError> {
        let state = self.state.lock();
        let mut reserves = SmallVec::new();

        for reserve in &state.reserves {
            let Some(bal) = state.balances.get(&(account, reserve.asset)) else {
                continue;
            };
            if bal.scaled_deposit.is_zero() && bal.scaled_debt.is_zero() {
                continue;
            }
            reserves.push(ReservePosition {
                asset: reserve.asset,
                collateral: ray_mul(bal.scaled_deposit, reserve.liquidity_index),
                debt: ray_mul(bal.scaled_debt, reserve.variable_borrow_index),
                price: reserve.price,
                decimals: reserve.decimals,
                ltv_bps: reserve.ltv_bps,
                liquidation_threshold_bps: reserve.liquidation_threshold_bps,
                collateral_enabled: bal.collateral_enabled,
            });
        }

        Ok(AccountSnapshot { account, reserves })
    }

    async fn borrow_allowance(
        &self,
        account: Address,
        delegatee: Address,
        asset: Address,
    ) -> Result<U256, PoolError> {
        let state = self.state.lock();
        state.reserve(asset)?;
        Ok(state
            .allowances
            .get(&(account, delegatee, asset))
            .copied()
            .unwrap_or_default())
    }

    async fn deposit(
        &self,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let reserve = state.active_reserve_mut(asset)?;
        let scaled = ray_div(amount, reserve.liquidity_index);
        reserve.available_liquidity += amount;

        let bal = state.balances.entry((on_behalf_of, asset)).or_default();
        let enabled_collateral = !bal.collateral_enabled && bal.scaled_deposit.is_zero();
        bal.scaled_deposit += scaled;
        if enabled_collateral {
            bal.collateral_enabled = true;
        }

        debug!(asset = %asset, account = %on_behalf_of, amount = %amount, "deposit");
        state.record(
            on_behalf_of,
            JournalEntry::Deposit {
                asset,
                account: on_behalf_of,
                scaled,
                amount,
                enabled_collateral,
            },
        );
        Ok(())
    }

    async fn borrow(
        &self,
        asset: Address,
        amount: U256,
        delegatee: Address,
        on_behalf_of: Address,
    ) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let reserve = state.active_reserve_mut(asset)?;
        if !reserve.borrowing_enabled {
            return Err(PoolError::BorrowingDisabled(asset));
        }
        if reserve.available_liquidity < amount {
            return Err(PoolError::InsufficientLiquidity {
                asset,
                requested: amount,
                available: reserve.available_liquidity,
            });
        }
        let scaled = ray_div(amount, reserve.variable_borrow_index);

        let mut allowance_used = U256::ZERO;
        if delegatee != on_behalf_of {
            let allowance = state
                .allowances
                .entry((on_behalf_of, delegatee, asset))
                .or_default();
            if *allowance < amount {
                return Err(PoolError::InsufficientAllowance {
                    asset,
                    required: amount,
                    available: *allowance,
                });
            }
            *allowance -= amount;
            allowance_used = amount;
        }

        state.reserve_mut(asset)?.available_liquidity -= amount;
        state
            .balances
            .entry((on_behalf_of, asset))
            .or_default()
            .scaled_debt += scaled;

        debug!(asset = %asset, account = %on_behalf_of, amount = %amount, "borrow");
        state.record(
            on_behalf_of,
            JournalEntry::Borrow {
                asset,
                account: on_behalf_of,
                scaled,
                amount,
                delegatee,
                allowance_used,
            },
        );
        Ok(())
    }

    async fn checkpoint(&self, account: Address) -> Result<CheckpointId, PoolError> {
        let mut state = self.state.lock();
        if state.open.contains_key(&account) {
            return Err(PoolError::CheckpointOpen(account));
        }
        state.next_checkpoint += 1;
        let id = state.next_checkpoint;
        state.journals.insert(
            id,
            Journal {
                account,
                entries: Vec::new(),
            },
        );
        state.open.insert(account, id);
        Ok(CheckpointId(id))
    }

    async fn revert_to(&self, checkpoint: CheckpointId) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let journal = state
            .journals
            .remove(&checkpoint.0)
            .ok_or(PoolError::UnknownCheckpoint(checkpoint.0))?;
        state.open.remove(&journal.account);

        debug!(
            account = %journal.account,
            entries = journal.entries.len(),
            "Reverting checkpoint"
        );
        for entry in journal.entries.into_iter().rev() {
            state.undo(entry);
        }
        Ok(())
    }

    async fn commit(&self, checkpoint: CheckpointId) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let journal = state
            .journals
            .remove(&checkpoint.0)
            .ok_or(PoolError::UnknownCheckpoint(checkpoint.0))?;
        state.open.remove(&journal.account);
        Ok(())
    }
}

#[async_trait]
impl FlashLiquidityProvider for MemoryPool {
    fn flash_fee_bps(&self) -> u16 {
        self.flash_fee_bps
    }

    async fn acquire(
        &self,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<FlashTicket, PoolError> {
        let fee = self.flash_fee(amount);
        let mut state = self.state.lock();
        let reserve = state.active_reserve_mut(asset)?;
        if reserve.available_liquidity < amount {
            return Err(PoolError::InsufficientLiquidity {
                asset,
                requested: amount,
                available: reserve.available_liquidity,
            });
        }
        reserve.available_liquidity -= amount;

        state.next_ticket += 1;
        let id = state.next_ticket;
        state.flash.insert(
            id,
            OutstandingFlash {
                asset,
                amount,
                fee,
                account: on_behalf_of,
            },
        );
        state.record(
            on_behalf_of,
            JournalEntry::FlashAcquire {
                ticket: id,
                asset,
                amount,
            },
        );
        Ok(FlashTicket::new(id, asset, amount, fee))
    }

    async fn repay(&self, ticket: FlashTicket, paid: U256) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let outstanding = state
            .flash
            .remove(&ticket.id())
            .ok_or(PoolError::UnknownTicket(ticket.id()))?;
        let expected = outstanding.amount + outstanding.fee;
        if paid < expected {
            let id = ticket.id();
            state.flash.insert(id, outstanding);
            return Err(PoolError::FlashUnderpaid {
                ticket: id,
                expected,
                paid,
            });
        }

        let OutstandingFlash {
            asset,
            amount,
            fee,
            account,
        } = outstanding;
        state.reserve_mut(asset)?.available_liquidity += expected;
        *state.flash_fees.entry(asset).or_default() += fee;
        state.record(account, JournalEntry::FlashRepay { asset, amount, fee });
        Ok(())
    }
}

#[async_trait]
impl NativeGateway for MemoryPool {
    fn wrapped_asset(&self) -> Address {
        self.wrapped_native
    }

    async fn wrap(&self, amount: U256) -> Result<(), PoolError> {
        self.state.lock().wrapped_supply += amount;
        Ok(())
    }

    async fn unwrap(&self, amount: U256) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.wrapped_supply < amount {
            return Err(PoolError::Native(format!(
                "cannot unwrap {} with {} wrapped",
                amount, state.wrapped_supply
            )));
        }
        state.wrapped_supply -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const USDC: Address = address!("b12bfca5a55806aaf64e99521918a4bf0fc40802");
    const ALICE: Address = address!("1111111111111111111111111111111111111111");
    const BOB: Address = address!("2222222222222222222222222222222222222222");
    const EXECUTOR: Address = address!("3333333333333333333333333333333333333333");

    fn pool() -> MemoryPool {
        let pool = MemoryPool::new("test", 9);
        pool.add_reserve(ReserveData::new(USDC, "USDC", 6).with_risk(8000, 8500));
        pool.supply_liquidity(USDC, U256::from(1_000_000u64)).unwrap();
        pool
    }

    #[tokio::test]
    async fn test_deposit_and_borrow() {
        let pool = pool();
        pool.deposit(USDC, U256::from(500u64), ALICE).await.unwrap();
        pool.borrow(USDC, U256::from(200u64), ALICE, ALICE).await.unwrap();

        let position = pool.position(ALICE, USDC).await.unwrap();
        assert_eq!(position.deposited_total, U256::from(500u64));
        assert_eq!(position.borrowed_total, U256::from(200u64));

        let reserve = pool.reserve(USDC).await.unwrap();
        assert_eq!(reserve.available_liquidity, U256::from(1_000_300u64));
    }

    #[tokio::test]
    async fn test_delegated_borrow_consumes_allowance() {
        let pool = pool();
        pool.approve_delegation(ALICE, EXECUTOR, USDC, U256::from(100u64));

        pool.borrow(USDC, U256::from(60u64), EXECUTOR, ALICE).await.unwrap();
        let left = pool.borrow_allowance(ALICE, EXECUTOR, USDC).await.unwrap();
        assert_eq!(left, U256::from(40u64));

        let err = pool
            .borrow(USDC, U256::from(41u64), EXECUTOR, ALICE)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::InsufficientAllowance { .. }));
    }

    #[tokio::test]
    async fn test_borrow_disabled_reserve() {
        let pool = pool();
        pool.update_reserve(USDC, |r| r.borrowing_enabled = false).unwrap();
        let err = pool
            .borrow(USDC, U256::from(1u64), ALICE, ALICE)
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::BorrowingDisabled(USDC));
    }

    #[tokio::test]
    async fn test_revert_restores_account_only() {
        let pool = pool();
        pool.approve_delegation(ALICE, EXECUTOR, USDC, U256::from(1000u64));
        let before = pool.reserve(USDC).await.unwrap().available_liquidity;

        let cp = pool.checkpoint(ALICE).await.unwrap();
        pool.deposit(USDC, U256::from(500u64), ALICE).await.unwrap();
        pool.borrow(USDC, U256::from(300u64), EXECUTOR, ALICE).await.unwrap();
        // Unrelated account activity while ALICE's checkpoint is open
        pool.deposit(USDC, U256::from(70u64), BOB).await.unwrap();
        pool.revert_to(cp).await.unwrap();

        let alice = pool.position(ALICE, USDC).await.unwrap();
        assert_eq!(alice.deposited_total, U256::ZERO);
        assert_eq!(alice.borrowed_total, U256::ZERO);
        assert_eq!(
            pool.borrow_allowance(ALICE, EXECUTOR, USDC).await.unwrap(),
            U256::from(1000u64)
        );

        let bob = pool.position(BOB, USDC).await.unwrap();
        assert_eq!(bob.deposited_total, U256::from(70u64));
        let after = pool.reserve(USDC).await.unwrap().available_liquidity;
        assert_eq!(after, before + U256::from(70u64));
        assert!(!pool.has_open_checkpoint(ALICE));
    }

    #[tokio::test]
    async fn test_commit_keeps_mutations() {
        let pool = pool();
        let cp = pool.checkpoint(ALICE).await.unwrap();
        pool.deposit(USDC, U256::from(10u64), ALICE).await.unwrap();
        pool.commit(cp).await.unwrap();

        assert_eq!(
            pool.position(ALICE, USDC).await.unwrap().deposited_total,
            U256::from(10u64)
        );
        assert_eq!(
            pool.revert_to(cp).await.unwrap_err(),
            PoolError::UnknownCheckpoint(cp.0)
        );
    }

    #[tokio::test]
    async fn test_single_checkpoint_per_account() {
        let pool = pool();
        let _cp = pool.checkpoint(ALICE).await.unwrap();
        assert_eq!(
            pool.checkpoint(ALICE).await.unwrap_err(),
            PoolError::CheckpointOpen(ALICE)
        );
        assert!(pool.checkpoint(BOB).await.is_ok());
    }

    #[tokio::test]
    async fn test_flash_fee_and_underpayment() {
        let pool = pool();
        let ticket = pool
            .acquire(USDC, U256::from(100_000u64), ALICE)
            .await
            .unwrap();
        assert_eq!(ticket.fee(), U256::from(90u64));
        assert_eq!(pool.outstanding_flash(), 1);

        let err = pool.repay(ticket, U256::from(100_000u64)).await.unwrap_err();
        assert!(matches!(err, PoolError::FlashUnderpaid { .. }));
        assert_eq!(pool.outstanding_flash(), 1);

        let ticket = pool.acquire(USDC, U256::from(1000u64), ALICE).await.unwrap();
        // 9 bps of 1000 truncates to zero
        assert_eq!(ticket.fee(), U256::ZERO);
        pool.repay(ticket, U256::from(1000u64)).await.unwrap();
        assert_eq!(pool.flash_fees_collected(USDC), U256::ZERO);
    }

    #[tokio::test]
    async fn test_flash_revert_restores_liquidity() {
        let pool = pool();
        let before = pool.reserve(USDC).await.unwrap().available_liquidity;

        let cp = pool.checkpoint(ALICE).await.unwrap();
        let ticket = pool
            .acquire(USDC, U256::from(200_000u64), ALICE)
            .await
            .unwrap();
        let owed = ticket.amount_owed();
        pool.repay(ticket, owed).await.unwrap();
        assert_eq!(pool.flash_fees_collected(USDC), U256::from(180u64));
        pool.revert_to(cp).await.unwrap();

        assert_eq!(pool.reserve(USDC).await.unwrap().available_liquidity, before);
        assert_eq!(pool.flash_fees_collected(USDC), U256::ZERO);
        assert_eq!(pool.outstanding_flash(), 0);
    }

    #[tokio::test]
    async fn test_index_rounding() {
        let pool = pool();
        // 1.0000000000000000000000000003
        let index = RAY + U256::from(300u64);
        pool.update_reserve(USDC, |r| r.liquidity_index = index).unwrap();

        pool.deposit(USDC, U256::from(500u64), ALICE).await.unwrap();
        pool.deposit(USDC, U256::from(1000u64), ALICE).await.unwrap();

        let deposited = pool.position(ALICE, USDC).await.unwrap().deposited_total;
        let diff = if deposited > U256::from(1500u64) {
            deposited - U256::from(1500u64)
        } else {
            U256::from(1500u64) - deposited
        };
        assert!(diff <= U256::from(1u64));
    }

    #[tokio::test]
    async fn test_snapshot_lists_participating_reserves() {
        let pool = pool();
        let weth = address!("4200000000000000000000000000000000000006");
        pool.add_reserve(ReserveData::new(weth, "WETH", 18).with_risk(7000, 7500));

        pool.deposit(USDC, U256::from(5u64), ALICE).await.unwrap();
        let snapshot = pool.account_snapshot(ALICE).await.unwrap();
        assert_eq!(snapshot.reserves.len(), 1);
        let usdc = snapshot.reserve(USDC).unwrap();
        assert!(usdc.collateral_enabled);
        assert_eq!(usdc.ltv_bps, 8000);
        assert!(snapshot.reserve(weth).is_none());
    }

    #[tokio::test]
    async fn test_native_gateway() {
        let weth = address!("4200000000000000000000000000000000000006");
        let pool = MemoryPool::new("test", 9).with_wrapped_native(weth);
        assert_eq!(pool.wrapped_asset(), weth);

        pool.wrap(U256::from(5u64)).await.unwrap();
        pool.unwrap(U256::from(2u64)).await.unwrap();
        assert_eq!(pool.wrapped_supply(), U256::from(3u64));
        assert!(pool.unwrap(U256::from(4u64)).await.is_err());
    }
}
