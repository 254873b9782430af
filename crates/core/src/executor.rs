//! Atomic loop execution.
//!
//! A run opens a pool checkpoint for the account, acquires the whole borrow
//! as flash liquidity, walks the deposit/borrow schedule, lets the guard
//! judge the finished position and only then repays the flash and commits.
//! Any failure after the checkpoint reverts every step of the run.
//!
//! ```text
//! Idle -> FlashAcquired -> Looping(1) .. Looping(n) -> Repaying -> Settled
//!   \___________\______________\____________________\______-> Aborted
//! ```

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use looper_chain::{
    CheckpointId, FlashLiquidityProvider, LendingPool, NativeGateway, Position,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::LoopError;
use crate::guard::{CollateralHealthGuard, HealthReport};
use crate::model::SCALE;
use crate::plan::{LoopPlan, Schedule};
use crate::solver::SolverParams;

/// Executor run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Idle,
    FlashAcquired,
    Looping(u32),
    Repaying,
    Settled,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Settled | LoopState::Aborted)
    }

    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        match (*self, next) {
            (s, Aborted) => !s.is_terminal(),
            (Idle, FlashAcquired) => true,
            (FlashAcquired, Looping(1)) => true,
            (FlashAcquired, Repaying) => true,
            (Looping(i), Looping(j)) => j == i + 1,
            (Looping(_), Repaying) => true,
            (Repaying, Settled) => true,
            _ => false,
        }
    }
}

/// One journaled action of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LoopStep {
    FlashAcquired { amount: U256, fee: U256 },
    Deposit { tranche: usize, amount: U256 },
    Borrow { tranche: usize, amount: U256 },
    HealthChecked { health_factor_wad: U256 },
    FlashRepaid { amount: U256 },
}

/// Outcome of a settled run.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReceipt {
    pub account: Address,
    pub asset: Address,
    /// Present for ratio/loop-count runs
    pub plan: Option<LoopPlan>,
    pub schedule: Schedule,
    pub total_deposit: U256,
    pub total_borrow: U256,
    pub flash_fee: U256,
    pub health: HealthReport,
    /// Position read back after commit
    pub position: Position,
    pub steps: Vec<LoopStep>,
    pub settled_at: DateTime<Utc>,
}

struct Run {
    state: LoopState,
    steps: Vec<LoopStep>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: LoopState::Idle,
            steps: Vec::new(),
        }
    }

    fn advance(&mut self, next: LoopState) -> Result<(), LoopError> {
        if !self.state.can_transition_to(next) {
            return Err(LoopError::validation(format!(
                "illegal transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        Ok(())
    }
}

/// In-hand balance of the run; must end at exactly zero.
struct Float {
    balance: U256,
}

impl Float {
    fn spend(&mut self, amount: U256) -> Result<(), LoopError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(LoopError::Settlement {
                expected: amount,
                remaining: self.balance,
            })?;
        Ok(())
    }
}

/// Drives loop runs against a pool and flash provider.
#[derive(Debug)]
pub struct LoopExecutor {
    pool: Arc<dyn LendingPool>,
    flash: Arc<dyn FlashLiquidityProvider>,
    native: Option<Arc<dyn NativeGateway>>,
    guard: CollateralHealthGuard,
    params: SolverParams,
    /// Identity the executor borrows as (the delegatee)
    operator: Address,
    account_locks: DashMap<Address, Arc<tokio::sync::Mutex<()>>>,
}

impl LoopExecutor {
    pub fn new(
        pool: Arc<dyn LendingPool>,
        flash: Arc<dyn FlashLiquidityProvider>,
        operator: Address,
    ) -> Self {
        Self {
            pool,
            flash,
            native: None,
            guard: CollateralHealthGuard::default(),
            params: SolverParams::default(),
            operator,
            account_locks: DashMap::new(),
        }
    }

    pub fn with_native(mut self, gateway: Arc<dyn NativeGateway>) -> Self {
        self.native = Some(gateway);
        self
    }

    pub fn with_guard(mut self, guard: CollateralHealthGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_params(mut self, params: SolverParams) -> Self {
        self.params = params;
        self
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn guard(&self) -> &CollateralHealthGuard {
        &self.guard
    }

    /// Accounts with a run in flight or waiting for one.
    pub fn locked_accounts(&self) -> usize {
        self.account_locks.len()
    }

    /// Loop `principal` of `asset` following a ratio/loop-count plan.
    ///
    /// The caller supplies `principal` plus the flash fee on the total borrow.
    #[instrument(skip(self, account, asset), fields(account = %account, asset = %asset))]
    pub async fn run_loop(
        &self,
        account: Address,
        asset: Address,
        principal: U256,
        plan: LoopPlan,
    ) -> Result<LoopReceipt, LoopError> {
        if plan.borrow_ratio > SCALE {
            return Err(LoopError::validation(format!(
                "borrow ratio {} exceeds {}",
                plan.borrow_ratio, SCALE
            )));
        }
        if plan.loop_count > self.params.max_loop_count {
            return Err(LoopError::validation(format!(
                "loop count {} exceeds {}",
                plan.loop_count, self.params.max_loop_count
            )));
        }
        let schedule = Schedule::from_plan(principal, &plan)?;
        self.run_schedule(account, asset, schedule, Some(plan)).await
    }

    /// Single-shot form: deposit `principal`, borrow `borrow_amount` and deposit it too.
    #[instrument(skip(self, account, asset), fields(account = %account, asset = %asset))]
    pub async fn run_explicit(
        &self,
        account: Address,
        asset: Address,
        principal: U256,
        borrow_amount: U256,
    ) -> Result<LoopReceipt, LoopError> {
        let schedule = Schedule::explicit(principal, borrow_amount);
        self.run_schedule(account, asset, schedule, None).await
    }

    /// Native-coin variant. `attached` must equal principal plus flash fee;
    /// it is wrapped on entry and unwrapped again if the run aborts.
    #[instrument(skip(self, account), fields(account = %account))]
    pub async fn run_loop_native(
        &self,
        account: Address,
        plan: LoopPlan,
        attached: U256,
    ) -> Result<LoopReceipt, LoopError> {
        let gateway = self
            .native
            .as_ref()
            .ok_or_else(|| LoopError::validation("no native gateway configured"))?;
        let principal = self.principal_for_native_value(&plan, attached)?;
        let asset = gateway.wrapped_asset();

        gateway.wrap(attached).await?;
        match self.run_loop(account, asset, principal, plan).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                if let Err(refund) = gateway.unwrap(attached).await {
                    return Err(LoopError::RollbackFailed {
                        cause: Box::new(err),
                        rollback: refund,
                    });
                }
                warn!(refunded = %attached, "Native run aborted, value refunded");
                Err(err)
            }
        }
    }

    /// Exact value a native run of `principal` must attach.
    pub fn quote_native_value(&self, principal: U256, plan: &LoopPlan) -> Result<U256, LoopError> {
        let schedule = Schedule::from_plan(principal, plan)?;
        principal
            .checked_add(self.flash.flash_fee(schedule.total_borrow()))
            .ok_or_else(|| LoopError::validation("attached value overflows"))
    }

    /// Principal whose quote equals `attached` exactly.
    ///
    /// The quote is strictly increasing in the principal, so at most one
    /// principal matches. Otherwise the error names the nearest valid value.
    pub fn principal_for_native_value(
        &self,
        plan: &LoopPlan,
        attached: U256,
    ) -> Result<U256, LoopError> {
        let fits = |p: U256| matches!(self.quote_native_value(p, plan), Ok(v) if v <= attached);

        let mut lo = U256::ZERO;
        let mut hi = attached;
        while lo < hi {
            let mid = lo + (hi - lo) / U256::from(2u8) + U256::from(1u8);
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid - U256::from(1u8);
            }
        }

        let below = self.quote_native_value(lo, plan)?;
        if below == attached {
            return Ok(lo);
        }
        let above = lo
            .checked_add(U256::from(1u8))
            .and_then(|p| self.quote_native_value(p, plan).ok());
        let nearest = match above {
            Some(above) if above - attached < attached - below => above,
            _ => below,
        };
        Err(LoopError::validation(format!(
            "attached value {} matches no principal; nearest valid value is {}",
            attached, nearest
        )))
    }

    async fn run_schedule(
        &self,
        account: Address,
        asset: Address,
        schedule: Schedule,
        plan: Option<LoopPlan>,
    ) -> Result<LoopReceipt, LoopError> {
        let lock = self.account_locks.entry(account).or_default().clone();
        let outcome = {
            let _held = lock.lock().await;
            self.run_locked(account, asset, schedule, plan).await
        };
        drop(lock);
        // Only the map's handle left means no run is queued on this account
        self.account_locks
            .remove_if(&account, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    async fn run_locked(
        &self,
        account: Address,
        asset: Address,
        schedule: Schedule,
        plan: Option<LoopPlan>,
    ) -> Result<LoopReceipt, LoopError> {
        self.check_preconditions(account, asset, &schedule).await?;

        let checkpoint = self.pool.checkpoint(account).await?;
        let mut run = Run::new();
        let outcome = match self.execute(account, asset, &schedule, &mut run).await {
            Ok(health) => self
                .pool
                .commit(checkpoint)
                .await
                .map(|_| health)
                .map_err(LoopError::from),
            Err(err) => Err(err),
        };

        let health = match outcome {
            Ok(health) => health,
            Err(err) => return Err(self.abort(checkpoint, &mut run, err).await),
        };
        run.advance(LoopState::Settled)?;

        let position = self.pool.position(account, asset).await?;
        let total_borrow = schedule.total_borrow();
        let flash_fee = self.flash.flash_fee(total_borrow);
        info!(
            pool = self.pool.pool_id(),
            loops = schedule.loop_count(),
            deposited = %position.deposited_total,
            borrowed = %position.borrowed_total,
            fee = %flash_fee,
            hf = ?health.health_factor(),
            "Loop settled"
        );

        Ok(LoopReceipt {
            account,
            asset,
            plan,
            total_deposit: schedule.total_deposit(),
            total_borrow,
            flash_fee,
            schedule,
            health,
            position,
            steps: run.steps,
            settled_at: Utc::now(),
        })
    }

    async fn check_preconditions(
        &self,
        account: Address,
        asset: Address,
        schedule: &Schedule,
    ) -> Result<(), LoopError> {
        let reserve = self.pool.reserve(asset).await?;
        if !reserve.is_borrowable() {
            return Err(LoopError::InactiveReserve {
                asset,
                active: reserve.active,
                borrowing_enabled: reserve.borrowing_enabled,
            });
        }
        if schedule.principal().is_zero() {
            return Err(LoopError::validation("principal must be positive"));
        }
        if schedule.loop_count() > self.params.max_loop_count as usize {
            return Err(LoopError::validation(format!(
                "loop count {} exceeds {}",
                schedule.loop_count(),
                self.params.max_loop_count
            )));
        }

        let required = schedule.total_borrow();
        if account != self.operator {
            let available = self
                .pool
                .borrow_allowance(account, self.operator, asset)
                .await?;
            if available < required {
                return Err(LoopError::InsufficientDelegation {
                    asset,
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        account: Address,
        asset: Address,
        schedule: &Schedule,
        run: &mut Run,
    ) -> Result<HealthReport, LoopError> {
        let tranches = schedule.tranches();
        let last = schedule.loop_count();
        let flash_amount = schedule.total_borrow();
        let fee = self.flash.flash_fee(flash_amount);

        // Caller supplies principal and fee
        let mut float = Float {
            balance: schedule.principal() + fee,
        };

        let ticket = self.flash.acquire(asset, flash_amount, account).await?;
        float.balance += ticket.amount();
        run.advance(LoopState::FlashAcquired)?;
        run.steps.push(LoopStep::FlashAcquired {
            amount: ticket.amount(),
            fee: ticket.fee(),
        });
        info!(amount = %ticket.amount(), fee = %ticket.fee(), "Flash liquidity acquired");

        for i in 1..=last {
            run.advance(LoopState::Looping(i as u32))?;

            self.pool.deposit(asset, tranches[i - 1], account).await?;
            float.spend(tranches[i - 1])?;
            run.steps.push(LoopStep::Deposit {
                tranche: i - 1,
                amount: tranches[i - 1],
            });

            self.pool
                .borrow(asset, tranches[i], self.operator, account)
                .await?;
            float.balance += tranches[i];
            run.steps.push(LoopStep::Borrow {
                tranche: i,
                amount: tranches[i],
            });
            debug!(loop_index = i, deposited = %tranches[i - 1], borrowed = %tranches[i], "Loop step");
        }

        run.advance(LoopState::Repaying)?;
        self.pool.deposit(asset, tranches[last], account).await?;
        float.spend(tranches[last])?;
        run.steps.push(LoopStep::Deposit {
            tranche: last,
            amount: tranches[last],
        });

        let snapshot = self.pool.account_snapshot(account).await?;
        let health = self.guard.check(&snapshot, !flash_amount.is_zero())?;
        run.steps.push(LoopStep::HealthChecked {
            health_factor_wad: health.health_factor_wad,
        });

        let owed = ticket.amount_owed();
        float.spend(owed)?;
        if !float.balance.is_zero() {
            return Err(LoopError::Settlement {
                expected: owed,
                remaining: float.balance,
            });
        }
        self.flash.repay(ticket, owed).await?;
        run.steps.push(LoopStep::FlashRepaid { amount: owed });

        Ok(health)
    }

    async fn abort(&self, checkpoint: CheckpointId, run: &mut Run, err: LoopError) -> LoopError {
        let failed_in = run.state;
        run.state = LoopState::Aborted;
        if let Err(rollback) = self.pool.revert_to(checkpoint).await {
            warn!(error = %err, rollback = %rollback, "Rollback failed");
            return LoopError::RollbackFailed {
                cause: Box::new(err),
                rollback,
            };
        }
        warn!(
            error = %err,
            state = ?failed_in,
            steps = run.steps.len(),
            "Loop aborted, run reverted"
        );
        err
    }
}
