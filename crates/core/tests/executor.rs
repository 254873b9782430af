//! End-to-end executor runs against a fresh in-memory pool per test.

use std::sync::Arc;

use alloy::primitives::{address, Address, U256};
use looper_chain::{LendingPool, MemoryPool, PoolError, ReserveData, RAY};
use looper_core::{
    CollateralHealthGuard, LeverageSolver, LoopError, LoopExecutor, LoopPlan, LoopStep, Schedule,
    SolverParams, SCALE,
};

const USDC: Address = address!("b12bfca5a55806aaf64e99521918a4bf0fc40802");
const WNATIVE: Address = address!("4200000000000000000000000000000000000006");
const TOKEN_A: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const TOKEN_B: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
const TOKEN_C: Address = address!("cccccccccccccccccccccccccccccccccccccccc");

const ALICE: Address = address!("1111111111111111111111111111111111111111");
const BOB: Address = address!("2222222222222222222222222222222222222222");
const OPERATOR: Address = address!("3333333333333333333333333333333333333333");

const FLASH_FEE_BPS: u16 = 9;

fn usdc(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000u64)
}

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

struct Fixture {
    pool: Arc<MemoryPool>,
    executor: LoopExecutor,
}

impl Fixture {
    fn new() -> Self {
        let pool = Arc::new(
            MemoryPool::new("test", FLASH_FEE_BPS).with_wrapped_native(WNATIVE),
        );
        pool.add_reserve(ReserveData::new(USDC, "USDC", 6).with_risk(8000, 8500));
        pool.add_reserve(ReserveData::new(WNATIVE, "WETH", 18).with_risk(8000, 8500));
        for asset in [TOKEN_A, TOKEN_B, TOKEN_C] {
            pool.add_reserve(ReserveData::new(asset, "TKN", 18).with_risk(8000, 8500));
        }

        pool.supply_liquidity(USDC, usdc(1_000_000_000)).unwrap();
        for asset in [WNATIVE, TOKEN_A, TOKEN_B, TOKEN_C] {
            pool.supply_liquidity(asset, ether(1_000_000_000)).unwrap();
        }

        let executor = LoopExecutor::new(pool.clone(), pool.clone(), OPERATOR)
            .with_native(pool.clone());
        Self { pool, executor }
    }

    fn delegate(&self, account: Address, asset: Address, amount: U256) {
        self.pool.approve_delegation(account, OPERATOR, asset, amount);
    }

    async fn liquidity(&self, asset: Address) -> U256 {
        self.pool.reserve(asset).await.unwrap().available_liquidity
    }

    async fn assert_untouched(&self, account: Address, asset: Address) {
        let position = self.pool.position(account, asset).await.unwrap();
        assert_eq!(position.deposited_total, U256::ZERO);
        assert_eq!(position.borrowed_total, U256::ZERO);
        assert!(!self.pool.has_open_checkpoint(account));
        assert_eq!(self.pool.outstanding_flash(), 0);
    }
}

#[tokio::test]
async fn test_three_x_on_eighty_percent_reserve() {
    let fx = Fixture::new();
    let allowance = usdc(10_000);
    fx.delegate(ALICE, USDC, allowance);

    let plan = LeverageSolver::default().solve(30_000, 8000).unwrap();
    assert_eq!(plan.loop_count, 4);
    assert!(plan.leverage().abs_diff(30_000) <= 100);

    let principal = usdc(1000);
    let receipt = fx
        .executor
        .run_loop(ALICE, USDC, principal, plan)
        .await
        .unwrap();

    let schedule = Schedule::from_plan(principal, &plan).unwrap();
    assert_eq!(receipt.position.deposited_total, schedule.total_deposit());
    assert_eq!(receipt.position.borrowed_total, schedule.total_borrow());
    assert_eq!(receipt.total_borrow, U256::from(1_996_138_319u64));

    let realized = receipt.position.deposited_total * U256::from(SCALE) / principal;
    assert!(realized.to::<u64>().abs_diff(30_000) <= 100);

    // flash acquire, n deposit/borrow pairs, final deposit, health check, repay
    assert_eq!(receipt.steps.len(), 2 * plan.loop_count as usize + 4);
    assert!(matches!(receipt.steps[0], LoopStep::FlashAcquired { .. }));
    assert!(matches!(
        receipt.steps.last(),
        Some(LoopStep::FlashRepaid { .. })
    ));

    assert_eq!(receipt.flash_fee, U256::from(1_796_524u64));
    assert_eq!(fx.pool.flash_fees_collected(USDC), receipt.flash_fee);
    assert_eq!(
        fx.pool.borrow_allowance(ALICE, OPERATOR, USDC).await.unwrap(),
        allowance - receipt.total_borrow
    );
    assert!(receipt.health.health_factor().unwrap() > 1.0);
    assert!(!fx.pool.has_open_checkpoint(ALICE));
    assert_eq!(fx.pool.outstanding_flash(), 0);
}

#[tokio::test]
async fn test_explicit_borrow_with_index_rounding() {
    let fx = Fixture::new();
    fx.pool
        .update_reserve(USDC, |r| {
            r.liquidity_index = RAY + RAY / U256::from(1_000_000u64);
        })
        .unwrap();
    fx.delegate(ALICE, USDC, U256::MAX);

    let receipt = fx
        .executor
        .run_explicit(ALICE, USDC, usdc(500), usdc(1000))
        .await
        .unwrap();

    assert!(receipt.plan.is_none());
    assert!(receipt.position.deposited_total.abs_diff(usdc(1500)) <= U256::from(1u8));
    assert_eq!(receipt.position.borrowed_total, usdc(1000));
}

#[tokio::test]
async fn test_single_shot_boundary() {
    let fx = Fixture::new();
    fx.delegate(ALICE, TOKEN_A, U256::MAX);
    fx.delegate(BOB, TOKEN_A, U256::MAX);

    let principal = ether(1000);
    let max = CollateralHealthGuard::max_single_shot_borrow(principal, 8000).unwrap();
    assert_eq!(max, ether(4000));

    let receipt = fx
        .executor
        .run_explicit(ALICE, TOKEN_A, principal, max)
        .await
        .unwrap();
    assert_eq!(receipt.position.borrowed_total, max);

    let liquidity = fx.liquidity(TOKEN_A).await;
    let err = fx
        .executor
        .run_explicit(BOB, TOKEN_A, principal, max + U256::from(1u8))
        .await
        .unwrap_err();
    assert!(matches!(err, LoopError::InsufficientCollateral { .. }));

    fx.assert_untouched(BOB, TOKEN_A).await;
    assert_eq!(fx.liquidity(TOKEN_A).await, liquidity);
    assert_eq!(
        fx.pool.borrow_allowance(BOB, OPERATOR, TOKEN_A).await.unwrap(),
        U256::MAX
    );
}

#[tokio::test]
async fn test_existing_position_tightens_guard() {
    let fx = Fixture::new();

    // 1000 A backing 800 C, then A loses 5%: over LTV capacity, HF still 1.009
    fx.pool.deposit(TOKEN_A, ether(1000), ALICE).await.unwrap();
    fx.pool
        .borrow(TOKEN_C, ether(800), ALICE, ALICE)
        .await
        .unwrap();
    fx.pool
        .update_reserve(TOKEN_A, |r| r.price = U256::from(95_000_000u64))
        .unwrap();

    let guard = CollateralHealthGuard::default();
    let alone = fx.pool.account_snapshot(ALICE).await.unwrap();
    let report = guard.check(&alone, false).unwrap();
    assert!(report.debt_wad > report.borrow_capacity_wad);

    fx.delegate(ALICE, TOKEN_B, U256::MAX);
    fx.delegate(BOB, TOKEN_B, U256::MAX);

    // Adding collateral without new debt only improves health
    let receipt = fx
        .executor
        .run_loop(ALICE, TOKEN_B, ether(10), LoopPlan::new(0, 0))
        .await
        .unwrap();
    assert!(receipt.health.health_factor_wad > report.health_factor_wad);

    // Maximal in isolation
    fx.executor
        .run_explicit(BOB, TOKEN_B, ether(100), ether(400))
        .await
        .unwrap();

    let err = fx
        .executor
        .run_explicit(ALICE, TOKEN_B, ether(100), ether(400))
        .await
        .unwrap_err();
    assert!(matches!(err, LoopError::InsufficientCollateral { .. }));

    let b = fx.pool.position(ALICE, TOKEN_B).await.unwrap();
    assert_eq!(b.deposited_total, ether(10));
    assert_eq!(b.borrowed_total, U256::ZERO);
    assert!(!fx.pool.has_open_checkpoint(ALICE));
    assert_eq!(fx.pool.outstanding_flash(), 0);

    let a = fx.pool.position(ALICE, TOKEN_A).await.unwrap();
    let c = fx.pool.position(ALICE, TOKEN_C).await.unwrap();
    assert_eq!(a.deposited_total, ether(1000));
    assert_eq!(c.borrowed_total, ether(800));
}

#[tokio::test]
async fn test_delegation_shortfall() {
    let fx = Fixture::new();
    let plan = LoopPlan::new(4, 7406);
    let required = Schedule::from_plan(usdc(1000), &plan)
        .unwrap()
        .total_borrow();
    fx.delegate(ALICE, USDC, required - U256::from(1u8));

    let err = fx
        .executor
        .run_loop(ALICE, USDC, usdc(1000), plan)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoopError::InsufficientDelegation {
            asset: USDC,
            required,
            available: required - U256::from(1u8),
        }
    );
    fx.assert_untouched(ALICE, USDC).await;
}

#[tokio::test]
async fn test_operator_needs_no_delegation() {
    let fx = Fixture::new();
    let receipt = fx
        .executor
        .run_loop(OPERATOR, USDC, usdc(100), LoopPlan::new(2, 5000))
        .await
        .unwrap();
    assert_eq!(receipt.position.borrowed_total, usdc(75));
}

#[tokio::test]
async fn test_unusable_reserves() {
    let fx = Fixture::new();
    fx.delegate(ALICE, USDC, U256::MAX);
    let plan = LoopPlan::new(2, 5000);

    fx.pool
        .update_reserve(USDC, |r| r.borrowing_enabled = false)
        .unwrap();
    let err = fx
        .executor
        .run_loop(ALICE, USDC, usdc(100), plan)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoopError::InactiveReserve {
            asset: USDC,
            active: true,
            borrowing_enabled: false,
        }
    );

    fx.pool.update_reserve(USDC, |r| r.active = false).unwrap();
    let err = fx
        .executor
        .run_loop(ALICE, USDC, usdc(100), plan)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoopError::InactiveReserve { active: false, .. }
    ));
    fx.assert_untouched(ALICE, USDC).await;
}

#[tokio::test]
async fn test_zero_loops_deposits_principal() {
    let fx = Fixture::new();
    let receipt = fx
        .executor
        .run_loop(ALICE, USDC, usdc(250), LoopPlan::new(0, 0))
        .await
        .unwrap();

    assert_eq!(receipt.position.deposited_total, usdc(250));
    assert_eq!(receipt.position.borrowed_total, U256::ZERO);
    assert_eq!(receipt.flash_fee, U256::ZERO);
    assert_eq!(receipt.steps.len(), 4);
    assert_eq!(receipt.health.health_factor(), None);
}

#[tokio::test]
async fn test_rejects_invalid_runs() {
    let fx = Fixture::new();
    fx.delegate(ALICE, USDC, U256::MAX);

    let cases = [
        (U256::ZERO, LoopPlan::new(4, 7406)),
        (usdc(100), LoopPlan::new(41, 5000)),
        (usdc(100), LoopPlan::new(2, SCALE + 1)),
    ];
    for (principal, plan) in cases {
        let err = fx
            .executor
            .run_loop(ALICE, USDC, principal, plan)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Validation(_)), "{:?}", plan);
    }
    fx.assert_untouched(ALICE, USDC).await;
    assert_eq!(fx.executor.locked_accounts(), 0);
}

#[tokio::test]
async fn test_loop_bound_follows_params() {
    let fx = Fixture::new();
    let executor = LoopExecutor::new(fx.pool.clone(), fx.pool.clone(), OPERATOR).with_params(
        SolverParams {
            max_loop_count: 3,
            ..SolverParams::default()
        },
    );
    let err = executor
        .run_loop(OPERATOR, USDC, usdc(100), LoopPlan::new(4, 5000))
        .await
        .unwrap_err();
    assert!(matches!(err, LoopError::Validation(_)));
}

#[tokio::test]
async fn test_flash_liquidity_shortage_rolls_back() {
    let fx = Fixture::new();
    let thin = address!("dddddddddddddddddddddddddddddddddddddddd");
    fx.pool
        .add_reserve(ReserveData::new(thin, "THIN", 6).with_risk(8000, 8500));
    fx.pool.supply_liquidity(thin, usdc(10)).unwrap();
    fx.delegate(ALICE, thin, U256::MAX);

    let err = fx
        .executor
        .run_loop(ALICE, thin, usdc(1000), LoopPlan::new(4, 7406))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoopError::Pool(PoolError::InsufficientLiquidity { .. })
    ));
    fx.assert_untouched(ALICE, thin).await;
    assert_eq!(fx.liquidity(thin).await, usdc(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_serialize_per_account() {
    let fx = Fixture::new();
    fx.delegate(ALICE, USDC, U256::MAX);
    fx.delegate(BOB, USDC, U256::MAX);
    let executor = Arc::new(fx.executor);
    let plan = LoopPlan::new(3, 6000);

    let handles: Vec<_> = [ALICE, ALICE, BOB]
        .into_iter()
        .map(|account| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run_loop(account, USDC, usdc(1000), plan).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total = Schedule::from_plan(usdc(1000), &plan)
        .unwrap()
        .total_deposit();
    let alice = fx.pool.position(ALICE, USDC).await.unwrap();
    let bob = fx.pool.position(BOB, USDC).await.unwrap();
    assert_eq!(alice.deposited_total, total * U256::from(2u8));
    assert_eq!(bob.deposited_total, total);
    assert!(!fx.pool.has_open_checkpoint(ALICE));
    assert_eq!(executor.locked_accounts(), 0);
}

#[tokio::test]
async fn test_native_run_with_exact_value() {
    let fx = Fixture::new();
    fx.delegate(ALICE, WNATIVE, U256::MAX);
    let plan = LoopPlan::new(4, 7406);
    let principal = U256::from(1_000_000_000u64);

    let attached = fx.executor.quote_native_value(principal, &plan).unwrap();
    assert_eq!(attached, U256::from(1_001_796_524u64));
    assert_eq!(
        fx.executor
            .principal_for_native_value(&plan, attached)
            .unwrap(),
        principal
    );

    let receipt = fx
        .executor
        .run_loop_native(ALICE, plan, attached)
        .await
        .unwrap();
    assert_eq!(receipt.asset, WNATIVE);
    assert_eq!(receipt.schedule.principal(), principal);
    assert_eq!(fx.pool.wrapped_supply(), attached);
}

#[tokio::test]
async fn test_native_value_must_match_a_principal() {
    let fx = Fixture::new();
    fx.delegate(ALICE, WNATIVE, U256::MAX);
    let plan = LoopPlan::new(4, 7406);

    // Quotes jump from 1001796810 to 1001796812 here
    let err = fx
        .executor
        .run_loop_native(ALICE, plan, U256::from(1_001_796_811u64))
        .await
        .unwrap_err();
    match err {
        LoopError::Validation(msg) => {
            assert!(msg.contains("nearest"));
            assert!(msg.contains("1001796810"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.pool.wrapped_supply(), U256::ZERO);
}

#[tokio::test]
async fn test_native_abort_refunds() {
    let fx = Fixture::new();
    let plan = LoopPlan::new(4, 7406);
    let attached = fx
        .executor
        .quote_native_value(U256::from(1_000_000_000u64), &plan)
        .unwrap();

    // No delegation granted
    let err = fx
        .executor
        .run_loop_native(ALICE, plan, attached)
        .await
        .unwrap_err();
    assert!(matches!(err, LoopError::InsufficientDelegation { .. }));
    assert_eq!(fx.pool.wrapped_supply(), U256::ZERO);
    fx.assert_untouched(ALICE, WNATIVE).await;
}

#[tokio::test]
async fn test_native_requires_gateway() {
    let fx = Fixture::new();
    let executor = LoopExecutor::new(fx.pool.clone(), fx.pool.clone(), OPERATOR);
    let err = executor
        .run_loop_native(OPERATOR, LoopPlan::new(1, 5000), U256::from(1000u64))
        .await
        .unwrap_err();
    assert!(matches!(err, LoopError::Validation(_)));
}
