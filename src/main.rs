//! Looper CLI
//!
//! Plans leveraged loops against a configured market and simulates them
//! end to end on the in-memory pool.
//! Commands:
//! - `plan <SYMBOL> <TARGET_BPS>`: solve the loop plan and encode calldata
//! - `simulate <SYMBOL> <PRINCIPAL> <TARGET_BPS>`: run the executor and print the receipt

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use looper_chain::{LoopingCall, MemoryPool};
use looper_core::{
    leverage, EngineConfig, LoopExecutor, LoopPlan, MarketConfig, ReserveConfig,
    ReserveConstraint, Schedule,
};

#[derive(Parser)]
#[command(name = "looper")]
#[command(about = "Plan and simulate leveraged lending loops")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (defaults to the LOOPER_PROFILE profile)
    #[arg(long)]
    engine_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a leverage target and print the plan with calldata
    Plan {
        /// Reserve symbol (e.g. USDC)
        symbol: String,

        /// Target leverage in basis points (30000 = 3x)
        target_bps: u64,

        /// Principal in whole tokens, used for calldata
        #[arg(long, default_value = "1")]
        principal: String,

        /// Deployed looping helper address
        #[arg(long, default_value_t = Address::ZERO)]
        helper: Address,
    },

    /// Run a loop against an in-memory copy of the market
    Simulate {
        /// Reserve symbol (e.g. USDC)
        symbol: String,

        /// Principal in whole tokens
        principal: String,

        /// Target leverage in basis points (30000 = 3x)
        target_bps: u64,

        /// Attach native coin instead of the ERC20 (wrapped-native reserve only)
        #[arg(long)]
        native: bool,
    },
}

#[derive(Serialize)]
struct PlanOutput {
    market: String,
    symbol: String,
    asset: Address,
    target: u64,
    plan: LoopPlan,
    leverage: u64,
    max_achievable: u64,
    principal: U256,
    /// Present when the reserve is the wrapped native coin
    native_value: Option<U256>,
    calldata: Calldata,
}

#[derive(Serialize)]
struct Calldata {
    helper: Address,
    approve_delegation: String,
    #[serde(rename = "loop")]
    loop_call: String,
    loop_native: Option<String>,
}

fn hex_data(data: &Bytes) -> String {
    format!("0x{}", hex::encode(data))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,looper_core=debug,looper_chain=debug")),
        )
        .init();

    let cli = Cli::parse();

    let engine = match &cli.engine_config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    engine.log_config();

    let market = load_market()?;
    info!(market = %market.market, reserves = market.reserves.len(), "Market loaded");

    match cli.command {
        Commands::Plan {
            symbol,
            target_bps,
            principal,
            helper,
        } => plan(&engine, &market, &symbol, target_bps, &principal, helper),
        Commands::Simulate {
            symbol,
            principal,
            target_bps,
            native,
        } => simulate(&engine, &market, &symbol, &principal, target_bps, native).await,
    }
}

fn load_market() -> Result<MarketConfig> {
    MarketConfig::from_env().context("Failed to load market (check CONFIG_DIR and MARKET)")
}

fn find_reserve<'a>(market: &'a MarketConfig, symbol: &str) -> Result<&'a ReserveConfig> {
    market
        .reserve(symbol)
        .ok_or_else(|| anyhow::anyhow!("Unknown reserve '{}' in market {}", symbol, market.market))
}

fn plan(
    engine: &EngineConfig,
    market: &MarketConfig,
    symbol: &str,
    target: u64,
    principal: &str,
    helper: Address,
) -> Result<()> {
    let reserve = find_reserve(market, symbol)?;
    let data = reserve.to_reserve_data()?;
    let constraint = ReserveConstraint::from_reserve(&data)?;
    let solver = engine.solver();
    let plan = solver.solve(target, constraint.max_ltv)?;
    let principal = reserve.parse_amount(principal)?;

    let is_native = data.asset == market.wrapped_native_address()?;
    let native_value = if is_native {
        let fee = Schedule::from_plan(principal, &plan)?.flash_fee(engine.flash.fee_bps);
        Some(principal + fee)
    } else {
        None
    };

    let call = LoopingCall::new(helper);
    let output = PlanOutput {
        market: market.market.clone(),
        symbol: reserve.symbol.clone(),
        asset: data.asset,
        target,
        plan,
        leverage: plan.leverage(),
        max_achievable: solver.max_achievable(constraint.max_ltv),
        principal,
        native_value,
        calldata: Calldata {
            helper,
            approve_delegation: hex_data(&call.encode_approve_delegation(U256::MAX)),
            loop_call: hex_data(&call.encode_loop(
                data.asset,
                principal,
                plan.borrow_ratio,
                plan.loop_count,
            )),
            loop_native: is_native
                .then(|| hex_data(&call.encode_loop_native(plan.borrow_ratio, plan.loop_count))),
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn simulate(
    engine: &EngineConfig,
    market: &MarketConfig,
    symbol: &str,
    principal: &str,
    target: u64,
    native: bool,
) -> Result<()> {
    let reserve = find_reserve(market, symbol)?;
    let principal = reserve.parse_amount(principal)?;
    let wrapped = market.wrapped_native_address()?;

    let pool = Arc::new(
        MemoryPool::new(format!("{}-sim", market.market), engine.flash.fee_bps)
            .with_wrapped_native(wrapped),
    );
    for listed in market.active_reserves() {
        let data = listed.to_reserve_data()?;
        let asset = data.asset;
        // A billion whole tokens of lendable liquidity per reserve
        let liquidity = U256::from(1_000_000_000u64) * U256::from(10u64).pow(U256::from(data.decimals));
        pool.add_reserve(data);
        pool.supply_liquidity(asset, liquidity)?;
    }

    let account = Address::repeat_byte(0xa1);
    let operator = Address::repeat_byte(0x10);
    let data = reserve.to_reserve_data()?;
    pool.approve_delegation(account, operator, data.asset, U256::MAX);

    let constraint = ReserveConstraint::from_reserve(&data)?;
    let plan = engine.solver().solve(target, constraint.max_ltv)?;
    info!(
        symbol = %reserve.symbol,
        loops = plan.loop_count,
        ratio = plan.borrow_ratio,
        leverage = leverage(plan.loop_count, plan.borrow_ratio),
        "Plan solved"
    );

    let executor = LoopExecutor::new(pool.clone(), pool.clone(), operator)
        .with_native(pool.clone())
        .with_guard(engine.guard())
        .with_params(engine.solver);

    let receipt = if native {
        if data.asset != wrapped {
            anyhow::bail!("{} is not the wrapped native reserve", reserve.symbol);
        }
        let attached = executor.quote_native_value(principal, &plan)?;
        executor.run_loop_native(account, plan, attached).await?
    } else {
        executor.run_loop(account, data.asset, principal, plan).await?
    };

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}
