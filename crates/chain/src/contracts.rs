//! Contract bindings for the on-chain looping helper.
//!
//! The engine can run against an in-memory pool, but a deployed `Looping`
//! contract takes the same inputs. These bindings encode calldata for it and
//! for the debt-token delegation the caller must grant first.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Looping helper deployed next to the lending pool.
    interface ILooping {
        function LENDING_POOL() external view returns (address);
        function WETH() external view returns (address);

        /// Loop an ERC20 reserve. `borrowRatio` is in basis points.
        function loop(
            address asset,
            uint256 amount,
            uint256 borrowRatio,
            uint256 loopCount
        ) external;

        /// Loop the native coin, wrapped first.
        function loopETH(uint256 borrowRatio, uint256 loopCount) external payable;
    }

    /// Variable debt token credit delegation.
    interface IDebtTokenDelegation {
        function approveDelegation(address delegatee, uint256 amount) external;
        function borrowAllowance(address fromUser, address toUser) external view returns (uint256);
    }
}

/// Calldata encoders for a deployed looping helper.
#[derive(Debug, Clone, Copy)]
pub struct LoopingCall {
    address: Address,
}

impl LoopingCall {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Helper contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Encode `loop(asset, amount, borrowRatio, loopCount)`.
    pub fn encode_loop(
        &self,
        asset: Address,
        amount: U256,
        borrow_ratio_bps: u64,
        loop_count: u32,
    ) -> Bytes {
        let call = ILooping::loopCall {
            asset,
            amount,
            borrowRatio: U256::from(borrow_ratio_bps),
            loopCount: U256::from(loop_count),
        };
        Bytes::from(call.abi_encode())
    }

    /// Encode `loopETH(borrowRatio, loopCount)`. The principal travels as call value.
    pub fn encode_loop_native(&self, borrow_ratio_bps: u64, loop_count: u32) -> Bytes {
        let call = ILooping::loopETHCall {
            borrowRatio: U256::from(borrow_ratio_bps),
            loopCount: U256::from(loop_count),
        };
        Bytes::from(call.abi_encode())
    }

    /// Encode the delegation approval the caller sends to the variable debt token.
    pub fn encode_approve_delegation(&self, amount: U256) -> Bytes {
        let call = IDebtTokenDelegation::approveDelegationCall {
            delegatee: self.address,
            amount,
        };
        Bytes::from(call.abi_encode())
    }
}
