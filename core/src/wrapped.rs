use alloy::{
    primitives::{Bytes, U256},
    sol,
    sol_types::SolCall,
};

use crate::transaction::Direction;

sol! {
    #[sol(rpc)]
    interface IWrappedNative {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Calldata and attached native value for moving `amount` in `direction`.
pub fn encode_call(direction: Direction, amount: U256) -> (Bytes, U256) {
    match direction {
        Direction::Deposit => (IWrappedNative::depositCall {}.abi_encode().into(), amount),
        Direction::Withdraw => (
            IWrappedNative::withdrawCall { wad: amount }.abi_encode().into(),
            U256::ZERO,
        ),
    }
}

/// Recovers the withdraw amount from calldata, if the calldata is a withdraw call.
pub fn decode_withdraw(input: &[u8]) -> Option<U256> {
    IWrappedNative::withdrawCall::abi_decode(input)
        .ok()
        .map(|call| call.wad)
}
