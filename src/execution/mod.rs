pub mod abi;
pub mod json_rpc;
pub mod reader;
pub mod signer;
pub mod wallet;

pub use json_rpc::JsonRpcClient;
pub use reader::{ChainReader, JsonRpcChainReader};
pub use signer::{
    ensure_active_ledger, is_user_rejection, ContractCall, Receipt, SignOutcome, Signer,
    SwitchPolicy,
};
pub use wallet::{JsonRpcWalletSigner, WalletConfig};
