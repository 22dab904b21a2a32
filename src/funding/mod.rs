// Cross-ledger funding saga: pre-flight checks, bridge execution with
// independent verification, then the custody deposit on the destination

pub mod allowance;
pub mod balance;
pub mod bridge;
pub mod deposit;
pub mod orchestrator;
pub mod progress;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use allowance::{AllowanceManager, AllowanceOutcome};
pub use balance::{BalanceCheck, BalanceVerifier};
pub use bridge::{BridgeExecutor, BridgeOutcome};
pub use deposit::{DepositConfig, DepositExecutor, DepositReceipt};
pub use orchestrator::FundingOrchestrator;
pub use progress::{ChannelReporter, FanoutReporter, LogReporter, ProgressEvent, ProgressReporter};
pub use session::{BridgeStage, Phase, Session};

/// How far the saga goes after the bridge is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingMode {
    /// Stop once bridged funds are verified on the destination ledger
    BridgeOnly,
    /// Chain straight into the custody deposit
    #[default]
    AutoDeposit,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub mode: FundingMode,
}
