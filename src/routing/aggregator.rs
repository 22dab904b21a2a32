use async_trait::async_trait;

use crate::error::{ExecutionError, ProviderError};
use crate::routing::models::{Route, RouteRequest, SettledRoute, StepUpdateSender};

/// Off-chain routing provider that both quotes and drives bridge routes
#[async_trait]
pub trait RouteAggregator: Send + Sync {
    /// Candidate routes, best first
    async fn quote(&self, request: &RouteRequest) -> Result<Vec<Route>, ProviderError>;

    /// Execute every step of `route`, reporting leg progress on `updates`.
    ///
    /// Updates may arrive duplicated or out of order.
    async fn execute(
        &self,
        route: &Route,
        updates: StepUpdateSender,
    ) -> Result<SettledRoute, ExecutionError>;

    fn name(&self) -> &str;
}
