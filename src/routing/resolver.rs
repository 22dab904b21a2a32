use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::RouteError;
use crate::ledger::models::{Address, Asset, LedgerId, TransferIntent};
use crate::routing::aggregator::RouteAggregator;
use crate::routing::models::{Route, RouteOrder, RouteRequest};

/// Finds candidate routes from a transfer intent to the fixed destination
pub struct RouteResolver {
    aggregator: Arc<dyn RouteAggregator>,
    slippage: Decimal,
    order: RouteOrder,
}

impl RouteResolver {
    pub fn new(aggregator: Arc<dyn RouteAggregator>, slippage: Decimal, order: RouteOrder) -> Self {
        Self {
            aggregator,
            slippage,
            order,
        }
    }

    pub fn request(
        &self,
        intent: &TransferIntent,
        destination: LedgerId,
        destination_asset: &Asset,
        requester: Address,
    ) -> RouteRequest {
        RouteRequest {
            from_ledger: intent.source_ledger,
            from_asset: intent.source_asset.reference,
            to_ledger: destination,
            to_asset: destination_asset.reference,
            from_amount: intent.amount_units,
            from_address: requester,
            to_address: requester,
            slippage: self.slippage,
            order: self.order,
        }
    }

    /// Candidate routes in provider order, keeping only those that land on
    /// the destination asset
    #[instrument(skip_all, fields(from = %intent.source_ledger, asset = %intent.source_asset.symbol))]
    pub async fn resolve(
        &self,
        intent: &TransferIntent,
        destination: LedgerId,
        destination_asset: &Asset,
        requester: Address,
    ) -> Result<Vec<Route>, RouteError> {
        let request = self.request(intent, destination, destination_asset, requester);
        let routes = self.aggregator.quote(&request).await?;

        let quoted = routes.len();
        let routes: Vec<Route> = routes
            .into_iter()
            .filter(|route| {
                let usable = route.delivers_to(destination, &destination_asset.reference);
                debug!(
                    "Candidate route {} via {:?}: {} -> {} (usable: {})",
                    route.id,
                    route.tools(),
                    route.from_amount,
                    route.to_amount,
                    usable
                );
                usable
            })
            .collect();

        if routes.is_empty() {
            if quoted > 0 {
                warn!(
                    "{} returned {} routes, none delivering to ledger {}",
                    self.aggregator.name(),
                    quoted,
                    destination
                );
            }
            return Err(RouteError::NoRouteFound);
        }

        info!("Resolved {} route(s) via {}", routes.len(), self.aggregator.name());
        Ok(routes)
    }

    /// The route the saga executes
    pub async fn best(
        &self,
        intent: &TransferIntent,
        destination: LedgerId,
        destination_asset: &Asset,
        requester: Address,
    ) -> Result<Route, RouteError> {
        self.resolve(intent, destination, destination_asset, requester)
            .await?
            .into_iter()
            .next()
            .ok_or(RouteError::NoRouteFound)
    }
}
