pub mod aggregator;
pub mod lifi;
pub mod models;
pub mod resolver;
pub mod slippage;

pub use aggregator::RouteAggregator;
pub use lifi::{LifiAggregator, LifiConfig};
pub use models::{
    LegPhase, Route, RouteOrder, RouteRequest, RouteStep, SettledRoute, StepStatus, StepUpdate,
    StepUpdateSender,
};
pub use resolver::RouteResolver;
pub use slippage::RealizedSlippage;
