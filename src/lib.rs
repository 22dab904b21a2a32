pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod execution;
pub mod funding;
pub mod ledger;
pub mod middleware;
pub mod routing;
pub mod server;
