pub mod amount;
pub mod catalog;
pub mod models;

pub use amount::{format_units, parse_units, to_decimal};
pub use catalog::LedgerCatalog;
pub use models::{Address, Asset, AssetRef, Ledger, LedgerId, SubAccount, TransferIntent, TxHash};
