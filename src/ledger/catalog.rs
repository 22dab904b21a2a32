use serde::Serialize;

use crate::ledger::models::{Address, Asset, Ledger, LedgerId};

const USDC_ETHEREUM: Address = Address::from_literal("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
const USDC_OPTIMISM: Address = Address::from_literal("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85");
const USDC_POLYGON: Address = Address::from_literal("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359");
const USDC_BASE: Address = Address::from_literal("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
const USDC_ARBITRUM: Address = Address::from_literal("0xaf88d065e77c8cC2239327C5EDb3A432268e5831");

fn usdc(address: Address) -> Asset {
    Asset::token("USDC", "USD Coin", address, 6)
}

/// Well-known source ledgers with their native asset and USDC
pub fn builtin_sources() -> Vec<Ledger> {
    vec![
        Ledger::new(LedgerId::ETHEREUM, "Ethereum", Asset::native("ETH", "Ether"))
            .with_asset(usdc(USDC_ETHEREUM)),
        Ledger::new(LedgerId::ARBITRUM, "Arbitrum", Asset::native("ETH", "Ether"))
            .with_asset(usdc(USDC_ARBITRUM)),
        Ledger::new(LedgerId::BASE, "Base", Asset::native("ETH", "Ether"))
            .with_asset(usdc(USDC_BASE)),
        Ledger::new(LedgerId::OPTIMISM, "Optimism", Asset::native("ETH", "Ether"))
            .with_asset(usdc(USDC_OPTIMISM)),
        Ledger::new(LedgerId::POLYGON, "Polygon", Asset::native("POL", "Polygon Ecosystem Token"))
            .with_asset(usdc(USDC_POLYGON)),
    ]
}

/// Supported ledgers, with one distinguished destination.
///
/// The destination ledger always carries the settlement asset; the custody
/// contract on it is the spender of every deposit approval.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerCatalog {
    ledgers: Vec<Ledger>,
    destination: LedgerId,
    settlement_asset: Asset,
    custody_contract: Address,
}

impl LedgerCatalog {
    pub fn new(
        sources: Vec<Ledger>,
        destination: Ledger,
        settlement_asset: Asset,
        custody_contract: Address,
    ) -> Self {
        let destination_id = destination.id;
        let destination = destination.with_asset(settlement_asset.clone());

        let mut ledgers: Vec<Ledger> = sources
            .into_iter()
            .filter(|ledger| ledger.id != destination_id)
            .collect();
        ledgers.push(destination);

        Self {
            ledgers,
            destination: destination_id,
            settlement_asset,
            custody_contract,
        }
    }

    pub fn ledgers(&self) -> &[Ledger] {
        &self.ledgers
    }

    pub fn ledger(&self, id: LedgerId) -> Option<&Ledger> {
        self.ledgers.iter().find(|ledger| ledger.id == id)
    }

    pub fn asset(&self, ledger: LedgerId, symbol: &str) -> Option<&Asset> {
        self.ledger(ledger).and_then(|ledger| ledger.asset(symbol))
    }

    pub fn assets(&self, ledger: LedgerId) -> &[Asset] {
        self.ledger(ledger)
            .map(|ledger| ledger.assets.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_destination(&self, ledger: LedgerId) -> bool {
        self.destination == ledger
    }

    pub fn destination(&self) -> LedgerId {
        self.destination
    }

    pub fn settlement_asset(&self) -> &Asset {
        &self.settlement_asset
    }

    pub fn custody_contract(&self) -> Address {
        self.custody_contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST_USDC: Address = Address::from_literal("0x1111111111111111111111111111111111111111");
    const CUSTODY: Address = Address::from_literal("0x2222222222222222222222222222222222222222");

    fn catalog() -> LedgerCatalog {
        let destination = Ledger::new(LedgerId(999), "HyperEVM", Asset::native("HYPE", "Hype"));
        LedgerCatalog::new(
            builtin_sources(),
            destination,
            Asset::token("USDC", "USD Coin", DEST_USDC, 6),
            CUSTODY,
        )
    }

    #[test]
    fn test_destination_carries_settlement_asset() {
        let catalog = catalog();

        assert!(catalog.is_destination(LedgerId(999)));
        assert!(!catalog.is_destination(LedgerId::ARBITRUM));
        assert_eq!(
            catalog.asset(LedgerId(999), "USDC").map(|asset| asset.reference),
            Some(crate::ledger::models::AssetRef::Contract(DEST_USDC))
        );
        assert_eq!(catalog.custody_contract(), CUSTODY);
    }

    #[test]
    fn test_lookup_sources() {
        let catalog = catalog();

        assert_eq!(catalog.ledgers().len(), 6);
        assert_eq!(catalog.assets(LedgerId::BASE).len(), 2);
        assert!(catalog.asset(LedgerId::POLYGON, "POL").unwrap().is_native());
        assert!(catalog.ledger(LedgerId(56)).is_none());
        assert!(catalog.assets(LedgerId(56)).is_empty());
    }

    #[test]
    fn test_destination_replaces_builtin_entry() {
        let destination = Ledger::new(LedgerId::BASE, "Base", Asset::native("ETH", "Ether"));
        let catalog = LedgerCatalog::new(
            builtin_sources(),
            destination,
            Asset::token("USDC", "USD Coin", DEST_USDC, 6),
            CUSTODY,
        );

        assert_eq!(catalog.ledgers().len(), 5);
        assert_eq!(
            catalog.asset(LedgerId::BASE, "USDC").unwrap().reference,
            crate::ledger::models::AssetRef::Contract(DEST_USDC)
        );
    }
}
