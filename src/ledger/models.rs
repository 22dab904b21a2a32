use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AddressError, AmountError};
use crate::ledger::amount::{format_units, parse_units};

/// Ledger identifier. Every ledger this service talks to is EVM-compatible,
/// so the id is the chain id used in transactions and RPC calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub u64);

impl LedgerId {
    pub const ETHEREUM: LedgerId = LedgerId(1);
    pub const OPTIMISM: LedgerId = LedgerId(10);
    pub const POLYGON: LedgerId = LedgerId(137);
    pub const BASE: LedgerId = LedgerId(8453);
    pub const ARBITRUM: LedgerId = LedgerId(42161);

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// `0x`-prefixed hex quantity, as wallets expect it
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a `0x`-prefixed literal at compile time. Only used for
    /// built-in constants; a malformed literal fails the build.
    pub const fn from_literal(literal: &str) -> Self {
        const fn nibble(c: u8) -> u8 {
            match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => panic!("invalid hex digit in address literal"),
            }
        }

        let bytes = literal.as_bytes();
        assert!(bytes.len() == 42 && bytes[0] == b'0' && bytes[1] == b'x');

        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (nibble(bytes[2 + 2 * i]) << 4) | nibble(bytes[3 + 2 * i]);
            i += 1;
        }
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        let bytes = hex::decode(digits).map_err(|_| AddressError::InvalidHex(trimmed.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(trimmed.to_string()))?;

        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Where an asset lives on its ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum AssetRef {
    Native,
    Contract(Address),
}

impl AssetRef {
    /// Address form used by routing providers, which encode the native
    /// asset as the zero address.
    pub fn provider_address(&self) -> Address {
        match self {
            AssetRef::Native => Address::ZERO,
            AssetRef::Contract(address) => *address,
        }
    }

    pub fn from_provider_address(address: Address) -> Self {
        if address.is_zero() {
            AssetRef::Native
        } else {
            AssetRef::Contract(address)
        }
    }

    pub fn contract(&self) -> Option<&Address> {
        match self {
            AssetRef::Native => None,
            AssetRef::Contract(address) => Some(address),
        }
    }
}

/// Asset representation (ledger-specific)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub reference: AssetRef,
    pub decimals: u8,
}

impl Asset {
    pub fn native(symbol: &str, name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            reference: AssetRef::Native,
            decimals: 18,
        }
    }

    pub fn token(symbol: &str, name: &str, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            reference: AssetRef::Contract(address),
            decimals,
        }
    }

    pub fn is_native(&self) -> bool {
        self.reference == AssetRef::Native
    }

    /// Render an amount held in this asset's smallest units
    pub fn format(&self, units: u128) -> String {
        format_units(units, self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: LedgerId,
    pub name: String,
    pub native_asset: Asset,
    pub assets: Vec<Asset>,
}

impl Ledger {
    pub fn new(id: LedgerId, name: &str, native_asset: Asset) -> Self {
        Self {
            id,
            name: name.to_string(),
            assets: vec![native_asset.clone()],
            native_asset,
        }
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.retain(|existing| existing.symbol != asset.symbol);
        self.assets.push(asset);
        self
    }

    pub fn asset(&self, symbol: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|asset| asset.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Destination balance pool on the settlement venue.
///
/// The selector values are fixed by the custody contract: perp deposits use
/// `0`, spot deposits use the maximum `uint32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubAccount {
    Perp,
    Spot,
}

impl SubAccount {
    pub const PERP_SELECTOR: u32 = 0;
    pub const SPOT_SELECTOR: u32 = u32::MAX;

    pub fn selector(&self) -> u32 {
        match self {
            SubAccount::Perp => Self::PERP_SELECTOR,
            SubAccount::Spot => Self::SPOT_SELECTOR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubAccount::Perp => "perp",
            SubAccount::Spot => "spot",
        }
    }
}

impl fmt::Display for SubAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction hash as returned by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the user asked to move.
///
/// `amount` is the normalized decimal rendering of `amount_units`, so digits
/// truncated beyond the asset precision never show up in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferIntent {
    pub source_ledger: LedgerId,
    pub source_asset: Asset,
    pub amount: String,
    pub amount_units: u128,
    pub sub_account: SubAccount,
}

impl TransferIntent {
    pub fn new(
        source_ledger: LedgerId,
        source_asset: Asset,
        amount: &str,
        sub_account: SubAccount,
    ) -> Result<Self, AmountError> {
        let amount_units = parse_units(amount, source_asset.decimals)?;
        if amount_units == 0 {
            return Err(AmountError::Zero);
        }

        Ok(Self {
            source_ledger,
            amount: format_units(amount_units, source_asset.decimals),
            source_asset,
            amount_units,
            sub_account,
        })
    }
}
