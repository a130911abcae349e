//! Transaction leg: one directional half of an on-chain event for one wallet.

use crate::domain::{Address, Classification, Decimal, Direction, Network, TimeMs};
use serde::{Deserialize, Serialize};

/// Token descriptor. The native asset has no contract address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: String,
    pub contract_address: Option<String>,
    #[serde(default)]
    pub decimals: u8,
}

impl Asset {
    pub fn native(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            contract_address: None,
            decimals,
        }
    }

    pub fn token(symbol: &str, contract_address: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            contract_address: Some(contract_address.to_string()),
            decimals,
        }
    }

    /// Lot-matching key: lowercased contract address, or the uppercased symbol
    /// for native assets.
    pub fn key(&self) -> AssetKey {
        match self.contract_address.as_deref().map(str::trim) {
            Some(contract) if !contract.is_empty() => AssetKey(contract.to_ascii_lowercase()),
            _ => AssetKey(self.symbol.trim().to_ascii_uppercase()),
        }
    }
}

/// Identity used to group lots of the same asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    /// Build a key from user input (a contract address or a symbol).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("0x") || raw.starts_with("0X") {
            AssetKey(raw.to_ascii_lowercase())
        } else {
            AssetKey(raw.to_ascii_uppercase())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gas paid by the wallet for the transaction a leg belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegFee {
    pub quantity: Option<Decimal>,
    pub usd_value_at_timestamp: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLeg {
    /// Stable identity of this leg, used for deduplication and as lot id.
    pub id: String,
    pub timestamp: TimeMs,
    pub transaction_hash: String,
    pub wallet_address: Address,
    pub network: Network,
    pub direction: Direction,
    pub classification: Classification,
    /// Finer class tag reported by the source (e.g. "staking_reward").
    pub class_tag: Option<String>,
    pub asset: Asset,
    /// Magnitude only; the sign is carried by `direction`.
    pub quantity: Decimal,
    pub price_usd_at_timestamp: Option<Decimal>,
    pub usd_value_at_timestamp: Option<Decimal>,
    pub counterparty_address: Option<String>,
    pub counterparty_label: Option<String>,
    pub fee: Option<LegFee>,
}

impl TransactionLeg {
    pub fn new(
        wallet_address: Address,
        network: Network,
        transaction_hash: &str,
        timestamp: TimeMs,
        direction: Direction,
        asset: Asset,
        quantity: Decimal,
    ) -> Self {
        let transaction_hash = transaction_hash.trim().to_ascii_lowercase();
        let quantity = quantity.abs();
        let id = Self::compute_leg_key(
            &transaction_hash,
            direction,
            &wallet_address,
            &asset,
            &quantity,
            timestamp,
        );
        Self {
            id,
            timestamp,
            transaction_hash,
            wallet_address,
            network,
            direction,
            classification: Classification::from_tag(None, direction),
            class_tag: None,
            asset,
            quantity,
            price_usd_at_timestamp: None,
            usd_value_at_timestamp: None,
            counterparty_address: None,
            counterparty_label: None,
            fee: None,
        }
    }

    /// Attach the backend class tag and re-derive the classification.
    pub fn with_class_tag(mut self, tag: &str) -> Self {
        self.classification = Classification::from_tag(Some(tag), self.direction);
        self.class_tag = Some(tag.to_string());
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_pricing(mut self, price_usd: Option<Decimal>, usd_value: Option<Decimal>) -> Self {
        self.price_usd_at_timestamp = price_usd;
        self.usd_value_at_timestamp = usd_value;
        self
    }

    /// Set the unit price and derive the USD value from it.
    pub fn with_price(self, price_usd: Decimal) -> Self {
        let value = price_usd * self.quantity;
        self.with_pricing(Some(price_usd), Some(value))
    }

    pub fn with_counterparty(mut self, address: Option<&str>, label: Option<&str>) -> Self {
        self.counterparty_address = address.map(str::to_string);
        self.counterparty_label = label.map(str::to_string);
        self
    }

    pub fn with_fee(mut self, fee: LegFee) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn asset_key(&self) -> AssetKey {
        self.asset.key()
    }

    /// USD price per unit, falling back to value / quantity.
    pub fn unit_price_usd(&self) -> Option<Decimal> {
        self.price_usd_at_timestamp.or_else(|| {
            self.usd_value_at_timestamp
                .and_then(|value| value.checked_div(self.quantity))
        })
    }

    /// USD value of the whole leg, falling back to price * quantity.
    pub fn value_usd(&self) -> Option<Decimal> {
        self.usd_value_at_timestamp
            .or_else(|| self.price_usd_at_timestamp.map(|p| p * self.quantity))
    }

    pub fn fee_usd(&self) -> Option<Decimal> {
        self.fee.as_ref().and_then(|f| f.usd_value_at_timestamp)
    }

    /// Hash of the dedup identity: two fetches of the same leg produce the same key.
    pub fn compute_leg_key(
        transaction_hash: &str,
        direction: Direction,
        wallet_address: &Address,
        asset: &Asset,
        quantity: &Decimal,
        timestamp: TimeMs,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(transaction_hash.as_bytes());
        hasher.update([0u8]);
        hasher.update(direction.to_string());
        hasher.update([0u8]);
        hasher.update(wallet_address.as_str());
        hasher.update([0u8]);
        hasher.update(asset.key().as_str());
        hasher.update([0u8]);
        hasher.update(quantity.to_canonical_string());
        hasher.update([0u8]);
        hasher.update(timestamp.as_ms().to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
