//! Ledger value arithmetic.
//!
//! Ada amounts, multi-asset token maps and the bundles carried by
//! transaction outputs. All operations are checked: additions panic on
//! overflow (an overflowing wallet balance is a bug, not an error to
//! propagate) and subtractions are either saturating or explicitly partial.

use std::{
    cmp, fmt,
    iter::{FromIterator, Sum},
    num::NonZeroUsize,
};

use serde::{Deserialize, Serialize};

/// An amount of the native currency, in indivisible atoms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Coin(pub u64);

impl Coin {
    pub const ZERO: Coin = Coin(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Coin) -> Option<Coin> {
        self.0.checked_add(other.0).map(Coin)
    }

    pub fn checked_sub(&self, other: Coin) -> Option<Coin> {
        self.0.checked_sub(other.0).map(Coin)
    }

    pub fn saturating_sub(&self, other: Coin) -> Coin {
        Coin(self.0.saturating_sub(other.0))
    }

    /// The absolute difference between two amounts.
    pub fn distance(&self, other: Coin) -> Coin {
        Coin(if self.0 >= other.0 {
            self.0 - other.0
        } else {
            other.0 - self.0
        })
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Coin {
    type Output = Coin;

    fn add(self, other: Coin) -> Coin {
        self.checked_add(other).expect("coin addition overflow")
    }
}

impl Sum for Coin {
    fn sum<I: Iterator<Item = Coin>>(iter: I) -> Coin {
        iter.fold(Coin::ZERO, |acc, c| acc + c)
    }
}

/// A quantity of a single non-ada asset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TokenQuantity(pub u64);

impl TokenQuantity {
    pub const ZERO: TokenQuantity = TokenQuantity(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: TokenQuantity) -> Option<TokenQuantity> {
        self.0.checked_add(other.0).map(TokenQuantity)
    }

    pub fn checked_sub(&self, other: TokenQuantity) -> Option<TokenQuantity> {
        self.0.checked_sub(other.0).map(TokenQuantity)
    }
}

impl fmt::Display for TokenQuantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The hash of the monetary policy governing an asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub [u8; 28]);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// The name of an asset within its policy, an opaque byte string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AssetName(pub Vec<u8>);

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Identifies an asset class: the minting policy together with the asset
/// name. Ordered lexicographically on (policy, name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub policy: PolicyId,
    pub name: AssetName,
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.policy, self.name)
    }
}

/// A finite mapping from asset to quantity.
///
/// Invariant: zero quantities are never stored. Every constructor and
/// mutator maintains it, so `iter()` only ever yields positive entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenMap(std::collections::BTreeMap<AssetId, TokenQuantity>);

impl TokenMap {
    pub fn empty() -> TokenMap {
        TokenMap(Default::default())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.0.len()
    }

    pub fn quantity(&self, asset: &AssetId) -> TokenQuantity {
        self.0.get(asset).copied().unwrap_or(TokenQuantity::ZERO)
    }

    /// Set the quantity for an asset. A zero quantity removes the entry.
    pub fn set_quantity(&mut self, asset: AssetId, quantity: TokenQuantity) {
        if quantity.is_zero() {
            self.0.remove(&asset);
        } else {
            self.0.insert(asset, quantity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &TokenQuantity)> {
        self.0.iter()
    }

    /// The largest quantity held for any single asset, zero for the empty map.
    pub fn max_quantity(&self) -> TokenQuantity {
        self.0
            .values()
            .copied()
            .max()
            .unwrap_or(TokenQuantity::ZERO)
    }

    pub fn add(&self, other: &TokenMap) -> TokenMap {
        let mut result = self.clone();
        for (asset, quantity) in other.iter() {
            let total = result
                .quantity(asset)
                .checked_add(*quantity)
                .expect("token quantity addition overflow");
            result.set_quantity(asset.clone(), total);
        }
        result
    }

    /// Componentwise subtraction. `None` if any quantity would go negative.
    pub fn checked_sub(&self, other: &TokenMap) -> Option<TokenMap> {
        let mut result = self.clone();
        for (asset, quantity) in other.iter() {
            let remaining = result.quantity(asset).checked_sub(*quantity)?;
            result.set_quantity(asset.clone(), remaining);
        }
        Some(result)
    }

    /// Split the map into `count` maps whose sum is the original, dividing
    /// every quantity as evenly as possible. The leftover atoms of each
    /// asset go to a different run of parts, so maps of many single-atom
    /// assets spread out instead of piling up in the first part. Parts that
    /// end up empty are kept (the caller decides whether to discard them).
    pub fn equipartition(&self, count: NonZeroUsize) -> Vec<TokenMap> {
        let count = count.get();
        let mut parts = vec![TokenMap::empty(); count];
        for (position, (asset, quantity)) in self.iter().enumerate() {
            let base = quantity.0 / count as u64;
            let remainder = (quantity.0 % count as u64) as usize;
            for (index, part) in parts.iter_mut().enumerate() {
                let extra = (count + index - position % count) % count < remainder;
                part.set_quantity(asset.clone(), TokenQuantity(base + u64::from(extra)));
            }
        }
        parts
    }
}

impl FromIterator<(AssetId, TokenQuantity)> for TokenMap {
    fn from_iter<I: IntoIterator<Item = (AssetId, TokenQuantity)>>(iter: I) -> TokenMap {
        let mut map = TokenMap::empty();
        for (asset, quantity) in iter {
            if !quantity.is_zero() {
                let total = map
                    .quantity(&asset)
                    .checked_add(quantity)
                    .expect("token quantity addition overflow");
                map.set_quantity(asset, total);
            }
        }
        map
    }
}

/// The full value carried by a transaction output: some ada together with a
/// (possibly empty) multi-asset token map. Componentwise monoid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenBundle {
    pub coin: Coin,
    pub tokens: TokenMap,
}

impl TokenBundle {
    pub fn new(coin: Coin, tokens: TokenMap) -> TokenBundle {
        TokenBundle { coin, tokens }
    }

    pub fn from_coin(coin: Coin) -> TokenBundle {
        TokenBundle {
            coin,
            tokens: TokenMap::empty(),
        }
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn set_coin(&mut self, coin: Coin) {
        self.coin = coin;
    }

    /// A copy of this bundle with a different coin field.
    pub fn with_coin(&self, coin: Coin) -> TokenBundle {
        TokenBundle {
            coin,
            tokens: self.tokens.clone(),
        }
    }

    pub fn add(&self, other: &TokenBundle) -> TokenBundle {
        TokenBundle {
            coin: self.coin + other.coin,
            tokens: self.tokens.add(&other.tokens),
        }
    }

    /// Componentwise subtraction. `None` if either component would go
    /// negative.
    pub fn checked_sub(&self, other: &TokenBundle) -> Option<TokenBundle> {
        Some(TokenBundle {
            coin: self.coin.checked_sub(other.coin)?,
            tokens: self.tokens.checked_sub(&other.tokens)?,
        })
    }
}

impl Sum for TokenBundle {
    fn sum<I: Iterator<Item = TokenBundle>>(iter: I) -> TokenBundle {
        iter.fold(TokenBundle::default(), |acc, b| acc.add(&b))
    }
}

/// An additive, totally ordered measure of serialized size.
///
/// The selection engine is generic over this so tests can substitute a toy
/// size function for the production byte count.
pub trait Size: Clone + Ord + fmt::Debug {
    fn zero() -> Self;

    fn add(&self, other: &Self) -> Self;

    /// The absolute difference between two sizes.
    fn distance(&self, other: &Self) -> Self;
}

/// Transaction size in bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TxSize(pub u64);

impl Size for TxSize {
    fn zero() -> TxSize {
        TxSize(0)
    }

    fn add(&self, other: &TxSize) -> TxSize {
        TxSize(
            self.0
                .checked_add(other.0)
                .expect("transaction size overflow"),
        )
    }

    fn distance(&self, other: &TxSize) -> TxSize {
        TxSize(cmp::max(self.0, other.0) - cmp::min(self.0, other.0))
    }
}

impl fmt::Display for TxSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
