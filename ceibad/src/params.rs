//! Concrete selection parameters derived from on-chain protocol parameters.
//!
//! The cost model is the usual linear fee on the serialized transaction
//! size, and sizes follow the compact integer encoding of the wire format
//! closely enough for limit checks to be conservative. Exact serialization
//! lives in the ledger codec, not here.

use ceiba::{
    migration::SelectionParameters,
    value::{Coin, TokenBundle, TokenMap, TokenQuantity, TxSize},
};

use serde::{Deserialize, Serialize};

// Serialized size of a transaction input: a 32 byte transaction hash, the
// output index, and the framing around both.
const INPUT_SIZE: u64 = 37;

// Framing bytes of an output beyond its value content.
const OUTPUT_BASE_SIZE: u64 = 40;

// Per-asset overhead in an output: the 28 byte policy, the name framing and
// the entry itself.
const ASSET_BASE_SIZE: u64 = 32;

// A reward withdrawal carries a 29 byte account and the amount.
const WITHDRAWAL_BASE_SIZE: u64 = 31;

// Skeleton of a transaction with no inputs, outputs or withdrawals.
const EMPTY_SELECTION_SIZE: u64 = 20;

// How many bytes a compact unsigned integer takes on the wire.
fn compact_int_size(value: u64) -> u64 {
    match value {
        0..=23 => 1,
        24..=0xff => 2,
        0x100..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// The protocol parameters the migration engine needs, as supplied by the
/// host at startup. The defaults match current mainnet values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// The flat component of the linear fee, in coin atoms.
    pub fee_constant: u64,
    /// The size-proportional component of the linear fee, in coin atoms
    /// per byte.
    pub fee_per_byte: u64,
    /// Minimum ada deposit per byte of a stored output.
    pub coins_per_output_byte: u64,
    /// Serialized size limit for a single output.
    pub maximum_output_size: u64,
    /// Serialized size limit for a whole transaction.
    pub maximum_transaction_size: u64,
    /// Largest representable quantity of a single asset in one output.
    pub maximum_token_quantity: u64,
}

impl Default for ProtocolParameters {
    fn default() -> ProtocolParameters {
        ProtocolParameters {
            fee_constant: 155_381,
            fee_per_byte: 44,
            coins_per_output_byte: 4_310,
            maximum_output_size: 4_000,
            maximum_transaction_size: 16_384,
            maximum_token_quantity: 9_223_372_036_854_775_807,
        }
    }
}

impl ProtocolParameters {
    fn output_size(&self, output: &TokenBundle) -> u64 {
        let tokens_size: u64 = output
            .tokens
            .iter()
            .map(|(asset, quantity)| {
                ASSET_BASE_SIZE + asset.name.0.len() as u64 + compact_int_size(quantity.0)
            })
            .sum();
        OUTPUT_BASE_SIZE + compact_int_size(output.coin.0) + tokens_size
    }
}

impl SelectionParameters for ProtocolParameters {
    type Size = TxSize;

    fn cost_of_empty_selection(&self) -> Coin {
        Coin(self.fee_constant + EMPTY_SELECTION_SIZE * self.fee_per_byte)
    }

    fn cost_of_input(&self) -> Coin {
        Coin(INPUT_SIZE * self.fee_per_byte)
    }

    fn cost_of_output(&self, output: &TokenBundle) -> Coin {
        Coin(self.output_size(output) * self.fee_per_byte)
    }

    fn cost_of_reward_withdrawal(&self, amount: Coin) -> Coin {
        if amount.is_zero() {
            Coin::ZERO
        } else {
            Coin((WITHDRAWAL_BASE_SIZE + compact_int_size(amount.0)) * self.fee_per_byte)
        }
    }

    fn size_of_empty_selection(&self) -> TxSize {
        TxSize(EMPTY_SELECTION_SIZE)
    }

    fn size_of_input(&self) -> TxSize {
        TxSize(INPUT_SIZE)
    }

    fn size_of_output(&self, output: &TokenBundle) -> TxSize {
        TxSize(self.output_size(output))
    }

    fn size_of_reward_withdrawal(&self, amount: Coin) -> TxSize {
        if amount.is_zero() {
            TxSize(0)
        } else {
            TxSize(WITHDRAWAL_BASE_SIZE + compact_int_size(amount.0))
        }
    }

    fn maximum_size_of_output(&self) -> TxSize {
        TxSize(self.maximum_output_size)
    }

    fn maximum_size_of_selection(&self) -> TxSize {
        TxSize(self.maximum_transaction_size)
    }

    fn maximum_token_quantity(&self) -> TokenQuantity {
        TokenQuantity(self.maximum_token_quantity)
    }

    fn minimum_ada_quantity_for_output(&self, tokens: &TokenMap) -> Coin {
        // The deposit rule prices the stored output at its serialized size,
        // assessed with a worst-case coin encoding so the minimum does not
        // depend on the coin it constrains.
        let sizing = TokenBundle::new(Coin(u64::MAX), tokens.clone());
        Coin((160 + self.output_size(&sizing)) * self.coins_per_output_byte)
    }
}
