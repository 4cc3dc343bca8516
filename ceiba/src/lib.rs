//! Core library for the Ceiba wallet.
//!
//! Pure state machines only: value arithmetic, migration selection and the
//! pending-transaction submission store. Persistence, networking and the
//! command interface live in the `ceibad` crate.

pub mod migration;
pub mod submissions;
pub mod value;

pub use value::{AssetId, Coin, Size, TokenBundle, TokenMap, TokenQuantity, TxSize};
