pub mod composer;
pub mod message;
pub mod substitution;
pub mod wire;

pub use composer::{
    ComposeRequest, ComposedTransaction, CompositionError, GameTarget, TransactionComposer,
};
pub use substitution::PlaceholderIdentity;
pub use wire::encode_transaction;
