pub mod jupiter;
pub mod serde_helpers;
