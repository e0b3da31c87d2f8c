//! # Core Data Types
//!
//! The values the resolution layer moves around. Blocks, headers and
//! transactions are opaque to this crate beyond their identity: each knows
//! how to compute its own [`ContentHash`], and that hash is what requests,
//! caches and gossip deliveries are keyed by.
//!
//! ```text
//! hash.rs       256-bit content identifier
//! location.rs   Prime / Region / Zone shard addressing
//! block.rs      Block, Header, Transaction payloads
//! ```

pub mod block;
pub mod hash;
pub mod location;

pub use block::{Block, Header, Transaction};
pub use hash::ContentHash;
pub use location::{Context, Location};
