//! Object identity for the midxr multi-pack-index library.
//!
//! Provides the 20-byte [`ObjectId`], hex encoding/decoding, abbreviated
//! [`OidPrefix`] matching, streaming digest computation, and the 256-entry
//! [`FanoutTable`] shared by pack indices and the multi-pack-index.

mod error;
pub mod hex;
mod oid;
mod prefix;
pub mod hasher;
pub mod fanout;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use hasher::Hasher;
pub use oid::ObjectId;
pub use prefix::OidPrefix;
