//! An in-memory table for IPv4 and IPv6 prefixes with longest-prefix-match
//! lookups.
//!
//! The table stores `(prefix, value)` pairs in a radix trie with 8-bit
//! strides. Each node embeds a complete binary tree over all sub-prefixes
//! of its stride, so that one bitset intersection answers "which stored
//! prefix best matches this octet" without looping. Single routes are kept
//! path-compressed as leaf or fringe children until a second route forces a
//! real node into existence.
//!
//! ```
//! use lpm_store::{Prefix, Table};
//! use std::str::FromStr;
//!
//! let mut table = Table::new();
//! table.insert(&Prefix::from_str("10.0.0.0/8").unwrap(), 100u32);
//! table.insert(&Prefix::from_str("10.1.0.0/16").unwrap(), 200u32);
//!
//! let (pfx, value) = table.lookup("10.1.2.3".parse().unwrap()).unwrap();
//! assert_eq!(pfx, Prefix::from_str("10.1.0.0/16").unwrap());
//! assert_eq!(*value, 200);
//! ```
//!
//! All mutating operations have persistent (`*_persist`) variants that
//! return a new table and leave the original untouched; the two tables
//! share all structure that the mutation did not touch.

mod stats;
mod table;
mod trie;
mod types;

pub use inetnum::addr::Prefix;

pub use crate::table::Table;
pub use crate::types::af::{AddressFamily, IPv4, IPv6};
pub use crate::types::errors::PrefixStoreError;
pub use crate::types::match_options::{MatchOptions, MatchType, QueryResult};
