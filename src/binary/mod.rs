//! Gzip-compressed binary container for (rules, headers) workloads.
//!
//! # Stream layout
//!
//! ```text
//! "ruledb"   rule_count:u32  field_count:u32
//!   rule_count × { priority:u32, field_count × (low:u32, high:u32) }
//! "packetdb" header_count:u32
//!   header_count × { field_count × value:u32, matching_rule_id:u32 }
//! ```
//!
//! All integers are little-endian `u32`; the whole stream is gzip-compressed
//! and read strictly sequentially.

mod format;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use format::{PACKETDB_MAGIC, RULEDB_MAGIC};
pub use reader::{Database, LoadedRule};
pub use writer::{serialize, write_file};
