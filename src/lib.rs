//! Rulemap - ClassBench packet-classification workload generation and replay.
//!
//! This crate turns firewall/ACL-style rule sets in ClassBench format into
//! reproducible packet-classification benchmark workloads and serves them to
//! test harnesses under concurrent rule-set churn.
//!
//! # Features
//!
//! - **ClassBench parsing**: 5-tuple range rules (protocol, src/dst IP,
//!   src/dst port) with priorities assigned from parse order
//! - **Unique header synthesis**: interval algebra over the unclaimed value
//!   space guarantees, where possible, that each generated header matches its
//!   rule and no higher-priority rule
//! - **Compressed binary container**: gzip-compressed sequential format
//!   holding rules, headers, and their associations
//! - **Lock-free replay view**: triple-generation single-writer /
//!   multi-reader structure for sampling headers while the active rule set
//!   churns
//! - **Reproducible**: every entropy consumer takes an explicit seed
//!
//! # Quick Start
//!
//! ```no_run
//! use rulemap::{binary, classbench, view, MappingGenerator};
//! use std::fs::File;
//! use std::path::Path;
//!
//! # fn main() -> rulemap::Result<()> {
//! // Parse a ClassBench rule set and synthesize headers
//! let model = classbench::read_classbench(File::open("acl1.txt")?, false)?;
//! let outcome = MappingGenerator::new(42).run(&model, 1_000_000)?;
//! binary::write_file(Path::new("acl1.bin.gz"), &model, outcome.per_rule())?;
//!
//! // Serve the workload to a benchmark harness
//! let (mut writer, reader) = view::open(Path::new("acl1.bin.gz"), 42)?;
//! writer.set_all();
//! writer.commit();
//!
//! let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(42);
//! for (header, rule_id) in reader.select_headers(64, &mut rng) {
//!     // feed (header, expected match) to the classifier under test
//!     let _ = (header, rule_id);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod interval;
mod mapping;
mod ruleset;

pub mod binary;
pub mod classbench;
pub mod view;

// Re-export core types
pub use error::{Error, Result};
pub use interval::IntervalSet;
pub use mapping::{MappingGenerator, MappingOutcome};
pub use ruleset::{FieldRange, PacketHeader, Rule, RuleModel};

// Re-export the database and view handles for harness use
pub use binary::{Database, LoadedRule};
pub use view::{ViewReader, ViewWriter};
