//! Binary workload container writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::format::{write_magic, write_u32, PACKETDB_MAGIC, RULEDB_MAGIC};
use crate::ruleset::{PacketHeader, RuleModel};
use crate::Result;

/// Serialize a rule model and its generated headers into a gzip-compressed
/// binary stream.
///
/// `per_rule` is indexed by rule position; the persisted
/// `matching_rule_id` of each header is that index.
pub fn serialize<W: Write>(
    sink: W,
    model: &RuleModel,
    per_rule: &[Vec<PacketHeader>],
) -> Result<()> {
    debug_assert_eq!(model.len(), per_rule.len());

    let mut out = GzEncoder::new(sink, Compression::best());
    let field_count = model.field_count() as u32;

    write_magic(&mut out, RULEDB_MAGIC)?;
    write_u32(&mut out, model.len() as u32)?;
    write_u32(&mut out, field_count)?;
    for rule in model {
        write_u32(&mut out, rule.priority)?;
        for field in &rule.fields {
            write_u32(&mut out, field.low)?;
            write_u32(&mut out, field.high)?;
        }
    }

    let header_count: usize = per_rule.iter().map(Vec::len).sum();
    write_magic(&mut out, PACKETDB_MAGIC)?;
    write_u32(&mut out, header_count as u32)?;
    for (rule_id, headers) in per_rule.iter().enumerate() {
        for header in headers {
            for value in header {
                write_u32(&mut out, *value)?;
            }
            write_u32(&mut out, rule_id as u32)?;
        }
    }

    out.finish()?;
    Ok(())
}

/// Serialize to a file on disk.
pub fn write_file(
    path: &Path,
    model: &RuleModel,
    per_rule: &[Vec<PacketHeader>],
) -> Result<()> {
    log::info!("writing binary database to {}", path.display());
    let file = File::create(path)?;
    serialize(file, model, per_rule)
}
