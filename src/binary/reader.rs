//! Binary workload container reader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ahash::AHashMap;
use flate2::read::GzDecoder;

use super::format::{expect_magic, read_u32, PACKETDB_MAGIC, RULEDB_MAGIC};
use crate::ruleset::PacketHeader;
use crate::{Error, Result};

/// A rule as persisted in the container: priority plus `(low, high)` bounds
/// per field. Prefix lengths are display-only and not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRule {
    /// Inclusive `(low, high)` bounds, one pair per field
    pub fields: Vec<(u32, u32)>,
    /// Precedence rank as assigned at parse time
    pub priority: u32,
}

impl LoadedRule {
    /// Returns true iff `header` lies inside every field range.
    pub fn matches(&self, header: &[u32]) -> bool {
        self.fields
            .iter()
            .zip(header)
            .all(|(&(low, high), &value)| value >= low && value <= high)
    }
}

/// A deserialized workload database: rules, headers, and the
/// header ↔ matching-rule-id association.
///
/// Rule ids in a loaded database are positions in the rule list.
#[derive(Debug)]
pub struct Database {
    rules: Vec<LoadedRule>,
    headers: Vec<PacketHeader>,
    header_rule: Vec<u32>,
    rule_headers: AHashMap<u32, Vec<u32>>,
    field_count: usize,
}

impl Database {
    /// Load a database from a gzip-compressed binary file.
    pub fn open(path: &Path) -> Result<Self> {
        log::debug!("loading binary database from {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Deserialize a database from a gzip-compressed stream.
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        let mut stream = GzDecoder::new(source);

        expect_magic(&mut stream, RULEDB_MAGIC)?;
        let rule_count = read_u32(&mut stream)? as usize;
        let field_count = read_u32(&mut stream)? as usize;

        let mut rules = Vec::with_capacity(rule_count);
        for _ in 0..rule_count {
            let priority = read_u32(&mut stream)?;
            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                let low = read_u32(&mut stream)?;
                let high = read_u32(&mut stream)?;
                fields.push((low, high));
            }
            rules.push(LoadedRule { fields, priority });
        }

        expect_magic(&mut stream, PACKETDB_MAGIC)?;
        let header_count = read_u32(&mut stream)? as usize;

        let mut headers = Vec::with_capacity(header_count);
        let mut header_rule = Vec::with_capacity(header_count);
        let mut rule_headers: AHashMap<u32, Vec<u32>> = AHashMap::new();
        for idx in 0..header_count {
            let mut header = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                header.push(read_u32(&mut stream)?);
            }
            let rule_id = read_u32(&mut stream)?;
            headers.push(header);
            header_rule.push(rule_id);
            rule_headers.entry(rule_id).or_default().push(idx as u32);
        }

        log::debug!("loaded {rule_count} rules, {header_count} headers");
        Ok(Self {
            rules,
            headers,
            header_rule,
            rule_headers,
            field_count,
        })
    }

    /// Number of fields per rule and header.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Number of rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Number of persisted headers.
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// Rule at `index`.
    pub fn rule(&self, index: usize) -> Result<&LoadedRule> {
        self.rules.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.rules.len(),
        })
    }

    /// All rules in precedence order.
    pub fn rules(&self) -> &[LoadedRule] {
        &self.rules
    }

    /// Header at `index`.
    pub fn header(&self, index: usize) -> Result<&[u32]> {
        self.headers
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.headers.len(),
            })
    }

    /// Rule id matched by the header at `index`.
    pub fn header_rule_id(&self, index: usize) -> Result<u32> {
        self.header_rule
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.header_rule.len(),
            })
    }

    /// Indices of the headers matching `rule_id`, or an empty slice if the
    /// rule has none.
    pub fn headers_for_rule(&self, rule_id: u32) -> &[u32] {
        self.rule_headers
            .get(&rule_id)
            .map_or(&[], Vec::as_slice)
    }
}
