//! ClassBench rule text parser.
//!
//! One rule per line, 10 tokens delimited by whitespace and `@`, with literal
//! `:` separators between the port bounds:
//!
//! ```text
//! @<src-ip>/<mask> <dst-ip>/<mask> <sport-lo> : <sport-hi> <dport-lo> : <dport-hi> <proto>/<mask> <flags>
//! ```
//!
//! Parsed field order in the model is
//! `[protocol, src-ip, dst-ip, src-port, dst-port]`.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};

use crate::ruleset::{FieldRange, Rule, RuleModel};
use crate::{Error, Result};

/// Tokens per ClassBench line.
const TOKENS_PER_LINE: usize = 10;

fn parse_error(line: usize, reason: impl Into<String>) -> Error {
    Error::Parse {
        line,
        reason: reason.into(),
    }
}

/// Parse `xxx.xxx.xxx.xxx/pp` into the 32-bit range it covers.
fn parse_ip_mask(token: &str, line: usize) -> Result<FieldRange> {
    let parts: Vec<u32> = token
        .split(['.', '/'])
        .map(|p| p.parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| parse_error(line, format!("invalid IP/mask: {token}")))?;

    if parts.len() != 5 || parts[..4].iter().any(|&octet| octet > 255) || parts[4] > 32 {
        return Err(parse_error(line, format!("invalid IP/mask: {token}")));
    }

    let prefix = parts[4] as u8;
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    let addr = (parts[0] << 24) | (parts[1] << 16) | (parts[2] << 8) | parts[3];
    let low = addr & mask;
    Ok(FieldRange::new(low, low | !mask, prefix))
}

/// Parse `0xVV/0xMM`. A full mask pins the protocol exactly; anything else
/// is treated as a wildcard over the 8-bit protocol space.
fn parse_protocol(token: &str, line: usize) -> Result<FieldRange> {
    let mut values = token.split('/').map(|p| {
        u32::from_str_radix(p.trim_start_matches("0x").trim_start_matches("0X"), 16)
    });
    let (value, mask) = match (values.next(), values.next()) {
        (Some(Ok(v)), Some(Ok(m))) => (v, m),
        _ => return Err(parse_error(line, format!("invalid protocol: {token}"))),
    };

    if mask == 0xff {
        Ok(FieldRange::new(value, value, 32))
    } else {
        Ok(FieldRange::new(0, 255, 24))
    }
}

/// Expand a port range to the longest shared-MSB-prefix wildcard covering it.
fn parse_port(low: u32, high: u32) -> FieldRange {
    let mut diff = low ^ high;
    let mut prefix = 0u8;
    while prefix < 32 && diff & 0x8000_0000 == 0 {
        prefix += 1;
        diff <<= 1;
    }

    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    FieldRange::new(low, low | !mask, prefix)
}

fn parse_u32(token: &str, line: usize, what: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .map_err(|_| parse_error(line, format!("invalid {what}: {token}")))
}

/// Read a ClassBench rule set.
///
/// Duplicate field tuples are dropped, keeping the first occurrence. With
/// `reverse_priorities` the first rule gets the largest priority value;
/// otherwise each rule's priority equals its unique id. Either way the rule
/// at index 0 has the highest matching precedence.
pub fn read_classbench<R: Read>(reader: R, reverse_priorities: bool) -> Result<RuleModel> {
    let mut rules: Vec<Rule> = Vec::new();
    let mut seen: HashSet<Vec<(u32, u32)>> = HashSet::new();
    let mut next_id = 1u32;

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = line_no + 1;
        let line = line?;
        let tokens: Vec<&str> = line
            .split(['@', ' ', '\t'])
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            continue;
        }
        if tokens.len() != TOKENS_PER_LINE {
            return Err(parse_error(
                line_no,
                format!("expected {TOKENS_PER_LINE} fields, found {}", tokens.len()),
            ));
        }
        if tokens[3] != ":" || tokens[6] != ":" {
            return Err(parse_error(
                line_no,
                format!(
                    "fields 3 and 6 must be ':', found '{}' and '{}'",
                    tokens[3], tokens[6]
                ),
            ));
        }

        let fields = vec![
            parse_protocol(tokens[8], line_no)?,
            parse_ip_mask(tokens[0], line_no)?,
            parse_ip_mask(tokens[1], line_no)?,
            parse_port(
                parse_u32(tokens[2], line_no, "source port")?,
                parse_u32(tokens[4], line_no, "source port")?,
            ),
            parse_port(
                parse_u32(tokens[5], line_no, "destination port")?,
                parse_u32(tokens[7], line_no, "destination port")?,
            ),
        ];

        let tuple: Vec<(u32, u32)> = fields.iter().map(|f| (f.low, f.high)).collect();
        if !seen.insert(tuple) {
            log::debug!("line {line_no}: duplicate rule skipped");
            continue;
        }

        rules.push(Rule::new(fields, next_id));
        next_id += 1;
    }

    // Priority 0 is invalid; assign from parse order.
    let count = rules.len() as u32;
    let mut model = RuleModel::new();
    for (idx, mut rule) in rules.into_iter().enumerate() {
        rule.priority = if reverse_priorities {
            count - idx as u32
        } else {
            rule.unique_id
        };
        model.push(rule)?;
    }

    Ok(model)
}
