//! Round-trip tests for the binary container.

use super::*;
use crate::ruleset::{FieldRange, PacketHeader, Rule, RuleModel};
use crate::Error;

fn sample_model() -> RuleModel {
    let mut model = RuleModel::new();
    for (id, ranges) in [
        (1u32, [(6, 6), (100, 200), (0, u32::MAX)]),
        (2, [(17, 17), (0, 1000), (80, 80)]),
        (3, [(0, 255), (0, u32::MAX), (0, u32::MAX)]),
    ] {
        let fields = ranges
            .iter()
            .map(|&(lo, hi)| FieldRange::new(lo, hi, 0))
            .collect();
        let mut rule = Rule::new(fields, id);
        rule.priority = id;
        model.push(rule).unwrap();
    }
    model
}

fn sample_headers() -> Vec<Vec<PacketHeader>> {
    vec![
        vec![vec![6, 150, 42], vec![6, 199, 7]],
        vec![vec![17, 500, 80]],
        vec![],
    ]
}

#[test]
fn test_round_trip() {
    let model = sample_model();
    let per_rule = sample_headers();

    let mut buffer = Vec::new();
    serialize(&mut buffer, &model, &per_rule).unwrap();
    let db = Database::from_reader(buffer.as_slice()).unwrap();

    assert_eq!(db.rule_count(), 3);
    assert_eq!(db.field_count(), 3);
    assert_eq!(db.header_count(), 3);

    for (idx, rule) in model.iter().enumerate() {
        let loaded = db.rule(idx).unwrap();
        assert_eq!(loaded.priority, rule.priority);
        let bounds: Vec<(u32, u32)> = rule.fields.iter().map(|f| (f.low, f.high)).collect();
        assert_eq!(loaded.fields, bounds);
    }

    // header/rule-id associations survive
    assert_eq!(db.header(0).unwrap(), &[6, 150, 42]);
    assert_eq!(db.header_rule_id(0).unwrap(), 0);
    assert_eq!(db.header_rule_id(2).unwrap(), 1);
    assert_eq!(db.headers_for_rule(0), &[0, 1]);
    assert_eq!(db.headers_for_rule(1), &[2]);
    assert!(db.headers_for_rule(2).is_empty());
}

#[test]
fn test_bad_magic_rejected() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut buffer = Vec::new();
    let mut gz = GzEncoder::new(&mut buffer, Compression::default());
    gz.write_all(b"not-a-ruledb-stream").unwrap();
    gz.finish().unwrap();

    let err = Database::from_reader(buffer.as_slice()).unwrap_err();
    assert!(matches!(err, Error::BadMagic { expected: "ruledb" }));
}

#[test]
fn test_truncated_stream_is_an_error() {
    let model = sample_model();
    let per_rule = sample_headers();

    let mut buffer = Vec::new();
    serialize(&mut buffer, &model, &per_rule).unwrap();
    // Chop the gzip stream mid-way
    buffer.truncate(buffer.len() / 2);

    assert!(Database::from_reader(buffer.as_slice()).is_err());
}

#[test]
fn test_out_of_range_accessors() {
    let model = sample_model();
    let mut buffer = Vec::new();
    serialize(&mut buffer, &model, &sample_headers()).unwrap();
    let db = Database::from_reader(buffer.as_slice()).unwrap();

    assert!(matches!(
        db.rule(99),
        Err(Error::IndexOutOfRange { index: 99, len: 3 })
    ));
    assert!(db.header(99).is_err());
    assert!(db.header_rule_id(99).is_err());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.bin.gz");

    let model = sample_model();
    write_file(&path, &model, &sample_headers()).unwrap();

    let db = Database::open(&path).unwrap();
    assert_eq!(db.rule_count(), model.len());
    assert_eq!(db.header_count(), 3);
}
