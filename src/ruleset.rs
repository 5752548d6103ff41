//! Priority-ranked multi-field range rules.
//!
//! A [`RuleModel`] is an ordered collection of [`Rule`]s where index order
//! implies matching precedence: the rule at index 0 is consulted first.
//! Rules are immutable after insertion and addressable both by position and
//! by their unique id.

use ahash::AHashMap;

use crate::{Error, Result};

/// A packet header: one raw 32-bit value per field.
///
/// The field count is runtime data, fixed per rule set at load time.
pub type PacketHeader = Vec<u32>;

/// An inclusive range of 32-bit values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    /// Low bound (inclusive)
    pub low: u32,
    /// High bound (inclusive)
    pub high: u32,
    /// Number of exact-match bits (0-32), display only
    pub prefix: u8,
}

impl FieldRange {
    /// Create a new field range.
    pub const fn new(low: u32, high: u32, prefix: u8) -> Self {
        Self { low, high, prefix }
    }

    /// Returns true iff `value` lies inside this range.
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.low && value <= self.high
    }

    /// Returns true iff this range overlaps `other`.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

/// A single classification rule: one range per field plus precedence data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// One inclusive range per field
    pub fields: Vec<FieldRange>,
    /// Immutable id, monotonic from 1, assigned at parse time
    pub unique_id: u32,
    /// Precedence rank, > 0 and unique within a rule set
    pub priority: u32,
}

impl Rule {
    /// Create a rule. The priority is assigned later by the parser.
    pub fn new(fields: Vec<FieldRange>, unique_id: u32) -> Self {
        Self {
            fields,
            unique_id,
            priority: 0,
        }
    }

    /// Number of fields in this rule.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns true iff `header` lies inside every field range of this rule.
    pub fn matches(&self, header: &[u32]) -> bool {
        self.fields
            .iter()
            .zip(header)
            .all(|(range, value)| range.contains(*value))
    }

    /// Returns true iff this rule could match a packet that `other` also
    /// matches, i.e. the ranges overlap in every field.
    pub fn collides(&self, other: &Self) -> bool {
        self.fields
            .iter()
            .zip(&other.fields)
            .all(|(a, b)| a.overlaps(b))
    }
}

/// An ordered, priority-ranked set of rules with id-based lookup.
#[derive(Debug, Default)]
pub struct RuleModel {
    rules: Vec<Rule>,
    id_map: AHashMap<u32, usize>,
}

impl RuleModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true iff the model holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of fields per rule, or 0 for an empty model.
    pub fn field_count(&self) -> usize {
        self.rules.first().map_or(0, Rule::field_count)
    }

    /// Append a rule at the lowest precedence position.
    ///
    /// Fails with [`Error::DuplicateRuleId`] if a rule with the same id is
    /// already present.
    pub fn push(&mut self, rule: Rule) -> Result<()> {
        if self.id_map.contains_key(&rule.unique_id) {
            return Err(Error::DuplicateRuleId(rule.unique_id));
        }
        self.id_map.insert(rule.unique_id, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Rule at position `index` (index 0 has the highest precedence).
    pub fn get(&self, index: usize) -> Result<&Rule> {
        self.rules.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.rules.len(),
        })
    }

    /// Rule with unique id `id`.
    pub fn get_by_id(&self, id: u32) -> Result<&Rule> {
        self.id_map
            .get(&id)
            .map(|&idx| &self.rules[idx])
            .ok_or(Error::RuleNotFound(id))
    }

    /// Returns true iff a rule with id `id` is present.
    pub fn contains_id(&self, id: u32) -> bool {
        self.id_map.contains_key(&id)
    }

    /// Iterate rules in precedence order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// All rules as a slice, in precedence order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl std::ops::Index<usize> for RuleModel {
    type Output = Rule;

    fn index(&self, index: usize) -> &Rule {
        &self.rules[index]
    }
}

impl<'a> IntoIterator for &'a RuleModel {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: u32, ranges: &[(u32, u32)]) -> Rule {
        let fields = ranges
            .iter()
            .map(|&(lo, hi)| FieldRange::new(lo, hi, 0))
            .collect();
        Rule::new(fields, id)
    }

    #[test]
    fn test_push_and_lookup() {
        let mut model = RuleModel::new();
        model.push(rule(1, &[(0, 10), (5, 5)])).unwrap();
        model.push(rule(2, &[(20, 30), (0, u32::MAX)])).unwrap();

        assert_eq!(model.len(), 2);
        assert_eq!(model.field_count(), 2);
        assert_eq!(model.get(0).unwrap().unique_id, 1);
        assert_eq!(model.get_by_id(2).unwrap().fields[0].low, 20);
        assert!(model.contains_id(1));
        assert!(!model.contains_id(3));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut model = RuleModel::new();
        model.push(rule(7, &[(0, 1)])).unwrap();
        assert!(matches!(
            model.push(rule(7, &[(2, 3)])),
            Err(Error::DuplicateRuleId(7))
        ));
    }

    #[test]
    fn test_out_of_range_index() {
        let model = RuleModel::new();
        assert!(matches!(
            model.get(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_matches_and_collides() {
        let a = rule(1, &[(0, 100), (50, 60)]);
        let b = rule(2, &[(90, 200), (55, 70)]);
        let c = rule(3, &[(150, 200), (0, 10)]);

        assert!(a.matches(&[10, 55]));
        assert!(!a.matches(&[10, 61]));

        assert!(a.collides(&b));
        assert!(!a.collides(&c));
        assert!(!b.collides(&c));
    }
}
