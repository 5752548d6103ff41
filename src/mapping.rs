//! Unique packet header synthesis.
//!
//! For every rule the generator synthesizes headers that match the rule and,
//! when possible, no rule of higher precedence. One worker thread per field
//! tracks the still-unclaimed value space with an [`IntervalSet`]; a value
//! drawn from the space a rule newly claims is guaranteed to fall outside
//! that field's range of every earlier rule, and a single guaranteed field is
//! enough to make the whole header unique.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::interval::IntervalSet;
use crate::ruleset::{PacketHeader, RuleModel};
use crate::{Error, Result};

/// Retry budget for rules whose headers cannot be guaranteed unique.
const FALLBACK_TRIES: usize = 5;

/// Poll interval of the worker progress monitor.
const MONITOR_INTERVAL: Duration = Duration::from_millis(200);

/// Per-field worker output.
struct FieldResult {
    /// `samples[i][j]` is the j-th value drawn for rule index i
    samples: Vec<Vec<u32>>,
    /// Rules whose claimed space was already exhausted in this field
    ambiguous: Vec<bool>,
}

/// Result of a generation run.
#[derive(Debug)]
pub struct MappingOutcome {
    headers: Vec<Vec<PacketHeader>>,
    unreachable: usize,
}

impl MappingOutcome {
    /// Headers generated for the rule at `index` (possibly empty).
    pub fn headers_for(&self, index: usize) -> &[PacketHeader] {
        &self.headers[index]
    }

    /// Per-rule header lists, indexed by rule position.
    pub fn per_rule(&self) -> &[Vec<PacketHeader>] {
        &self.headers
    }

    /// Total number of generated headers.
    pub fn header_count(&self) -> usize {
        self.headers.iter().map(Vec::len).sum()
    }

    /// Number of rules for which no valid header was found within the retry
    /// budget.
    pub fn unreachable(&self) -> usize {
        self.unreachable
    }

    /// Write the mapping as text, one line per header:
    /// `<rule_id>: <field0> <field1> ...`
    pub fn write_text<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (rule_id, headers) in self.headers.iter().enumerate() {
            for header in headers {
                write!(writer, "{rule_id}:")?;
                for value in header {
                    write!(writer, " {value}")?;
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}

/// Drives per-field interval claiming across all rules to synthesize
/// guaranteed-unique packet headers.
#[derive(Debug)]
pub struct MappingGenerator {
    seed: u64,
}

impl MappingGenerator {
    /// Create a generator. The same seed always produces the same mapping,
    /// regardless of worker scheduling.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Generate roughly `total_desired` headers spread evenly over the rules
    /// of `model`.
    ///
    /// The per-rule count is `total_desired / model.len()` (integer
    /// division). Rules whose headers cannot be guaranteed unique fall back
    /// to a bounded brute-force search and may end up with a single header or
    /// none at all; the latter are counted in
    /// [`MappingOutcome::unreachable`].
    pub fn run(&self, model: &RuleModel, total_desired: usize) -> Result<MappingOutcome> {
        if model.is_empty() {
            return Err(Error::EmptyRuleSet);
        }

        let field_count = model.field_count();
        let rule_count = model.len();
        let per_rule = total_desired / rule_count;

        log::info!(
            "generating {per_rule} headers per rule ({rule_count} rules, {field_count} fields)"
        );

        let progress: Vec<AtomicU32> = (0..field_count).map(|_| AtomicU32::new(0)).collect();
        let results: Vec<FieldResult> = thread::scope(|scope| {
            let handles: Vec<_> = (0..field_count)
                .map(|field| {
                    let progress = &progress[field];
                    let seed = sub_seed(self.seed, field);
                    scope.spawn(move || process_field(model, field, per_rule, seed, progress))
                })
                .collect();

            while !handles.iter().all(|handle| handle.is_finished()) {
                thread::sleep(MONITOR_INTERVAL);
                let status: Vec<String> = progress
                    .iter()
                    .enumerate()
                    .map(|(f, p)| format!("field-{f}: {}%", p.load(Ordering::Relaxed)))
                    .collect();
                log::debug!("mapping status: {}", status.join(" "));
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| Error::Consistency("field worker panicked".into()))
                })
                .collect::<Result<_>>()
        })?;

        // A rule is globally ambiguous only if no field could guarantee it.
        let globally_ambiguous: Vec<bool> = (0..rule_count)
            .map(|i| results.iter().all(|r| r.ambiguous[i]))
            .collect();
        let ambiguous_count = globally_ambiguous.iter().filter(|&&a| a).count();
        log::info!("non-unique rules: {ambiguous_count}");

        // Combine per-field samples positionally for every unambiguous rule.
        let mut headers: Vec<Vec<PacketHeader>> = vec![Vec::new(); rule_count];
        for (i, slot) in headers.iter_mut().enumerate() {
            if globally_ambiguous[i] {
                continue;
            }
            *slot = (0..per_rule)
                .map(|j| results.iter().map(|r| r.samples[i][j]).collect())
                .collect();
        }

        // Bounded brute-force search for the ambiguous remainder.
        let mut rng = StdRng::seed_from_u64(sub_seed(self.seed, field_count));
        let mut unreachable = 0;
        for i in (0..rule_count).filter(|&i| globally_ambiguous[i]) {
            match fallback_header(model, i, &mut rng) {
                Some(header) => headers[i].push(header),
                None => unreachable += 1,
            }
        }
        if unreachable > 0 {
            log::warn!("could not generate a mapping for {unreachable} rules");
        }

        let outcome = MappingOutcome {
            headers,
            unreachable,
        };
        verify(model, &outcome)?;
        Ok(outcome)
    }
}

/// Derive a deterministic per-worker seed from the master seed.
fn sub_seed(master: u64, stream: usize) -> u64 {
    master ^ (stream as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Claim value space rule by rule for one field, drawing `per_rule` samples
/// each. Rules with no unclaimed space left are marked ambiguous and sampled
/// from their own range instead.
fn process_field(
    model: &RuleModel,
    field: usize,
    per_rule: usize,
    seed: u64,
    progress: &AtomicU32,
) -> FieldResult {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut unclaimed = IntervalSet::full();
    let rule_count = model.len();

    let mut samples = Vec::with_capacity(rule_count);
    let mut ambiguous = vec![false; rule_count];

    for (i, rule) in model.iter().enumerate() {
        let range = rule.fields[field];
        let claimed = unclaimed.remove(range.low, range.high);

        let values: Vec<u32> = if claimed.is_empty() {
            ambiguous[i] = true;
            (0..per_rule)
                .map(|_| rng.gen_range(range.low..=range.high))
                .collect()
        } else {
            (0..per_rule)
                .map(|_| claimed.random_value(&mut rng))
                .collect()
        };
        samples.push(values);

        progress.store((i * 100 / rule_count) as u32, Ordering::Relaxed);
    }
    progress.store(100, Ordering::Relaxed);

    FieldResult { samples, ambiguous }
}

/// Draw uniform headers inside the rule's own ranges until one collides with
/// no earlier rule, within the retry budget.
fn fallback_header(model: &RuleModel, index: usize, rng: &mut StdRng) -> Option<PacketHeader> {
    let rule = &model[index];
    for _ in 0..FALLBACK_TRIES {
        let header: PacketHeader = rule
            .fields
            .iter()
            .map(|range| rng.gen_range(range.low..=range.high))
            .collect();
        let shadowed = model.rules()[..index]
            .iter()
            .any(|earlier| earlier.matches(&header));
        if !shadowed {
            return Some(header);
        }
    }
    None
}

/// Re-check the core correctness invariant for every emitted header: it lies
/// inside all of its rule's ranges and outside at least one range of every
/// earlier rule. A violation is a generator bug and aborts the run.
fn verify(model: &RuleModel, outcome: &MappingOutcome) -> Result<()> {
    log::info!("verifying generated mapping");
    for (i, headers) in outcome.headers.iter().enumerate() {
        for header in headers {
            if !model[i].matches(header) {
                return Err(Error::Consistency(format!(
                    "header {header:?} does not match its own rule (index {i})"
                )));
            }
            if let Some(shadow) = model.rules()[..i].iter().position(|r| r.matches(header)) {
                return Err(Error::Consistency(format!(
                    "header {header:?} of rule index {i} is shadowed by rule index {shadow}"
                )));
            }
        }
    }
    Ok(())
}
