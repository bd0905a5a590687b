//! Factual conflict detection across retrieved sources.
//!
//! A fixed table of extractors pulls structured facts (cancellation
//! notice, VAT rate, prices, ...) out of result content. Facts are grouped
//! by field, and a field whose facts disagree across two or more sources is
//! reported as a [`Conflict`]. Detection is advisory: it never drops or
//! reorders results.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use hebelki_core::Corpus;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::result::SearchResult;

/// A fact pulled out of one result's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    /// Field name, e.g. `cancellationHours`.
    pub field: &'static str,
    /// Normalized value.
    pub value: String,
    /// Unit of `value`.
    pub unit: &'static str,
    /// Corpus of the result the fact came from.
    pub source: Corpus,
    /// Id of the result the fact came from.
    pub source_id: Uuid,
    /// Title of the result the fact came from.
    pub title: String,
}

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictValue {
    /// Normalized value claimed by the source.
    pub value: String,
    /// Corpus of the claiming result.
    pub source: Corpus,
    /// Id of the claiming result.
    pub source_id: Uuid,
    /// Title of the claiming result.
    pub title: String,
}

/// Two or more sources disagreeing about one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Field name.
    pub field: String,
    /// Unit shared by all values.
    pub unit: String,
    /// Every (value, source) pair found, sorted by value then source.
    pub values: Vec<ConflictValue>,
}

/// How the matches of one row combine within a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Every match is a separate fact.
    Each,
    /// All matches in one result are joined (`; `) into a single fact.
    Joined,
}

/// One row of the extractor table.
pub struct FactRule {
    /// Field the rule feeds.
    pub field: &'static str,
    /// Unit of the normalized value.
    pub unit: &'static str,
    /// Compiled pattern; `None` if it failed to compile.
    pub regex: &'static LazyLock<Option<Regex>>,
    /// Turns a match into a normalized value; `None` skips the match.
    pub normalize: fn(&Captures) -> Option<String>,
    /// How multiple matches in one result combine.
    pub cardinality: Cardinality,
}

macro_rules! fact_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

const HOURS: &str = r"(?:stunden|std\.?|hours?|hrs?|h)\b";
const CANCEL: &str = r"(?:storn\w*|absag\w*|cancel\w*|rücktritt\w*)";
/// Start of a standalone number: not the closing end of a `9-18` range.
const NUMBER_START: &str = r"(?:^|[^\d\-–:.,\s])\s*";

// ── Cancellation notice ────────────────────────────────────────────────────
fact_pattern!(
    RE_CANCEL_HOURS,
    &format!(r"(?i){CANCEL}[^.\n\d]{{0,60}}?(\d{{1,3}})\s*{HOURS}")
);
fact_pattern!(
    RE_HOURS_CANCEL,
    &format!(r"(?i){NUMBER_START}(\d{{1,3}})\s*{HOURS}[^.\n]{{0,40}}?{CANCEL}")
);
fact_pattern!(
    RE_CANCEL_DAYS,
    &format!(r"(?i){CANCEL}[^.\n\d]{{0,60}}?(\d{{1,2}})\s*(?:tagen?|tage|days?)\b")
);

// ── Minimum booking notice ─────────────────────────────────────────────────
fact_pattern!(
    RE_MIN_NOTICE,
    &format!(
        r"(?i)(?:vorlauf\w*|mindestvorlauf|minimum notice|notice of at least|buchungsfrist)[^.\n\d]{{0,30}}(\d{{1,3}})\s*{HOURS}"
    )
);
fact_pattern!(
    RE_MIN_NOTICE_ADVANCE,
    &format!(
        r"(?i)(?:mindestens|at least)\s+(\d{{1,3}})\s*{HOURS}[^.\n]{{0,30}}?(?:im voraus|in advance|vor dem termin|before the appointment)"
    )
);

// ── Maximum advance booking ────────────────────────────────────────────────
fact_pattern!(
    RE_MAX_ADVANCE,
    r"(?i)(?:bis zu|maximal|höchstens|up to|max\.?)\s+(\d{1,3})\s*(tagen?|tage|wochen?|days?|weeks?)\b[^.\n]{0,30}?(?:im voraus|in advance|ahead|vorher)"
);

// ── VAT ────────────────────────────────────────────────────────────────────
fact_pattern!(
    RE_VAT,
    r"(?i)(?:mwst|mehrwertsteuer|ust|umsatzsteuer|vat)\b[^\d\n]{0,20}(\d{1,2}(?:[.,]\d{1,2})?)\s*%"
);
fact_pattern!(
    RE_VAT_SUFFIX,
    r"(?i)(\d{1,2}(?:[.,]\d{1,2})?)\s*%\s*(?:mwst|mehrwertsteuer|ust|umsatzsteuer|vat)\b"
);

// ── Opening hours ──────────────────────────────────────────────────────────
const DAY: &str = r"(?:montag|dienstag|mittwoch|donnerstag|freitag|samstag|sonntag|monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun|mo|di|mi|do|fr|sa|so)";
const TIME: &str = r"\d{1,2}(?:[:.]\d{2})?";
const DAY_RANGE: &str = r"(?:[-–]|bis|to|until)";
fact_pattern!(
    RE_OPENING_HOURS,
    &format!(
        r"(?i)\b({DAY})\.?(?:\s*{DAY_RANGE}\s*({DAY})\.?)?\s*:?\s*({TIME})\s*(?:uhr)?\s*[-–]\s*({TIME})\s*(?:uhr)?"
    )
);

// ── Prices ─────────────────────────────────────────────────────────────────
fact_pattern!(
    RE_PRICE,
    r"(?i)(\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?)\s*(?:€|eur\b|euro\b)"
);
fact_pattern!(RE_PRICE_PREFIX, r"(?i)(?:€|eur\b)\s*(\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?)");

// ── Duration ───────────────────────────────────────────────────────────────
fact_pattern!(RE_DURATION, r"(?i)(\d{1,3})\s*(?:minuten|minutes|mins?)\b");

/// The built-in extractor table.
pub static DEFAULT_RULES: &[FactRule] = &[
    FactRule {
        field: "cancellationHours",
        unit: "hours",
        regex: &RE_CANCEL_HOURS,
        normalize: first_integer,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "cancellationHours",
        unit: "hours",
        regex: &RE_HOURS_CANCEL,
        normalize: first_integer,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "cancellationHours",
        unit: "hours",
        regex: &RE_CANCEL_DAYS,
        normalize: days_as_hours,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "minNoticeHours",
        unit: "hours",
        regex: &RE_MIN_NOTICE,
        normalize: first_integer,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "minNoticeHours",
        unit: "hours",
        regex: &RE_MIN_NOTICE_ADVANCE,
        normalize: first_integer,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "maxAdvanceDays",
        unit: "days",
        regex: &RE_MAX_ADVANCE,
        normalize: span_as_days,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "vatPercent",
        unit: "percent",
        regex: &RE_VAT,
        normalize: first_decimal,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "vatPercent",
        unit: "percent",
        regex: &RE_VAT_SUFFIX,
        normalize: first_decimal,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "openingHours",
        unit: "schedule",
        regex: &RE_OPENING_HOURS,
        normalize: schedule,
        cardinality: Cardinality::Joined,
    },
    FactRule {
        field: "price",
        unit: "EUR",
        regex: &RE_PRICE,
        normalize: amount,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "price",
        unit: "EUR",
        regex: &RE_PRICE_PREFIX,
        normalize: amount,
        cardinality: Cardinality::Each,
    },
    FactRule {
        field: "durationMinutes",
        unit: "minutes",
        regex: &RE_DURATION,
        normalize: first_integer,
        cardinality: Cardinality::Each,
    },
];

// --- Normalizers ---

fn first_integer(caps: &Captures) -> Option<String> {
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(n.to_string())
}

fn days_as_hours(caps: &Captures) -> Option<String> {
    let days: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some((days * 24).to_string())
}

fn span_as_days(caps: &Captures) -> Option<String> {
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let days = if unit.starts_with('w') { n * 7 } else { n };
    Some(days.to_string())
}

fn first_decimal(caps: &Captures) -> Option<String> {
    let raw = caps.get(1)?.as_str().replace(',', ".");
    format_number(raw.parse().ok()?)
}

/// Parses `80`, `80,50`, `1.200`, `1.200,50` and `1,200.50`.
fn amount(caps: &Captures) -> Option<String> {
    let raw = caps.get(1)?.as_str();
    let last_sep = raw.rfind(['.', ',']);
    let cleaned = match last_sep {
        // A trailing group of one or two digits is the decimal part.
        Some(idx) if raw.len() - idx - 1 <= 2 => {
            let (int, frac) = raw.split_at(idx);
            format!("{}.{}", int.replace(['.', ','], ""), &frac[1..])
        }
        _ => raw.replace(['.', ','], ""),
    };
    format_number(cleaned.parse().ok()?)
}

fn format_number(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 {
        Some(format!("{}", n as i64))
    } else {
        Some(format!("{n}"))
    }
}

fn canonical_day(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    let prefix: String = lower.chars().take(2).collect();
    Some(match prefix.as_str() {
        "mo" => "mon",
        "di" | "tu" => "tue",
        "mi" | "we" => "wed",
        "do" | "th" => "thu",
        "fr" => "fri",
        "sa" => "sat",
        "so" | "su" => "sun",
        _ => return None,
    })
}

fn canonical_time(raw: &str) -> Option<String> {
    let mut parts = raw.split([':', '.']);
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if hour > 24 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn schedule(caps: &Captures) -> Option<String> {
    let from = canonical_day(caps.get(1)?.as_str())?;
    let days = match caps.get(2) {
        Some(to) => format!("{from}-{}", canonical_day(to.as_str())?),
        None => from.to_string(),
    };
    let open = canonical_time(caps.get(3)?.as_str())?;
    let close = canonical_time(caps.get(4)?.as_str())?;
    Some(format!("{days} {open}-{close}"))
}

// --- Detector ---

/// Extracts facts from results and reports disagreements.
pub struct ConflictDetector {
    rules: &'static [FactRule],
}

impl ConflictDetector {
    /// Detector over the built-in extractor table.
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES,
        }
    }

    /// Detector over a custom extractor table.
    pub fn with_rules(rules: &'static [FactRule]) -> Self {
        Self { rules }
    }

    /// Every fact found in one result, in table order.
    pub fn extract(&self, result: &SearchResult) -> Vec<ExtractedFact> {
        let mut facts = Vec::new();
        let mut joined: BTreeMap<&'static str, (&'static str, Vec<String>)> = BTreeMap::new();

        for rule in self.rules {
            let Some(regex) = rule.regex.as_ref() else {
                continue;
            };
            for caps in regex.captures_iter(&result.content) {
                let Some(value) = (rule.normalize)(&caps) else {
                    continue;
                };
                match rule.cardinality {
                    Cardinality::Each => facts.push(ExtractedFact {
                        field: rule.field,
                        value,
                        unit: rule.unit,
                        source: result.source,
                        source_id: result.id,
                        title: result.title.clone(),
                    }),
                    Cardinality::Joined => {
                        let (_, parts) = joined
                            .entry(rule.field)
                            .or_insert_with(|| (rule.unit, Vec::new()));
                        if !parts.contains(&value) {
                            parts.push(value);
                        }
                    }
                }
            }
        }

        for (field, (unit, parts)) in joined {
            facts.push(ExtractedFact {
                field,
                value: parts.join("; "),
                unit,
                source: result.source,
                source_id: result.id,
                title: result.title.clone(),
            });
        }
        facts
    }

    /// Conflicts among `results`, sorted by field name.
    ///
    /// A field conflicts when its facts carry at least two distinct values
    /// and come from at least two distinct results.
    pub fn detect(&self, results: &[SearchResult]) -> Vec<Conflict> {
        let mut by_field: BTreeMap<&'static str, Vec<ExtractedFact>> = BTreeMap::new();
        for result in results {
            for fact in self.extract(result) {
                by_field.entry(fact.field).or_default().push(fact);
            }
        }

        by_field
            .into_iter()
            .filter_map(|(field, facts)| {
                let distinct_values: BTreeSet<&str> =
                    facts.iter().map(|f| f.value.as_str()).collect();
                let distinct_sources: BTreeSet<(Corpus, Uuid)> =
                    facts.iter().map(|f| (f.source, f.source_id)).collect();
                if distinct_values.len() < 2 || distinct_sources.len() < 2 {
                    return None;
                }

                let unit = facts.first().map(|f| f.unit).unwrap_or_default();
                let mut values: Vec<ConflictValue> = facts
                    .into_iter()
                    .map(|f| ConflictValue {
                        value: f.value,
                        source: f.source,
                        source_id: f.source_id,
                        title: f.title,
                    })
                    .collect();
                values.sort_by(|a, b| {
                    (&a.value, a.source, a.source_id).cmp(&(&b.value, b.source, b.source_id))
                });
                values.dedup_by(|a, b| a.value == b.value && a.source_id == b.source_id);

                Some(Conflict {
                    field: field.to_string(),
                    unit: unit.to_string(),
                    values,
                })
            })
            .collect()
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}
