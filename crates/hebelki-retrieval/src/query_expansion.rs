//! Bilingual (German / English) query augmentation.
//!
//! Customers ask in either language while the knowledge base is usually
//! written in one. [`RuleBasedExpander`] bridges the gap with three fixed
//! tables: cross-language translations per domain, same-language synonym
//! families, and phrase-intent rules such as "wie viel kostet ...".

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on `augmented` entries, the original included.
pub const MAX_AUGMENTED_TERMS: usize = 12;

/// Result of augmenting one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentedQuery {
    /// The query as given (trimmed).
    pub original: String,
    /// Original first, then intent terms, translations and synonyms.
    pub augmented: Vec<String>,
    /// Cross-language terms found.
    pub translations: Vec<String>,
    /// Same-language terms found.
    pub synonyms: Vec<String>,
    /// Terms contributed by phrase-intent rules.
    pub intent_terms: Vec<String>,
}

impl AugmentedQuery {
    /// The first `max` entries of `augmented` (always including the original).
    pub fn variants(&self, max: usize) -> Vec<String> {
        self.augmented.iter().take(max.max(1)).cloned().collect()
    }

    /// True when anything beyond the original was produced.
    pub fn is_expanded(&self) -> bool {
        self.augmented.len() > 1
    }
}

/// Trait for expanding queries to improve search recall.
pub trait QueryExpander: Send + Sync {
    /// Augment a query. Deterministic and free of I/O.
    fn augment(&self, query: &str) -> AugmentedQuery;

    /// Whether augmentation applies at all. The orchestrator searches with
    /// the original query only when this is false.
    fn should_augment(&self, query: &str) -> bool;

    /// The augmented list: original first, then added terms.
    fn expand(&self, query: &str) -> Vec<String> {
        self.augment(query).augmented
    }
}

macro_rules! term_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

/// A pattern and the terms it contributes when it matches.
pub struct TermRule {
    /// Compiled pattern; `None` if it failed to compile.
    pub pattern: &'static LazyLock<Option<Regex>>,
    /// Terms appended on a match.
    pub terms: &'static [&'static str],
}

impl TermRule {
    fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// A family of same-language words: any query word starting with one of
/// `stems` pulls in all `terms`.
pub struct SynonymGroup {
    /// Lowercase word prefixes that trigger the group.
    pub stems: &'static [&'static str],
    /// Terms appended when triggered.
    pub terms: &'static [&'static str],
}

// ── German → English ───────────────────────────────────────────────────────
term_pattern!(DE_PRICING, r"(?i)\b(?:preis\w*|kost\w*|gebühr\w*|tarif\w*)");
term_pattern!(DE_HOURS, r"(?i)\b(?:öffnungszeit\w*|geöffnet|offen|sprechzeit\w*|uhrzeit\w*)");
term_pattern!(DE_APPOINTMENTS, r"(?i)\b(?:termin\w*|buchung\w*|buchen|reservier\w*)");
term_pattern!(DE_STAFF, r"(?i)\b(?:mitarbeiter\w*|personal|therapeut\w*|ärzt\w*|arzt)");
term_pattern!(DE_TREATMENTS, r"(?i)\b(?:behandlung\w*|therapie\w*|anwendung\w*)");
term_pattern!(DE_LOCATION, r"(?i)\b(?:adresse|standort\w*|anfahrt|wo)\b");
term_pattern!(DE_PAYMENT, r"(?i)\b(?:zahl\w*|bezahl\w*|kartenzahlung|überweisung|barzahlung)");
term_pattern!(DE_CANCELLATION, r"(?i)\b(?:storn\w*|absag\w*|verschieb\w*)");
term_pattern!(DE_INSURANCE, r"(?i)\b(?:versicherung\w*|krankenkasse\w*|privatpatient\w*|beihilfe)");
term_pattern!(DE_EXPERIENCE, r"(?i)\b(?:erfahrung\w*|qualifikation\w*|ausbildung\w*|zertifi\w*)");
term_pattern!(DE_EQUIPMENT, r"(?i)\b(?:gerät\w*|ausstattung|ausrüstung)");
term_pattern!(DE_SAFETY, r"(?i)\b(?:sicherheit\w*|hygiene\w*|risik\w*|nebenwirkung\w*)");
term_pattern!(
    DE_FIRST_VISIT,
    r"(?i)\b(?:erst(?:er|en|es)?\s+(?:besuch|termin)|erstbesuch\w*|neukunde\w*|erstgespräch\w*)"
);
term_pattern!(DE_DURATION, r"(?i)\b(?:dauer\w*|wie lange|minuten)\b");
term_pattern!(DE_PARKING, r"(?i)\b(?:parkpl\w*|parken|stellpl\w*|parkhaus)");

// ── English → German ───────────────────────────────────────────────────────
term_pattern!(EN_PRICING, r"(?i)\b(?:price\w*|pricing|cost\w*|fees?|how much)\b");
term_pattern!(EN_HOURS, r"(?i)\b(?:opening hours|hours|open|closing)\b");
term_pattern!(EN_APPOINTMENTS, r"(?i)\b(?:appointment\w*|booking\w*|book|schedul\w*|reserv\w*)");
term_pattern!(EN_STAFF, r"(?i)\b(?:staff|employee\w*|therapists?|doctors?|practitioners?)\b");
term_pattern!(EN_TREATMENTS, r"(?i)\b(?:treatment\w*|therapy|therapies|sessions?)\b");
term_pattern!(EN_LOCATION, r"(?i)\b(?:address|location|directions|where)\b");
term_pattern!(EN_PAYMENT, r"(?i)\b(?:pay|payment\w*|paying|card|cash|invoice)\b");
term_pattern!(EN_CANCELLATION, r"(?i)\b(?:cancel\w*|reschedul\w*)");
term_pattern!(EN_INSURANCE, r"(?i)\b(?:insurance|insured|coverage)\b");
term_pattern!(EN_EXPERIENCE, r"(?i)\b(?:experience\w*|qualif\w*|certif\w*|trained|training)");
term_pattern!(EN_EQUIPMENT, r"(?i)\b(?:equipment|devices?|machines?)\b");
term_pattern!(EN_SAFETY, r"(?i)\b(?:safe\w*|hygien\w*|risks?|side effects?)\b");
term_pattern!(
    EN_FIRST_VISIT,
    r"(?i)\b(?:first (?:visit|appointment|time)|new (?:patient|client|customer)s?)\b"
);
term_pattern!(EN_DURATION, r"(?i)\b(?:duration|how long|minutes?)\b");
term_pattern!(EN_PARKING, r"(?i)\b(?:parking|car park)\b");

/// Cross-language domain vocabulary.
pub static TRANSLATIONS: &[TermRule] = &[
    TermRule { pattern: &DE_PRICING, terms: &["price", "cost", "fee", "pricing"] },
    TermRule { pattern: &DE_HOURS, terms: &["opening hours", "hours", "open"] },
    TermRule { pattern: &DE_APPOINTMENTS, terms: &["appointment", "booking", "schedule"] },
    TermRule { pattern: &DE_STAFF, terms: &["staff", "team", "therapist"] },
    TermRule { pattern: &DE_TREATMENTS, terms: &["treatment", "therapy", "session"] },
    TermRule { pattern: &DE_LOCATION, terms: &["address", "location", "directions"] },
    TermRule { pattern: &DE_PAYMENT, terms: &["payment", "card", "cash"] },
    TermRule { pattern: &DE_CANCELLATION, terms: &["cancellation", "cancel", "reschedule"] },
    TermRule { pattern: &DE_INSURANCE, terms: &["insurance", "health insurance"] },
    TermRule { pattern: &DE_EXPERIENCE, terms: &["experience", "qualification", "certification"] },
    TermRule { pattern: &DE_EQUIPMENT, terms: &["equipment", "devices"] },
    TermRule { pattern: &DE_SAFETY, terms: &["safety", "hygiene", "side effects"] },
    TermRule { pattern: &DE_FIRST_VISIT, terms: &["first visit", "new patient"] },
    TermRule { pattern: &DE_DURATION, terms: &["duration", "minutes"] },
    TermRule { pattern: &DE_PARKING, terms: &["parking", "car park"] },
    TermRule { pattern: &EN_PRICING, terms: &["Preis", "Kosten", "Gebühr"] },
    TermRule { pattern: &EN_HOURS, terms: &["Öffnungszeiten", "geöffnet"] },
    TermRule { pattern: &EN_APPOINTMENTS, terms: &["Termin", "Buchung"] },
    TermRule { pattern: &EN_STAFF, terms: &["Mitarbeiter", "Team", "Therapeut"] },
    TermRule { pattern: &EN_TREATMENTS, terms: &["Behandlung", "Therapie", "Anwendung"] },
    TermRule { pattern: &EN_LOCATION, terms: &["Adresse", "Standort", "Anfahrt"] },
    TermRule { pattern: &EN_PAYMENT, terms: &["Zahlung", "bezahlen", "Kartenzahlung"] },
    TermRule { pattern: &EN_CANCELLATION, terms: &["Stornierung", "absagen", "Storno"] },
    TermRule { pattern: &EN_INSURANCE, terms: &["Versicherung", "Krankenkasse"] },
    TermRule { pattern: &EN_EXPERIENCE, terms: &["Erfahrung", "Qualifikation", "Ausbildung"] },
    TermRule { pattern: &EN_EQUIPMENT, terms: &["Ausstattung", "Geräte"] },
    TermRule { pattern: &EN_SAFETY, terms: &["Sicherheit", "Hygiene", "Risiken"] },
    TermRule { pattern: &EN_FIRST_VISIT, terms: &["Erstbesuch", "Neukunde"] },
    TermRule { pattern: &EN_DURATION, terms: &["Dauer", "Minuten"] },
    TermRule { pattern: &EN_PARKING, terms: &["Parkplatz", "parken"] },
];

/// Same-language term families.
pub static SYNONYMS: &[SynonymGroup] = &[
    SynonymGroup {
        stems: &["preis", "kost", "gebühr", "tarif"],
        terms: &["Preis", "Kosten", "Gebühr", "Tarif"],
    },
    SynonymGroup {
        stems: &["termin", "buchung", "reservierung"],
        terms: &["Termin", "Buchung", "Reservierung"],
    },
    SynonymGroup {
        stems: &["behandlung", "therapie", "anwendung", "sitzung"],
        terms: &["Behandlung", "Therapie", "Anwendung", "Sitzung"],
    },
    SynonymGroup {
        stems: &["storn", "absage", "absagen"],
        terms: &["Stornierung", "Storno", "Absage"],
    },
    SynonymGroup {
        stems: &["öffnungszeit", "sprechzeit", "geöffnet"],
        terms: &["Öffnungszeiten", "Sprechzeiten"],
    },
    SynonymGroup {
        stems: &["price", "cost", "fee", "rate"],
        terms: &["price", "cost", "fee", "rate"],
    },
    SynonymGroup {
        stems: &["appointment", "booking", "reservation"],
        terms: &["appointment", "booking", "reservation"],
    },
    SynonymGroup {
        stems: &["treatment", "therapy", "session"],
        terms: &["treatment", "therapy", "session"],
    },
    SynonymGroup {
        stems: &["cancel", "reschedul"],
        terms: &["cancellation", "cancel", "reschedule"],
    },
];

// ── Phrase intents ─────────────────────────────────────────────────────────
term_pattern!(
    INTENT_COST,
    r"(?i)\b(?:wie ?viel\s+(?:kostet|kosten)|was\s+(?:kostet|kosten)|how much|what does\b.{0,40}\bcost)"
);
term_pattern!(
    INTENT_OPEN,
    r"(?i)\b(?:wann\b.{0,30}\b(?:geöffnet|offen|auf)|when\b.{0,30}\bopen)\b"
);
term_pattern!(
    INTENT_CANCEL,
    r"(?i)\b(?:kann ich\b.{0,30}\b(?:absagen|stornieren|verschieben)|can i\b.{0,30}\b(?:cancel|reschedule))"
);
term_pattern!(INTENT_DURATION, r"(?i)\b(?:wie lange|how long)\b");
term_pattern!(INTENT_PARKING, r"(?i)\b(?:wo\b.{0,30}\bpark\w*|where\b.{0,30}\bpark\w*)");

/// Phrase-level intent rules.
pub static INTENTS: &[TermRule] = &[
    TermRule { pattern: &INTENT_COST, terms: &["Preis", "Kosten", "price", "cost", "fee"] },
    TermRule { pattern: &INTENT_OPEN, terms: &["Öffnungszeiten", "opening hours"] },
    TermRule { pattern: &INTENT_CANCEL, terms: &["Stornierung", "cancellation"] },
    TermRule { pattern: &INTENT_DURATION, terms: &["Dauer", "duration"] },
    TermRule { pattern: &INTENT_PARKING, terms: &["Parkplatz", "parking"] },
];

/// Table-driven expander for German and English queries.
pub struct RuleBasedExpander {
    translations: &'static [TermRule],
    synonyms: &'static [SynonymGroup],
    intents: &'static [TermRule],
}

impl RuleBasedExpander {
    /// Create an expander with the built-in tables.
    pub fn new() -> Self {
        Self {
            translations: TRANSLATIONS,
            synonyms: SYNONYMS,
            intents: INTENTS,
        }
    }

    /// Create an expander over custom tables.
    pub fn with_tables(
        translations: &'static [TermRule],
        synonyms: &'static [SynonymGroup],
        intents: &'static [TermRule],
    ) -> Self {
        Self {
            translations,
            synonyms,
            intents,
        }
    }
}

impl Default for RuleBasedExpander {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive dedup that also rejects words of the query itself.
struct TermSet {
    seen: HashSet<String>,
}

impl TermSet {
    fn new(query_words: &[String], original: &str) -> Self {
        let mut seen: HashSet<String> = query_words.iter().cloned().collect();
        seen.insert(original.to_lowercase());
        Self { seen }
    }

    fn admit(&mut self, term: &str) -> bool {
        self.seen.insert(term.to_lowercase())
    }
}

fn words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn collect_rules(rules: &[TermRule], text: &str, set: &mut TermSet, out: &mut Vec<String>) {
    for rule in rules.iter().filter(|r| r.is_match(text)) {
        for term in rule.terms {
            if set.admit(term) {
                out.push((*term).to_string());
            }
        }
    }
}

impl QueryExpander for RuleBasedExpander {
    fn augment(&self, query: &str) -> AugmentedQuery {
        let original = query.trim().to_string();
        let normalized = original.to_lowercase();
        let query_words = words(&original);

        let mut intent_terms = Vec::new();
        collect_rules(
            self.intents,
            &normalized,
            &mut TermSet::new(&query_words, &original),
            &mut intent_terms,
        );

        let mut translations = Vec::new();
        collect_rules(
            self.translations,
            &normalized,
            &mut TermSet::new(&query_words, &original),
            &mut translations,
        );

        let mut synonyms = Vec::new();
        let mut synonym_set = TermSet::new(&query_words, &original);
        for group in self.synonyms {
            let triggered = query_words
                .iter()
                .any(|w| group.stems.iter().any(|stem| w.starts_with(stem)));
            if !triggered {
                continue;
            }
            for term in group.terms {
                if synonym_set.admit(term) {
                    synonyms.push((*term).to_string());
                }
            }
        }

        let mut augmented = Vec::with_capacity(MAX_AUGMENTED_TERMS);
        if !original.is_empty() {
            augmented.push(original.clone());
        }
        let mut merged = TermSet::new(&query_words, &original);
        for term in intent_terms.iter().chain(&translations).chain(&synonyms) {
            if augmented.len() == MAX_AUGMENTED_TERMS {
                break;
            }
            if merged.admit(term) {
                augmented.push(term.clone());
            }
        }

        AugmentedQuery {
            original,
            augmented,
            translations,
            synonyms,
            intent_terms,
        }
    }

    fn should_augment(&self, query: &str) -> bool {
        let normalized = query.trim().to_lowercase();
        !normalized.is_empty() && self.translations.iter().any(|r| r.is_match(&normalized))
    }
}

/// Augment `query` with the built-in tables.
pub fn augment_query(query: &str) -> AugmentedQuery {
    RuleBasedExpander::new().augment(query)
}

/// Whether the built-in translation table matches `query`.
pub fn should_augment(query: &str) -> bool {
    RuleBasedExpander::new().should_augment(query)
}
