//! Re-ranking weight tables.
//!
//! Every lookup is an exhaustive `match` with an explicit default arm so
//! adding an authority level or a category is a compile-visible change.

use hebelki_core::AuthorityLevel;

/// Multiplier applied to a hit's raw score by source trust.
pub fn authority_weight(level: AuthorityLevel) -> f64 {
    match level {
        AuthorityLevel::Canonical => 1.5,
        AuthorityLevel::High => 1.3,
        AuthorityLevel::Normal => 1.0,
        AuthorityLevel::Low => 0.85,
        AuthorityLevel::Unverified => 0.7,
    }
}

/// Canonical form of a category name: trimmed and lowercased.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Multiplier applied to a hit's raw score by content category.
///
/// Factual, frequently asked categories are preferred over generic content.
pub fn category_weight(category: Option<&str>) -> f64 {
    let Some(category) = category else {
        return 1.0;
    };
    match normalize_category(category).as_str() {
        "policy" | "policies" => 1.2,
        "pricing" | "prices" => 1.2,
        "hours" | "opening_hours" => 1.15,
        "faq" => 1.1,
        _ => 1.0,
    }
}

/// Combined re-ranking multiplier.
pub fn weight(level: AuthorityLevel, category: Option<&str>) -> f64 {
    authority_weight(level) * category_weight(category)
}

/// Default relevance floor for a search, by requested category.
pub fn default_min_score(category: Option<&str>) -> f64 {
    let Some(category) = category else {
        return 0.35;
    };
    match normalize_category(category).as_str() {
        "pricing" | "prices" | "hours" | "opening_hours" => 0.5,
        "services" | "policies" | "policy" => 0.4,
        "qualifications" | "other" => 0.35,
        _ => 0.35,
    }
}
