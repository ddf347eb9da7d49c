//! Fuzzy filename matching.
//!
//! Agents do not always name files exactly as asked ("1-foo.md" for
//! "01-foo.md", "issue-1-extra.md" for "issue-1.md"). Matchers run in tier
//! order and the first tier that accepts a pair wins.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// Same name once the extension is stripped
    ExactStem,
    /// One stem contains the other
    Containment,
    /// Same numeric prefix (by value) and same remainder
    NumericPrefix,
}

pub type Matcher = fn(&str, &str) -> bool;

/// Matchers in the order they are tried.
pub const MATCHERS: [(MatchTier, Matcher); 3] = [
    (MatchTier::ExactStem, exact_stem),
    (MatchTier::Containment, containment),
    (MatchTier::NumericPrefix, numeric_prefix),
];

pub fn fuzzy_match(a: &str, b: &str) -> bool {
    match_tier(a, b).is_some()
}

/// First tier accepting the pair, if any.
pub fn match_tier(a: &str, b: &str) -> Option<MatchTier> {
    MATCHERS
        .iter()
        .find(|(_, matcher)| matcher(a, b))
        .map(|(tier, _)| *tier)
}

/// File name without its extension, lowercased.
pub fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn exact_stem(a: &str, b: &str) -> bool {
    let (a, b) = (stem(a), stem(b));
    !a.is_empty() && a == b
}

pub fn containment(a: &str, b: &str) -> bool {
    let (a, b) = (stem(a), stem(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub fn numeric_prefix(a: &str, b: &str) -> bool {
    let (a, b) = (stem(a), stem(b));
    match (split_numeric_prefix(&a), split_numeric_prefix(&b)) {
        (Some((num_a, rest_a)), Some((num_b, rest_b))) => num_a == num_b && rest_a == rest_b,
        _ => false,
    }
}

/// Leading number (by value) and the remainder after stripping leading
/// digits and dashes. None when the stem has no leading digits.
fn split_numeric_prefix(stem: &str) -> Option<(u64, &str)> {
    let digits_end = stem
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(stem.len());
    if digits_end == 0 {
        return None;
    }
    let number = stem[..digits_end].parse::<u64>().ok()?;
    let rest = stem.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '_');
    Some((number, rest))
}
