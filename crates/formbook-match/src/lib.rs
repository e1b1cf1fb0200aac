//! Pure normalization, candidate generation, and scoring for formbook.
//!
//! Nothing in this crate touches the store; every function is deterministic
//! over its inputs so the resolvers stay unit-testable without any backend.

use formbook_core::NearMiss;
use strsim::jaro_winkler;

pub const CRATE_NAME: &str = "formbook-match";

/// Trailing noise tokens stripped from course names, lowercase, with the
/// separating space included.
const COURSE_TRAILING_TOKENS: &[&str] = &[" racecourse", " park", " races"];

/// Compound-name suffixes stripped from course names, lowercase.
const COURSE_COMPOUND_SUFFIXES: &[&str] = &["-on-dee", "-on-avon"];

/// Known alternate spellings keyed by the upper-cased verbatim course name.
pub const BUILTIN_COURSE_ALIASES: &[(&str, &[&str])] = &[
    ("BANGOR-ON-DEE", &["Bangor"]),
    ("CHELMSFORD CITY", &["Chelmsford"]),
    ("EPSOM DOWNS", &["Epsom"]),
    ("NEWMARKET (JULY)", &["Newmarket"]),
    ("NEWMARKET (ROWLEY MILE)", &["Newmarket"]),
    ("STRATFORD-ON-AVON", &["Stratford"]),
];

/// Similarity floor below which an unresolved runner is reported as having
/// no similar canonical name at all.
pub const CLOSE_SPELLING_FLOOR: f64 = 0.85;

/// Canonical-comparable form of a course name. Idempotent:
/// `normalize_course(normalize_course(x)) == normalize_course(x)`.
pub fn normalize_course(raw: &str) -> String {
    let mut name = squeeze_whitespace(&strip_all_brackets(raw).to_lowercase());
    loop {
        let before = name.clone();
        for token in COURSE_TRAILING_TOKENS {
            if let Some(rest) = name.strip_suffix(token) {
                name = rest.trim_end().to_string();
            }
        }
        for suffix in COURSE_COMPOUND_SUFFIXES {
            if let Some(rest) = name.strip_suffix(suffix) {
                name = rest.trim_end().to_string();
            }
        }
        if name == before {
            break;
        }
    }
    name
}

/// Canonical-comparable form of a horse name: lowercase, one bracketed
/// country-code annotation removed, whitespace collapsed. Idempotent for
/// names carrying at most one annotation, which is all the sources emit.
pub fn normalize_horse_name(raw: &str) -> String {
    squeeze_whitespace(&strip_one_bracket(raw).to_lowercase())
}

/// Parse a scraped race time into minutes since midnight. Accepts "H:MM",
/// "HH:MM", and "H.MM"; anything else is `None`, which the resolvers
/// surface as an unparseable-input miss.
pub fn normalize_time(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let (hours, minutes) = trimmed.split_once([':', '.'])?;
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if minutes.len() != 2 || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let h: u32 = hours.parse().ok()?;
    let m: u32 = minutes.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Every off-time spelling a canonical store might hold for one race time:
/// 24-hour, 12-hour without leading zero, 12-hour with leading zero.
pub fn time_formats(minutes_since_midnight: u32) -> Vec<String> {
    let hours = (minutes_since_midnight / 60) % 24;
    let mins = minutes_since_midnight % 60;
    let half_day = match hours % 12 {
        0 => 12,
        h => h,
    };
    let mut out = Vec::new();
    for formatted in [
        format!("{hours:02}:{mins:02}"),
        format!("{half_day}:{mins:02}"),
        format!("{half_day:02}:{mins:02}"),
    ] {
        push_unique(&mut out, formatted);
    }
    out
}

/// Title-case with word boundaries at any non-alphanumeric character, so
/// "bangor-on-dee" renders as "Bangor-On-Dee".
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Course alias lookup: the built-in table plus any overlay entries loaded
/// at configuration time.
#[derive(Debug, Clone, Default)]
pub struct AliasBook {
    extra: Vec<(String, Vec<String>)>,
}

impl AliasBook {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Overlay entries are keyed like the built-in table: upper-cased
    /// verbatim course name.
    pub fn with_extra(extra: Vec<(String, Vec<String>)>) -> Self {
        Self { extra }
    }

    pub fn aliases_for(&self, verbatim: &str) -> Vec<&str> {
        let key = verbatim.trim().to_uppercase();
        let mut out = Vec::new();
        for (known, aliases) in BUILTIN_COURSE_ALIASES {
            if *known == key {
                out.extend(aliases.iter().copied());
            }
        }
        for (known, aliases) in &self.extra {
            if *known == key {
                out.extend(aliases.iter().map(String::as_str));
            }
        }
        out
    }

    /// Expand one scraped course name into every spelling worth querying:
    /// verbatim, lowercase, title-case, the normalized form in the same
    /// three casings, then alias entries. Insertion order is preserved and
    /// duplicates are dropped by exact value equality.
    pub fn course_variants(&self, raw: &str) -> Vec<String> {
        let mut out = Vec::new();
        push_unique(&mut out, raw.to_string());
        push_unique(&mut out, raw.to_lowercase());
        push_unique(&mut out, title_case(raw));
        let normalized = normalize_course(raw);
        push_unique(&mut out, normalized.clone());
        push_unique(&mut out, normalized.to_lowercase());
        push_unique(&mut out, title_case(&normalized));
        for alias in self.aliases_for(raw) {
            push_unique(&mut out, alias.to_string());
        }
        out
    }
}

/// Variants against the built-in alias table only.
pub fn course_variants(raw: &str) -> Vec<String> {
    AliasBook::builtin().course_variants(raw)
}

/// Which comparison tier matched a horse name, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTier {
    Exact,
    Normalized,
}

/// Two-tier horse-name comparison: case-insensitive equality first, then
/// equality of normalized forms.
pub fn horse_name_tier(scraped: &str, canonical: &str) -> Option<NameTier> {
    if scraped.trim().eq_ignore_ascii_case(canonical.trim()) {
        return Some(NameTier::Exact);
    }
    if normalize_horse_name(scraped) == normalize_horse_name(canonical) {
        return Some(NameTier::Normalized);
    }
    None
}

/// Case-insensitive substring containment in either direction.
pub fn course_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

pub fn any_variant_overlaps(variants: &[String], course: &str) -> bool {
    variants.iter().any(|v| course_overlap(v, course))
}

/// Share of scraped names found among canonical names via the two-tier
/// comparison, over the larger of the two field sizes, as a percentage.
pub fn name_overlap_percent<S, C>(scraped: &[S], canonical: &[C]) -> f64
where
    S: AsRef<str>,
    C: AsRef<str>,
{
    if scraped.is_empty() || canonical.is_empty() {
        return 0.0;
    }
    let matched = scraped
        .iter()
        .filter(|s| {
            canonical
                .iter()
                .any(|c| horse_name_tier(s.as_ref(), c.as_ref()).is_some())
        })
        .count();
    let denominator = scraped.len().max(canonical.len());
    (matched as f64 / denominator as f64) * 100.0
}

/// Categorize why a scraped name missed every canonical name in a race.
/// Diagnostics only: similarity never accepts a match.
pub fn classify_near_miss(scraped: &str, canonical_names: &[String]) -> NearMiss {
    for name in canonical_names {
        if name == scraped {
            return NearMiss::ExactPresent { name: name.clone() };
        }
    }
    for name in canonical_names {
        if name.eq_ignore_ascii_case(scraped) {
            return NearMiss::CaseVariantPresent { name: name.clone() };
        }
    }
    let scraped_norm = normalize_horse_name(scraped);
    let mut best: Option<(f64, &String)> = None;
    for name in canonical_names {
        let score = jaro_winkler(&scraped_norm, &normalize_horse_name(name));
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, name));
        }
    }
    match best {
        Some((score, name)) if score >= CLOSE_SPELLING_FLOOR => NearMiss::CloseSpelling {
            name: name.clone(),
            similarity: score,
        },
        Some((score, _)) => NearMiss::NoSimilarNames {
            best_similarity: score,
        },
        None => NearMiss::NoSimilarNames {
            best_similarity: 0.0,
        },
    }
}

fn strip_all_brackets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn strip_one_bracket(input: &str) -> String {
    if let Some(open) = input.find('(') {
        if let Some(close_rel) = input[open..].find(')') {
            let close = open + close_rel;
            let mut out = String::with_capacity(input.len());
            out.push_str(&input[..open]);
            out.push_str(&input[close + 1..]);
            return out;
        }
    }
    input.to_string()
}

fn squeeze_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}
