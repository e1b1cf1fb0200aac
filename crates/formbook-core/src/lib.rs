//! Core domain model for formbook: scraped and canonical racing records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "formbook-core";

/// Opaque canonical race key; the only stable join key in the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RaceId(pub i64);

/// Opaque canonical runner key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RunnerId(pub i64);

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One race as harvested from an external source. Immutable once handed to
/// the resolvers; discarded after resolution + upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRace {
    pub course: String,
    pub raw_time: String,
    pub date: NaiveDate,
    pub runners: Vec<ScrapedRunner>,
}

/// One runner row under a scraped race. The auxiliary fields are carried
/// through to the upsert unmodified; only `horse_name` participates in
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRunner {
    pub horse_name: String,
    #[serde(default)]
    pub draw: Option<i32>,
    #[serde(default)]
    pub pace: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
}

/// Authoritative race record in the backing store. `(course, date, off_time)`
/// need not be unique in raw form; `race_id` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRace {
    pub race_id: RaceId,
    pub course: String,
    pub date: NaiveDate,
    pub off_time: String,
}

/// Authoritative runner record. `(race_id, horse_name)` uniqueness is not
/// guaranteed by the store; consumers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRunner {
    pub runner_id: RunnerId,
    pub race_id: RaceId,
    pub horse_name: String,
}

/// Strategy that produced a match, carried on every result for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    Exact,
    NearestTime,
    Normalized,
    ReverseLookup,
    Positional,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::NearestTime => "nearest-time",
            MatchStrategy::Normalized => "normalized",
            MatchStrategy::ReverseLookup => "reverse-lookup",
            MatchStrategy::Positional => "positional",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy for resolution and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    UnparseableInput,
    NoCandidateFound,
    AmbiguousCandidate,
    StoreQueryError,
    UpsertConflictError,
}

/// Why an unresolved runner *almost* matched, for operator triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NearMiss {
    /// A canonical name equals the scraped name verbatim. Should be caught
    /// by the exact tier; surfacing it here flags a resolver bug.
    ExactPresent { name: String },
    /// A canonical name differs only by case.
    CaseVariantPresent { name: String },
    /// A canonical name is a plausible transcription variant.
    CloseSpelling { name: String, similarity: f64 },
    /// Nothing in the race resembles the scraped name.
    NoSimilarNames { best_similarity: f64 },
}

/// Operator-facing detail recorded with every unresolved record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub courses_tried: Vec<String>,
    pub times_tried: Vec<String>,
    pub scraped_name: Option<String>,
    pub canonical_names: Vec<String>,
    pub near_miss: Option<NearMiss>,
    pub query_errors: Vec<String>,
    pub notes: Vec<String>,
}

impl Diagnostics {
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// A confident resolution of one scraped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matched<I> {
    pub id: I,
    pub confidence: f64,
    pub matched_via: MatchStrategy,
}

/// Sole output type of every resolver: a canonical id or a reasoned miss.
/// An unresolved record always carries its reason and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchResult<I> {
    Matched(Matched<I>),
    Unresolved {
        reason: FailureKind,
        diagnostics: Diagnostics,
    },
}

impl<I> MatchResult<I> {
    pub fn matched(id: I, confidence: f64, matched_via: MatchStrategy) -> Self {
        MatchResult::Matched(Matched {
            id,
            confidence,
            matched_via,
        })
    }

    pub fn unresolved(reason: FailureKind, diagnostics: Diagnostics) -> Self {
        MatchResult::Unresolved {
            reason,
            diagnostics,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }

    pub fn as_matched(&self) -> Option<&Matched<I>> {
        match self {
            MatchResult::Matched(m) => Some(m),
            MatchResult::Unresolved { .. } => None,
        }
    }
}

/// Row written back to the store for every matched (race, runner) pair.
/// Conflict key is `(race_id, runner_id)`, so re-running the same scrape is
/// safe. `matched_via` and `confidence` ride along so inferred matches can
/// be audited or reverted downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerResult {
    pub race_id: RaceId,
    pub runner_id: RunnerId,
    pub horse_name: String,
    pub draw: Option<i32>,
    pub pace: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i32>,
    pub matched_via: MatchStrategy,
    pub confidence: f64,
}

impl RunnerResult {
    pub fn from_scraped(
        race_id: RaceId,
        runner_id: RunnerId,
        scraped: &ScrapedRunner,
        matched_via: MatchStrategy,
        confidence: f64,
    ) -> Self {
        Self {
            race_id,
            runner_id,
            horse_name: scraped.horse_name.clone(),
            draw: scraped.draw,
            pace: scraped.pace.clone(),
            comment: scraped.comment.clone(),
            rating: scraped.rating,
            matched_via,
            confidence,
        }
    }
}
