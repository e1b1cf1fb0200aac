//! End-to-end reconciliation scenarios against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use formbook_core::{
    CanonicalRace, CanonicalRunner, MatchStrategy, RaceId, RunnerId, ScrapedRace, ScrapedRunner,
};
use formbook_resolve::{Reconciler, ResolveConfig};
use formbook_store::MemoryFormStore;

fn date(s: &str) -> chrono::NaiveDate {
    s.parse().expect("date")
}

fn mk_race(id: i64, course: &str, day: &str, off_time: &str) -> CanonicalRace {
    CanonicalRace {
        race_id: RaceId(id),
        course: course.to_string(),
        date: date(day),
        off_time: off_time.to_string(),
    }
}

fn mk_runner(id: i64, race_id: i64, name: &str) -> CanonicalRunner {
    CanonicalRunner {
        runner_id: RunnerId(id),
        race_id: RaceId(race_id),
        horse_name: name.to_string(),
    }
}

fn mk_scraped(course: &str, day: &str, raw_time: &str, names: &[&str]) -> ScrapedRace {
    ScrapedRace {
        course: course.to_string(),
        raw_time: raw_time.to_string(),
        date: date(day),
        runners: names
            .iter()
            .map(|name| ScrapedRunner {
                horse_name: name.to_string(),
                draw: Some(1),
                pace: Some("4.2".to_string()),
                comment: Some("held up".to_string()),
                rating: Some(82),
            })
            .collect(),
    }
}

fn reconciler(store: MemoryFormStore) -> (Reconciler, Arc<MemoryFormStore>) {
    // The reconciler owns its store handle; keep a second handle for
    // asserting on upserted rows.
    let store = Arc::new(store);
    let recon =
        Reconciler::new(Box::new(store.clone()), ResolveConfig::default()).expect("reconciler");
    (recon, store)
}

#[tokio::test]
async fn format_noise_resolves_exactly_and_runner_normalizes() {
    // 24-hour scraped time against a 12-hour stored off-time, a suffixed
    // course name, and a country-coded horse name.
    let (recon, store) = reconciler(MemoryFormStore::new(
        vec![mk_race(1, "Newbury Racecourse", "2025-07-03", "6:05")],
        vec![mk_runner(10, 1, "Copper Knight")],
    ));
    let scraped = vec![mk_scraped(
        "Newbury",
        "2025-07-03",
        "18:05",
        &["Copper Knight (IRE)"],
    )];

    let summary = recon.run(&scraped).await;

    assert_eq!(summary.races_seen, 1);
    assert_eq!(summary.races_matched.get("exact"), Some(&1));
    assert!(summary.races_unresolved.is_empty());
    assert_eq!(summary.runners_matched.get("normalized"), Some(&1));

    let upserts = store.upserted().await;
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].race_id, RaceId(1));
    assert_eq!(upserts[0].runner_id, RunnerId(10));
    assert_eq!(upserts[0].matched_via, MatchStrategy::Normalized);
    assert_eq!(upserts[0].draw, Some(1));
    assert_eq!(upserts[0].rating, Some(82));
}

#[tokio::test]
async fn reverse_lookup_recovers_runner_from_sibling_race() {
    let (recon, store) = reconciler(MemoryFormStore::new(
        vec![
            mk_race(1, "Newbury Racecourse", "2025-07-03", "6:05"),
            mk_race(2, "Newbury Racecourse", "2025-07-03", "7:10"),
        ],
        vec![
            mk_runner(10, 1, "Copper Knight"),
            mk_runner(20, 2, "Red Rum"),
        ],
    ));
    // Red Rum scraped under the 6:05 race but canonically in the 7:10 one.
    let scraped = vec![mk_scraped(
        "Newbury",
        "2025-07-03",
        "18:05",
        &["Copper Knight", "Red Rum"],
    )];

    let summary = recon.run(&scraped).await;

    assert_eq!(summary.runners_matched.get("exact"), Some(&1));
    assert_eq!(summary.runners_matched.get("reverse-lookup"), Some(&1));
    assert!(summary.runners_unresolved.is_empty());

    let upserts = store.upserted().await;
    let reverse = upserts
        .iter()
        .find(|r| r.matched_via == MatchStrategy::ReverseLookup)
        .expect("reverse-lookup row");
    assert_eq!(reverse.runner_id, RunnerId(20));
    assert!(reverse.confidence < 1.0);
}

#[tokio::test]
async fn positional_inference_recovers_misnamed_course() {
    // The Ffos Las card never matches directly; its neighbors resolve to
    // Chepstow at 1:00 and 2:00, and the 1:30 Chepstow race shares 40% of
    // the scraped horse names.
    let (recon, store) = reconciler(MemoryFormStore::new(
        vec![
            mk_race(1, "Chepstow", "2025-07-03", "1:00"),
            mk_race(2, "Chepstow", "2025-07-03", "2:00"),
            mk_race(9, "Chepstow", "2025-07-03", "1:30"),
        ],
        vec![
            mk_runner(11, 1, "Native River"),
            mk_runner(21, 2, "Tiger Roll"),
            mk_runner(90, 9, "Red Rum"),
            mk_runner(91, 9, "Copper Knight"),
            mk_runner(92, 9, "Desert Orchid"),
            mk_runner(93, 9, "Kauto Star"),
            mk_runner(94, 9, "Arkle"),
        ],
    ));
    let scraped = vec![
        mk_scraped("Chepstow", "2025-07-03", "13:00", &["Native River"]),
        mk_scraped(
            "Ffos Las",
            "2025-07-03",
            "13:30",
            &["Red Rum", "Copper Knight (IRE)"],
        ),
        mk_scraped("Chepstow", "2025-07-03", "14:00", &["Tiger Roll"]),
    ];

    let summary = recon.run(&scraped).await;

    assert_eq!(summary.races_matched.get("exact"), Some(&2));
    assert_eq!(summary.races_matched.get("positional"), Some(&1));
    assert!(summary.races_unresolved.is_empty());
    assert_eq!(summary.runners_seen, 4);
    assert_eq!(summary.runners_matched_total(), 4);

    let upserts = store.upserted().await;
    assert_eq!(upserts.len(), 4);
    let inferred_rows: HashSet<_> = upserts
        .iter()
        .filter(|r| r.race_id == RaceId(9))
        .map(|r| r.runner_id)
        .collect();
    assert_eq!(inferred_rows, [RunnerId(90), RunnerId(91)].into_iter().collect());
}

#[tokio::test]
async fn unresolved_race_keeps_full_diagnostics() {
    let (recon, store) = reconciler(MemoryFormStore::new(
        vec![mk_race(1, "Chepstow", "2025-07-03", "1:00")],
        vec![],
    ));
    let scraped = vec![mk_scraped("Ludlow", "2025-07-03", "15:40", &["Red Rum"])];

    let summary = recon.run(&scraped).await;

    assert_eq!(summary.races_matched_total(), 0);
    assert_eq!(summary.races_unresolved.len(), 1);
    let unresolved = &summary.races_unresolved[0];
    assert_eq!(unresolved.course, "Ludlow");
    assert!(unresolved
        .diagnostics
        .courses_tried
        .contains(&"ludlow".to_string()));
    assert_eq!(
        unresolved.diagnostics.times_tried,
        vec!["15:40", "3:40", "03:40"]
    );
    assert!(store.upserted().await.is_empty());

    let digest = summary.digest();
    assert!(digest.contains("races=0/1"));
    assert!(digest.contains("unresolved_races=1"));
}

#[tokio::test]
async fn rerunning_the_same_scrape_does_not_duplicate_rows() {
    let (recon, store) = reconciler(MemoryFormStore::new(
        vec![mk_race(1, "Newbury Racecourse", "2025-07-03", "6:05")],
        vec![mk_runner(10, 1, "Copper Knight")],
    ));
    let scraped = vec![mk_scraped("Newbury", "2025-07-03", "18:05", &["Copper Knight"])];

    recon.run(&scraped).await;
    recon.run(&scraped).await;

    assert_eq!(store.upserted().await.len(), 1);
}

#[tokio::test]
async fn upsert_failures_are_counted_not_fatal() {
    let (recon, _store) = reconciler(
        MemoryFormStore::new(
            vec![mk_race(1, "Newbury Racecourse", "2025-07-03", "6:05")],
            vec![mk_runner(10, 1, "Copper Knight")],
        )
        .failing_upserts(),
    );
    let scraped = vec![mk_scraped("Newbury", "2025-07-03", "18:05", &["Copper Knight"])];

    let summary = recon.run(&scraped).await;

    assert_eq!(summary.runners_matched_total(), 1);
    assert_eq!(summary.upsert_errors, 1);
}
