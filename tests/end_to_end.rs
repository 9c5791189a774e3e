//! End-to-end scenarios exercising the full detector pipeline against the
//! default configuration (weights 0.45/0.35/0.20, thresholds 0.90/0.82, the
//! deterministic local embedder) and the in-memory + sqlite storage
//! back-ends, against the public crate API rather than its internals.

use std::sync::Arc;

use dedupe_core::{CheckOptions, DecisionKind, Descriptor, Detector, DetectorConfig, LocalEmbedder, MemoryStorage};

fn descriptor(id: i64, title: &str, description: &str, files: &[&str]) -> Descriptor {
    Descriptor {
        id,
        title: title.to_string(),
        description: description.to_string(),
        files: files.iter().map(|s| s.to_string()).collect(),
        diff: Some(String::new()),
    }
}

async fn memory_detector() -> Detector {
    let embedder = Arc::new(LocalEmbedder::new(256));
    let storage = Arc::new(MemoryStorage::new());
    let detector = Detector::new(embedder, Some(storage), DetectorConfig::default()).unwrap();
    detector.init().await.unwrap();
    detector
}

#[tokio::test]
async fn scenario_1_first_ever_descriptor_is_unique() {
    let d = memory_detector().await;
    let result = d
        .check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.kind, DecisionKind::Unique);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(d.get_stats().total_prs, 1);
}

#[tokio::test]
async fn scenario_2_exact_replay_is_duplicate() {
    let d = memory_detector().await;
    d.check(
        &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        CheckOptions::default(),
    )
    .await
    .unwrap();

    let result = d
        .check(
            &descriptor(2, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.kind, DecisionKind::Duplicate);
    assert_eq!(result.original_id, Some(1));
    assert!(result.confidence >= 0.90);
}

#[tokio::test]
async fn scenario_3_paraphrase_is_duplicate_or_possible() {
    let d = memory_detector().await;
    d.check(
        &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        CheckOptions::default(),
    )
    .await
    .unwrap();

    let result = d
        .check(
            &descriptor(
                3,
                "Resolve auth bug with empty password",
                "Validate blank passwords correctly",
                &["auth/login.ts", "auth/validation.ts"],
            ),
            CheckOptions::default(),
        )
        .await
        .unwrap();

    assert!(matches!(result.kind, DecisionKind::Duplicate | DecisionKind::Possible));
    assert_eq!(result.original_id, Some(1));
    assert!(result.confidence >= 0.82);
}

#[tokio::test]
async fn scenario_4_unrelated_descriptor_is_unique_with_no_edge() {
    let d = memory_detector().await;
    d.check(
        &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        CheckOptions::default(),
    )
    .await
    .unwrap();

    let result = d
        .check(
            &descriptor(4, "Add dark mode to dashboard", "CSS variables and toggle", &["ui/theme.css", "components/Navbar.tsx"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.kind, DecisionKind::Unique);
    assert!(result.confidence < 0.82);
    assert_eq!(d.attribution().parent_of(4), None);
}

#[tokio::test]
async fn scenario_5_dry_run_preserves_total_prs() {
    let d = memory_detector().await;
    d.check(
        &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        CheckOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(d.get_stats().total_prs, 1);

    d.check(&descriptor(5, "Test", "x", &["a.ts"]), CheckOptions { dry_run: true })
        .await
        .unwrap();

    assert_eq!(d.get_stats().total_prs, 1);
}

#[tokio::test]
async fn scenario_6_snapshot_restore_replays_the_same_duplicate_decision() {
    let d = memory_detector().await;
    for (id, title, description, files) in [
        (1, "Fix login bug", "Handle empty passwords", vec!["auth/login.ts"]),
        (
            3,
            "Resolve auth bug with empty password",
            "Validate blank passwords correctly",
            vec!["auth/login.ts", "auth/validation.ts"],
        ),
        (4, "Add dark mode to dashboard", "CSS variables and toggle", vec!["ui/theme.css"]),
    ] {
        d.check(&descriptor(id, title, description, &files), CheckOptions::default()).await.unwrap();
    }

    let snapshot = d.export_state();

    let restored_embedder = Arc::new(LocalEmbedder::new(256));
    let restored = Detector::new(restored_embedder, None, DetectorConfig::default()).unwrap();
    restored.import_state(snapshot).unwrap();

    let replay = restored
        .check(
            &descriptor(2, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions { dry_run: true },
        )
        .await
        .unwrap();

    assert_eq!(replay.kind, DecisionKind::Duplicate);
    assert_eq!(replay.original_id, Some(1));
}

#[tokio::test]
async fn check_detailed_exposes_the_full_score_breakdown() {
    let d = memory_detector().await;
    d.check(
        &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        CheckOptions::default(),
    )
    .await
    .unwrap();

    let detailed = d
        .check_detailed(
            &descriptor(2, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();

    let breakdown = detailed.breakdown.expect("a candidate was scored");
    assert!((breakdown.final_score - detailed.result.confidence).abs() < 1e-6);
    assert!(breakdown.text_similarity > 0.0);
}

#[tokio::test]
async fn check_many_mirrors_input_order_including_a_failing_item() {
    let d = memory_detector().await;
    let items = vec![
        descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
        Descriptor {
            id: -1,
            title: String::new(),
            description: String::new(),
            files: vec![],
            diff: None,
        },
        descriptor(3, "Add dark mode", "css toggle", &["ui/theme.css"]),
    ];

    let results = d.check_many(&items, CheckOptions::default()).await.unwrap();
    assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, -1, 3]);
    assert_eq!(results[1].result.kind, DecisionKind::Unique);
    assert_eq!(results[1].result.confidence, 0.0);
}
