use ballot_core::prefs::LAST_FILTER;
use ballot_core::{FilterState, PollId, PrefStore, SortMode, StatusFilter};

#[tokio::test]
async fn load_uses_tmp_fallback_on_corrupted_json() {
    let dir = tempfile::tempdir().unwrap();

    tokio::fs::write(dir.path().join("prefs.json"), b"{ this is not json ")
        .await
        .unwrap();
    let saved = serde_json::json!({ "ballotlife_last_visited": 12 });
    tokio::fs::write(
        dir.path().join("prefs.json.tmp"),
        serde_json::to_vec(&saved).unwrap(),
    )
    .await
    .unwrap();

    let prefs = PrefStore::load_from_dir(dir.path()).await;
    assert_eq!(
        prefs.last_visited().await,
        Some(PollId(12)),
        "should fall back to tmp file when main is corrupted"
    );
}

#[tokio::test]
async fn values_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let filter = FilterState {
        search: "lunch".into(),
        status: StatusFilter::Open,
        sort: SortMode::Alphabetical,
        ..Default::default()
    };

    let prefs = PrefStore::load_from_dir(dir.path()).await;
    prefs.save_filter(&filter).await.unwrap();
    prefs.record_visit(PollId(4)).await.unwrap();

    let reloaded = PrefStore::load_from_dir(dir.path()).await;
    assert_eq!(reloaded.last_filter().await, filter);
    assert_eq!(reloaded.last_visited().await, Some(PollId(4)));
    assert!(!dir.path().join("prefs.json.tmp").exists());
}

#[tokio::test]
async fn unreadable_entries_fall_back_to_defaults() {
    let prefs = PrefStore::in_memory();
    prefs.set(LAST_FILTER, &"not a filter").await.unwrap();

    assert_eq!(prefs.last_filter().await, FilterState::default());
    assert_eq!(prefs.last_visited().await, None);
}

#[tokio::test]
async fn drafts_are_newest_first_without_duplicates() {
    let prefs = PrefStore::in_memory();
    prefs.push_draft("Lunch plans").await.unwrap();
    prefs.push_draft("Book club").await.unwrap();
    prefs.push_draft("Lunch plans").await.unwrap();
    assert_eq!(prefs.drafts().await, vec!["Lunch plans", "Book club"]);

    for i in 0..25 {
        prefs.push_draft(&format!("Draft {i}")).await.unwrap();
    }
    let drafts = prefs.drafts().await;
    assert_eq!(drafts.len(), 20);
    assert_eq!(drafts[0], "Draft 24");

    prefs.discard_draft("Draft 24").await.unwrap();
    assert_eq!(prefs.drafts().await[0], "Draft 23");
}
