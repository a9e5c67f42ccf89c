use super::*;
use crate::test_support::{test_manager, Article, Profile, Reading};
use docmap_store::{InMemoryAdapter, ScoreBound, StoredValue};

fn set_members(adapter: &InMemoryAdapter, key: &str) -> Vec<String> {
    adapter.smembers(key).unwrap()
}

fn commit_article(manager: &Manager, article: Article) -> DocRef<Article> {
    let doc = DocRef::new(article);
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    doc
}

#[test]
fn persist_and_find_round_trip() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "Rust", "tech", 7));

    let stored = adapter.hgetall("articles:a1").unwrap();
    assert_eq!(stored["title"], "Rust");
    assert_eq!(stored["score"], "7");
    assert_eq!(set_members(&adapter, "idx:articles:category:tech"), vec!["a1"]);
    assert_eq!(adapter.zcard("zidx:articles:score").unwrap(), 1);

    let found = manager.find::<Article>("a1").unwrap().unwrap();
    assert!(found.ptr_eq(&doc));

    manager.clear();
    let reloaded = manager.find::<Article>("a1").unwrap().unwrap();
    assert!(!reloaded.ptr_eq(&doc));
    assert_eq!(*reloaded.read(), *doc.read());
    assert!(manager.find::<Article>("missing").unwrap().is_none());
}

#[test]
fn find_returns_one_instance_per_id() {
    let (_, manager) = test_manager();
    commit_article(&manager, Article::new("a1", "Rust", "tech", 7));
    manager.clear();

    let first = manager.find::<Article>("a1").unwrap().unwrap();
    let second = manager.find::<Article>("a1").unwrap().unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(manager.stats().identity_hits, 1);
    assert_eq!(manager.stats().loads, 1);
}

#[test]
fn find_many_preserves_order_and_skips_missing() {
    let (_, manager) = test_manager();
    for i in 0..3 {
        commit_article(&manager, Article::new(&format!("a{i}"), "t", "c", i));
    }
    manager.clear();
    let cached = manager.find::<Article>("a1").unwrap().unwrap();

    let ids: Vec<String> = ["a2", "nope", "a1", "a0"].iter().map(|s| s.to_string()).collect();
    let docs = manager.find_many::<Article>(&ids).unwrap();
    let got: Vec<_> = docs.iter().map(|d| d.read().id.clone().unwrap()).collect();
    assert_eq!(got, vec!["a2", "a1", "a0"]);
    assert!(docs[1].ptr_eq(&cached));
}

#[test]
fn auto_strategy_generates_ids() {
    let (adapter, manager) = test_manager();
    let doc = DocRef::new(Article::new("", "Untitled", "misc", 0));
    manager.persist(&doc).unwrap();

    let id = doc.read().id.clone().unwrap();
    assert_eq!(id.len(), 32);
    manager.commit().unwrap();
    assert!(adapter.exists(&format!("articles:{id}")).unwrap());
}

#[test]
fn manual_strategy_requires_an_id() {
    let (_, manager) = test_manager();
    let mut profile = Profile::new("p1", "a@x", None);
    profile.id = None;
    let err = manager.persist(&DocRef::new(profile)).unwrap_err();
    assert!(matches!(err, CoreError::MissingIdentity { .. }));
}

#[test]
fn duplicate_identity_in_memory_and_in_store() {
    let (_, manager) = test_manager();
    let first = DocRef::new(Article::new("a1", "one", "c", 1));
    manager.persist(&first).unwrap();

    let twin = DocRef::new(Article::new("a1", "two", "c", 2));
    assert!(matches!(
        manager.persist(&twin).unwrap_err(),
        CoreError::DuplicateIdentity { .. }
    ));

    manager.commit().unwrap();
    manager.clear();
    let stranger = DocRef::new(Article::new("a1", "three", "c", 3));
    assert!(matches!(
        manager.persist(&stranger).unwrap_err(),
        CoreError::DuplicateIdentity { .. }
    ));
}

#[test]
fn caller_ids_without_generator_reject_stored_records() {
    let (adapter, manager) = test_manager();
    manager.persist(&DocRef::new(Reading::new("n1", "a", 1.5))).unwrap();
    manager.commit().unwrap();
    manager.clear();

    let twin = DocRef::new(Reading::new("n1", "b", 2.0));
    assert!(matches!(
        manager.persist(&twin).unwrap_err(),
        CoreError::DuplicateIdentity { .. }
    ));
    assert_eq!(manager.pending_len(), 0);

    let mut anonymous = Reading::new("", "c", 0.0);
    anonymous.id = None;
    assert!(matches!(
        manager.persist(&DocRef::new(anonymous)).unwrap_err(),
        CoreError::MissingIdentity { .. }
    ));

    let loaded = manager.find::<Reading>("n1").unwrap().unwrap();
    loaded.write().tag = "b".into();
    manager.persist(&loaded).unwrap();
    manager.commit().unwrap();
    assert!(set_members(&adapter, "idx:readings:tag:a").is_empty());
    assert_eq!(set_members(&adapter, "idx:readings:tag:b"), vec!["n1"]);
}

#[test]
fn persisting_a_tracked_instance_twice_is_fine() {
    let (_, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "one", "c", 1));
    doc.write().title = "edited".into();
    manager.persist(&doc).unwrap();
    manager.persist(&doc).unwrap();
    assert_eq!(manager.pending_len(), 1);
    assert_eq!(manager.commit().unwrap().upserted, 1);
}

#[test]
fn changing_a_tracked_id_is_rejected() {
    let (_, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "one", "c", 1));

    doc.write().id = Some("a2".into());
    let err = manager.persist(&doc).unwrap_err();
    assert!(matches!(err, CoreError::ImmutableIdentity { .. }));
    assert!(manager.remove(&doc).is_err());
}

#[test]
fn id_change_after_persist_fails_the_commit() {
    let (adapter, manager) = test_manager();
    let doc = DocRef::new(Article::new("a1", "one", "c", 1));
    manager.persist(&doc).unwrap();
    doc.write().id = Some("a9".into());

    let err = manager.commit().unwrap_err();
    assert!(matches!(err, CoreError::ImmutableIdentity { .. }));
    assert!(adapter.is_empty());
    assert_eq!(manager.pending_len(), 1);
    assert_eq!(manager.stats().rejected_commits, 1);
}

#[test]
fn empty_commit_sends_nothing() {
    let (adapter, manager) = test_manager();
    let summary = manager.commit().unwrap();
    assert!(summary.is_empty());
    assert_eq!(adapter.stats().pipelines, 0);
}

#[test]
fn clear_twice_is_harmless() {
    let (_, manager) = test_manager();
    manager.persist(&DocRef::new(Article::new("a1", "t", "c", 1))).unwrap();
    manager.clear();
    manager.clear();
    assert_eq!(manager.pending_len(), 0);
    assert_eq!(manager.identity_map_len(), 0);
    assert!(manager.commit().unwrap().is_empty());
}

#[test]
fn changed_index_value_moves_membership() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "t", "tech", 1));

    doc.write().category = "science".into();
    doc.write().score = 40;
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();

    assert!(set_members(&adapter, "idx:articles:category:tech").is_empty());
    assert_eq!(set_members(&adapter, "idx:articles:category:science"), vec!["a1"]);
    let scored = adapter
        .zrange_by_score("zidx:articles:score", ScoreBound::Unbounded, ScoreBound::Unbounded, None)
        .unwrap();
    assert_eq!(scored, vec!["a1"]);
    let exact = ScoreBound::new(40.0, true);
    assert_eq!(adapter.zcount("zidx:articles:score", exact, exact).unwrap(), 1);
}

#[test]
fn unchanged_fields_skip_index_writes() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "t", "tech", 1));
    adapter.reset_stats();

    doc.write().title = "renamed".into();
    manager.persist(&doc).unwrap();
    let summary = manager.commit().unwrap();

    assert_eq!(summary.commands, 1);
    assert_eq!(adapter.hgetall("articles:a1").unwrap()["title"], "renamed");
}

#[test]
fn force_rebuild_rewrites_every_index() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "t", "tech", 1));
    adapter.del(&["idx:articles:category:tech".to_string()]).unwrap();

    manager.set_force_rebuild(true);
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert_eq!(set_members(&adapter, "idx:articles:category:tech"), vec!["a1"]);

    adapter.del(&["idx:articles:category:tech".to_string()]).unwrap();
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert!(set_members(&adapter, "idx:articles:category:tech").is_empty());
}

#[test]
fn clearing_a_nullable_field_drops_it_from_the_hash() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "t", "tech", 1));
    assert!(adapter.hgetall("articles:a1").unwrap().contains_key("summary"));

    doc.write().summary = None;
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();

    let stored = adapter.hgetall("articles:a1").unwrap();
    assert!(!stored.contains_key("summary"));
    assert_eq!(stored["title"], "t");
}

#[test]
fn null_index_value_leaves_the_index() {
    let (adapter, manager) = test_manager();
    let doc = DocRef::new(Profile::new("p1", "a@x", Some("neo")));
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert_eq!(set_members(&adapter, "app:idx:profiles:nickname:neo"), vec!["p1"]);
    assert!(adapter.ttl("app:idx:profiles:nickname:neo").unwrap().is_some());

    doc.write().nickname = None;
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert!(set_members(&adapter, "app:idx:profiles:nickname:neo").is_empty());
}

#[test]
fn json_documents_round_trip_with_timestamps() {
    let (adapter, manager) = test_manager();
    let doc = DocRef::new(Profile::new("p1", "a@x", Some("neo")));
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();

    let created = doc.read().created_at.unwrap();
    assert!(created > 0);
    assert_eq!(doc.read().updated_at, Some(created));

    let text = adapter.get("app:profiles:p1").unwrap().unwrap();
    assert!(text.contains("\"mail\":\"a@x\""));

    manager.clear();
    let loaded = manager.find::<Profile>("p1").unwrap().unwrap();
    assert_eq!(loaded.read().email, "a@x");
    assert_eq!(loaded.read().created_at, Some(created));
}

#[test]
fn timestamps_can_be_disabled() {
    let adapter = Arc::new(InMemoryAdapter::new());
    let manager = Manager::new(adapter, crate::test_support::test_registry())
        .with_config(ManagerConfig::default().generate_timestamps(false));
    let doc = DocRef::new(Profile::new("p1", "a@x", None));
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert_eq!(doc.read().created_at, None);
}

#[test]
fn record_ttl_sets_expiry() {
    let (adapter, manager) = test_manager();
    let mut profile = Profile::new("p1", "a@x", None);
    profile.expires_in = Some(90);
    manager.persist(&DocRef::new(profile)).unwrap();
    manager.commit().unwrap();

    let ttl = adapter.ttl("app:profiles:p1").unwrap().unwrap();
    assert!(ttl <= 90 && ttl > 80);
}

#[test]
fn non_finite_sorted_values_reject_the_commit() {
    for level in [f64::NAN, f64::INFINITY] {
        let (adapter, manager) = test_manager();
        manager.persist(&DocRef::new(Reading::new("n1", "a", level))).unwrap();
        match manager.commit().unwrap_err() {
            CoreError::InvalidIndexValue { collection, field, .. } => {
                assert_eq!(collection, "readings");
                assert_eq!(field, "level");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(adapter.is_empty());
        assert_eq!(manager.pending_len(), 1);
        assert_eq!(manager.stats().rejected_commits, 1);
    }
}

#[test]
fn unique_violation_leaves_the_store_untouched() {
    let (adapter, manager) = test_manager();
    manager.persist(&DocRef::new(Profile::new("x", "same@x", None))).unwrap();
    manager.commit().unwrap();
    let before = adapter.dump();

    manager.persist(&DocRef::new(Profile::new("y", "same@x", None))).unwrap();
    let err = manager.commit().unwrap_err();
    match err {
        CoreError::UniqueConstraintViolation { field, value, owner, .. } => {
            assert_eq!(field, "mail");
            assert_eq!(value, "same@x");
            assert_eq!(owner, "x");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(adapter.dump(), before);
    assert_eq!(manager.pending_len(), 1);
}

#[test]
fn unique_values_can_swap_hands_in_one_commit() {
    let (adapter, manager) = test_manager();
    let x = DocRef::new(Profile::new("x", "old@x", None));
    manager.persist(&x).unwrap();
    manager.commit().unwrap();

    x.write().email = "new@x".into();
    manager.persist(&x).unwrap();
    manager.persist(&DocRef::new(Profile::new("y", "old@x", None))).unwrap();
    manager.commit().unwrap();

    assert_eq!(adapter.get("app:unq:profiles:mail:old@x").unwrap().as_deref(), Some("y"));
    assert_eq!(adapter.get("app:unq:profiles:mail:new@x").unwrap().as_deref(), Some("x"));
}

#[test]
fn two_new_documents_claiming_one_value_conflict() {
    let (adapter, manager) = test_manager();
    manager.persist(&DocRef::new(Profile::new("x", "dup@x", None))).unwrap();
    manager.persist(&DocRef::new(Profile::new("y", "dup@x", None))).unwrap();
    assert!(matches!(
        manager.commit().unwrap_err(),
        CoreError::UniqueConstraintViolation { .. }
    ));
    assert!(adapter.is_empty());
}

#[test]
fn delete_with_snapshot_cleans_every_structure() {
    let (adapter, manager) = test_manager();
    let profile = DocRef::new(Profile::new("p1", "a@x", Some("neo")));
    manager.persist(&profile).unwrap();
    let article = DocRef::new(Article::new("a1", "t", "tech", 3));
    manager.persist(&article).unwrap();
    manager.commit().unwrap();

    manager.remove(&profile).unwrap();
    manager.remove(&article).unwrap();
    let summary = manager.commit().unwrap();
    assert_eq!(summary.deleted, 2);
    assert!(adapter.is_empty(), "left behind: {:?}", adapter.dump().keys());
    assert!(!manager.is_tracked(&article));
}

#[test]
fn delete_without_snapshot_scans_for_memberships() {
    let (adapter, manager) = test_manager();
    let profile = DocRef::new(Profile::new("p1", "a@x", Some("neo")));
    manager.persist(&profile).unwrap();
    manager.persist(&DocRef::new(Profile::new("p2", "b@x", Some("neo")))).unwrap();
    manager.commit().unwrap();
    manager.clear();

    manager.remove(&DocRef::new(Profile::new("p1", "", None))).unwrap();
    manager.commit().unwrap();

    assert!(!adapter.exists("app:profiles:p1").unwrap());
    assert!(!adapter.exists("app:unq:profiles:mail:a@x").unwrap());
    assert!(adapter.exists("app:unq:profiles:mail:b@x").unwrap());
    assert_eq!(set_members(&adapter, "app:idx:profiles:nickname:neo"), vec!["p2"]);
    assert_eq!(adapter.zcard("app:zidx:profiles:visits").unwrap(), 1);
}

#[test]
fn removing_a_document_without_id_is_a_no_op() {
    let (_, manager) = test_manager();
    manager.remove(&DocRef::new(Article::new("", "t", "c", 1))).unwrap();
    assert_eq!(manager.pending_len(), 0);
}

#[test]
fn repersisting_after_remove_cancels_the_delete() {
    let (adapter, manager) = test_manager();
    let doc = commit_article(&manager, Article::new("a1", "t", "c", 1));
    manager.remove(&doc).unwrap();
    manager.persist(&doc).unwrap();
    manager.commit().unwrap();
    assert!(adapter.exists("articles:a1").unwrap());
}

#[test]
fn release_clean_keeps_pending_documents() {
    let (_, manager) = test_manager();
    commit_article(&manager, Article::new("a1", "t", "c", 1));
    let pending = DocRef::new(Article::new("a2", "t", "c", 2));
    manager.persist(&pending).unwrap();

    manager.release_clean();
    assert_eq!(manager.identity_map_len(), 1);
    assert!(manager.is_tracked(&pending));
}

#[test]
fn index_primitives_write_single_memberships() {
    let (adapter, manager) = test_manager();
    manager
        .add_to_index::<Article>("category", &Value::from("tech"), "a9")
        .unwrap();
    assert_eq!(set_members(&adapter, "idx:articles:category:tech"), vec!["a9"]);
    manager
        .remove_from_index::<Article>("category", &Value::from("tech"), "a9")
        .unwrap();
    assert!(set_members(&adapter, "idx:articles:category:tech").is_empty());

    manager.add_to_sorted_index::<Article>("score", 12.0, "a9").unwrap();
    assert_eq!(adapter.zcard("zidx:articles:score").unwrap(), 1);
    manager.remove_from_sorted_index::<Article>("score", "a9").unwrap();
    assert_eq!(adapter.zcard("zidx:articles:score").unwrap(), 0);

    assert!(matches!(
        manager.add_to_index::<Article>("title", &Value::from("x"), "a9").unwrap_err(),
        CoreError::InvalidQuery { .. }
    ));
    assert!(manager.add_to_sorted_index::<Article>("score", f64::NAN, "a9").is_err());
}

#[test]
fn store_layout_uses_prefixes() {
    let (adapter, manager) = test_manager();
    manager.persist(&DocRef::new(Profile::new("p1", "a@x", Some("neo")))).unwrap();
    manager.commit().unwrap();

    let keys: Vec<String> = adapter.dump().into_keys().collect();
    assert_eq!(
        keys,
        vec![
            "app:idx:profiles:nickname:neo",
            "app:profiles:p1",
            "app:unq:profiles:mail:a@x",
            "app:zidx:profiles:visits",
        ]
    );
    assert!(matches!(adapter.dump()["app:profiles:p1"], StoredValue::String(_)));
}
