//! Integration tests for research description CRUD operations.
//!
//! This test suite validates:
//! - create followed by get returns an equal record
//! - update reflects exactly the patched fields
//! - delete followed by get fails with NotFound
//! - dangling research_id fails with ForeignKeyViolation
//! - the 10 character bound on `type`
//! - listing by research, including order and restartability
//! - atomic batch creation
//! - transaction-scoped create and get
//! - NUL characters rejected before reaching PostgreSQL
//!
//! **IMPORTANT**: These tests require a running PostgreSQL reachable through
//! `DATABASE_URL`. Run them with `cargo test -- --ignored`.

use futures::TryStreamExt;
use resdesc_db::{
    test_fixtures::TestDatabase, Error, ListOrder, NewResearchDescription,
    ResearchDescriptionPatch, ResearchDescriptionRepository, ValidationPolicy, Violation,
};
use serde_json::json;

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_polygon_scenario_first_id_and_listing() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(42).await;
    let repo = &test_db.db.descriptions;

    let created = repo
        .create(NewResearchDescription::polygon(
            42,
            json!({"coordinates": [[0, 0], [1, 1]]}),
        ))
        .await
        .expect("Failed to create polygon description");

    assert_eq!(created.id, 1);
    assert_eq!(created.research_id, 42);
    assert_eq!(created.kind, "polygon");
    assert_eq!(
        created.polygon_data,
        Some(json!({"coordinates": [[0, 0], [1, 1]]}))
    );
    assert_eq!(created.text, None);

    let listed = repo.collect_by_research(42, None).await.unwrap();
    assert_eq!(listed, vec![created]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_then_get_returns_equal_record() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(1).await;
    let repo = &test_db.db.descriptions;

    let inputs = vec![
        NewResearchDescription::text(1, "Survey of the northern shore"),
        NewResearchDescription::polygon(
            1,
            json!({"coordinates": [[0.5, 1.25], [2, 3]], "crs": {"name": "EPSG:4326"}}),
        )
        .with_text("with caption"),
        NewResearchDescription {
            research_id: 1,
            kind: "summary".to_string(),
            polygon_data: Some(json!([{"nested": {"deep": [1, 2, 3]}}])),
            text: None,
        },
    ];

    for input in inputs {
        let created = repo.create(input.clone()).await.unwrap();
        assert_eq!(created.research_id, input.research_id);
        assert_eq!(created.kind, input.kind);
        assert_eq!(created.polygon_data, input.polygon_data);
        assert_eq!(created.text, input.text);

        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_ids_are_assigned_sequentially() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(5).await;
    let repo = &test_db.db.descriptions;

    let first = repo.create(NewResearchDescription::text(5, "a")).await.unwrap();
    let second = repo.create(NewResearchDescription::text(5, "b")).await.unwrap();
    assert!(second.id > first.id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_with_missing_research_fails_with_foreign_key_violation() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.descriptions;

    let result = repo
        .create(NewResearchDescription::text(404, "orphan"))
        .await;
    assert!(
        matches!(result, Err(Error::ForeignKeyViolation { research_id: 404 })),
        "unexpected result: {:?}",
        result
    );
    assert_eq!(repo.count_by_research(404).await.unwrap(), 0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_type_length_bound() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(7).await;
    let repo = &test_db.db.descriptions;

    let mut ten = NewResearchDescription::text(7, "fits");
    ten.kind = "abcdefghij".to_string();
    let created = repo.create(ten).await.expect("10 character type must fit");
    assert_eq!(created.kind, "abcdefghij");

    let mut eleven = NewResearchDescription::text(7, "too long");
    eleven.kind = "abcdefghijk".to_string();
    match repo.create(eleven).await {
        Err(Error::Validation(report)) => {
            assert!(report.contains(&Violation::TypeTooLong { len: 11 }));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }

    assert_eq!(repo.count_by_research(7).await.unwrap(), 1);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_get_missing_id_is_not_found() {
    let test_db = TestDatabase::new().await;

    let result = test_db.db.descriptions.get(12345).await;
    assert!(matches!(result, Err(Error::NotFound(12345))));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_update_reflects_only_patched_fields() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(3).await;
    let repo = &test_db.db.descriptions;

    let created = repo
        .create(
            NewResearchDescription::polygon(3, json!({"coordinates": [[1, 2]]}))
                .with_text("original caption"),
        )
        .await
        .unwrap();

    // Patch text only.
    let updated = repo
        .update(
            created.id,
            ResearchDescriptionPatch::default().text(Some("new caption".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(updated.text.as_deref(), Some("new caption"));
    assert_eq!(updated.polygon_data, created.polygon_data);
    assert_eq!(updated.kind, created.kind);
    assert_eq!(updated.research_id, created.research_id);
    assert_eq!(repo.get(created.id).await.unwrap(), updated);

    // Patch type and clear polygon_data.
    let updated = repo
        .update(
            created.id,
            ResearchDescriptionPatch::default()
                .kind("text")
                .polygon_data(None),
        )
        .await
        .unwrap();
    assert_eq!(updated.kind, "text");
    assert_eq!(updated.polygon_data, None);
    assert_eq!(updated.text.as_deref(), Some("new caption"));

    // Empty patch leaves the row alone.
    let unchanged = repo
        .update(created.id, ResearchDescriptionPatch::default())
        .await
        .unwrap();
    assert_eq!(unchanged, updated);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_update_missing_id_is_not_found() {
    let test_db = TestDatabase::new().await;

    let result = test_db
        .db
        .descriptions
        .update(999, ResearchDescriptionPatch::default().kind("text"))
        .await;
    assert!(matches!(result, Err(Error::NotFound(999))));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_update_with_bad_type_is_rejected_and_row_unchanged() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(8).await;
    let repo = &test_db.db.descriptions;

    let created = repo.create(NewResearchDescription::text(8, "keep")).await.unwrap();

    let result = repo
        .update(
            created.id,
            ResearchDescriptionPatch::default().kind("much-too-long-type"),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let result = repo
        .update(created.id, ResearchDescriptionPatch::default().kind(""))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    assert_eq!(repo.get(created.id).await.unwrap(), created);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_delete_then_get_is_not_found_and_delete_is_idempotent() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(9).await;
    let repo = &test_db.db.descriptions;

    let created = repo.create(NewResearchDescription::text(9, "bye")).await.unwrap();

    assert!(repo.delete(created.id).await.unwrap());
    assert!(matches!(
        repo.get(created.id).await,
        Err(Error::NotFound(id)) if id == created.id
    ));

    // Deleting again is not an error.
    assert!(!repo.delete(created.id).await.unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_list_by_research_filters_orders_and_restarts() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(10).await;
    test_db.insert_research(11).await;
    let repo = &test_db.db.descriptions;

    let a = repo.create(NewResearchDescription::text(10, "a")).await.unwrap();
    repo.create(NewResearchDescription::text(11, "other")).await.unwrap();
    let b = repo
        .create(NewResearchDescription::polygon(10, json!({"coordinates": []})))
        .await
        .unwrap();

    let ascending: Vec<i32> = repo
        .list_by_research(10, Some(ListOrder::IdAscending))
        .map_ok(|r| r.id)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ascending, vec![a.id, b.id]);

    let descending: Vec<i32> = repo
        .list_by_research(10, Some(ListOrder::IdDescending))
        .map_ok(|r| r.id)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(descending, vec![b.id, a.id]);

    // A new listing sees rows written after the previous one finished.
    let c = repo.create(NewResearchDescription::text(10, "c")).await.unwrap();
    let restarted = repo
        .collect_by_research(10, Some(ListOrder::IdAscending))
        .await
        .unwrap();
    assert_eq!(
        restarted.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![a.id, b.id, c.id]
    );

    // Unordered listing returns the same set.
    let mut unordered: Vec<i32> = repo
        .collect_by_research(10, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    unordered.sort_unstable();
    assert_eq!(unordered, vec![a.id, b.id, c.id]);

    assert!(repo.collect_by_research(12, None).await.unwrap().is_empty());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_batch_is_atomic() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(20).await;
    let repo = &test_db.db.descriptions;

    let created = repo
        .create_batch(vec![
            NewResearchDescription::text(20, "overview"),
            NewResearchDescription::polygon(20, json!({"coordinates": [[0, 0]]})),
        ])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(repo.count_by_research(20).await.unwrap(), 2);

    // The second record references a missing research, so nothing is kept.
    let result = repo
        .create_batch(vec![
            NewResearchDescription::polygon(20, json!({"coordinates": [[5, 5]]})),
            NewResearchDescription::text(21, "dangling"),
        ])
        .await;
    assert!(matches!(
        result,
        Err(Error::ForeignKeyViolation { research_id: 21 })
    ));
    assert_eq!(repo.count_by_research(20).await.unwrap(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_batch_rejects_two_text_descriptions() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(30).await;
    let repo = &test_db.db.descriptions;

    let result = repo
        .create_batch(vec![
            NewResearchDescription::text(30, "one"),
            NewResearchDescription::text(30, "two"),
        ])
        .await;
    match result {
        Err(Error::Validation(report)) => {
            assert!(report.contains(&Violation::DuplicateText { research_id: 30 }));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
    assert_eq!(repo.count_by_research(30).await.unwrap(), 0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_strict_policy_checks_polygon_geometry() {
    let test_db = TestDatabase::with_policy(ValidationPolicy::strict()).await;
    test_db.insert_research(40).await;
    let repo = &test_db.db.descriptions;

    let bowtie = NewResearchDescription::polygon(
        40,
        json!({"coordinates": [[0, 0], [1, 1], [1, 0], [0, 1], [0, 0]]}),
    )
    .with_text("crossing");
    assert!(matches!(
        repo.create(bowtie).await,
        Err(Error::Validation(_))
    ));

    let square = NewResearchDescription::polygon(
        40,
        json!({"coordinates": [[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]}),
    )
    .with_text("plot");
    assert!(repo.create(square).await.is_ok());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_tx_is_discarded_on_rollback() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(50).await;
    let repo = &test_db.db.descriptions;

    let mut tx = test_db.pool.begin().await.unwrap();
    let created = repo
        .create_tx(&mut tx, NewResearchDescription::text(50, "draft"))
        .await
        .unwrap();
    let fetched = repo.get_tx(&mut tx, created.id).await.unwrap();
    assert_eq!(fetched, created);
    tx.rollback().await.unwrap();

    assert!(matches!(
        repo.get(created.id).await,
        Err(Error::NotFound(id)) if id == created.id
    ));

    let mut tx = test_db.pool.begin().await.unwrap();
    let kept = repo
        .create_tx(&mut tx, NewResearchDescription::text(50, "final"))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(repo.get(kept.id).await.unwrap(), kept);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_nul_characters_are_validation_errors() {
    let test_db = TestDatabase::new().await;
    test_db.insert_research(60).await;
    let repo = &test_db.db.descriptions;

    match repo.create(NewResearchDescription::text(60, "a\0b")).await {
        Err(Error::Validation(report)) => {
            assert!(report.contains(&Violation::NulCharacter { field: "text" }));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }

    match repo
        .create(NewResearchDescription::polygon(60, json!({"k": "a\u{0}b"})))
        .await
    {
        Err(Error::Validation(report)) => {
            assert!(report.contains(&Violation::NulCharacter {
                field: "polygon_data"
            }));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }

    let created = repo
        .create(NewResearchDescription::text(60, "clean"))
        .await
        .unwrap();
    let result = repo
        .update(
            created.id,
            ResearchDescriptionPatch::default().text(Some("x\0".to_string())),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(repo.get(created.id).await.unwrap(), created);
    assert_eq!(repo.count_by_research(60).await.unwrap(), 1);

    test_db.cleanup().await;
}
