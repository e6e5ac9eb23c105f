/// End-to-end pipeline tests over an in-memory SQLite database
///
/// Commit failures are injected with SQL triggers so the coordinator's
/// ordering and cleanup guarantees are exercised against real writes.
use operator_publish::{
    config::ServerConfig,
    context::AppContext,
    db,
    error::PublishError,
    models::{Bonus, Faq, Feature, PaymentMethod, Security},
    operators::NewOperator,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::str::FromStr;
use std::task::Context;

async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid connection string")
        .foreign_keys(true);

    // A single connection keeps the in-memory database alive and shared
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("pool");

    db::run_migrations(&pool).await.expect("migrations");
    pool
}

async fn test_ctx() -> AppContext {
    AppContext::from_pool(ServerConfig::default(), test_pool().await)
}

async fn seed_operator(ctx: &AppContext, id: &str, slug: &str, name: &str, description: &str) {
    ctx.operators
        .create(NewOperator {
            id: Some(id.to_string()),
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            rating_overall: 4.5,
            rating_trust: 4.0,
            rating_payout: 4.8,
            rating_support: 4.2,
            ..NewOperator::default()
        })
        .await
        .expect("seed operator");
}

fn bonus(operator_id: &str, id: &str, title: &str, order: i64) -> Bonus {
    Bonus {
        id: id.to_string(),
        operator_id: operator_id.to_string(),
        title: title.to_string(),
        description: "Bonus description".to_string(),
        bonus_type: Some("welcome".to_string()),
        value: Some("100%".to_string()),
        promo_code: None,
        order_number: order,
    }
}

fn faq(operator_id: &str, id: &str, question: &str, order: i64) -> Faq {
    Faq {
        id: id.to_string(),
        operator_id: operator_id.to_string(),
        question: question.to_string(),
        answer: "Answer".to_string(),
        order_number: order,
    }
}

async fn insert_overview_section(pool: &SqlitePool, operator_id: &str, body_html: &str) {
    sqlx::query(
        "INSERT INTO content_sections (id, operator_id, section_key, title, body_html, order_number)
         VALUES (?1, ?2, 'overview', 'Overview', ?3, 0)",
    )
    .bind(format!("cs-{}", operator_id))
    .bind(operator_id)
    .bind(body_html)
    .execute(pool)
    .await
    .expect("insert section");
}

async fn snapshot_count(pool: &SqlitePool, slug: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM published_operator_content WHERE slug = ?1")
        .bind(slug)
        .fetch_one(pool)
        .await
        .expect("count")
}

fn assert_no_lock_leak(ctx: &AppContext, operator_id: &str) {
    assert!(!ctx.locks.is_locked(operator_id), "lock leaked");
    assert!(
        !ctx.publishing_state.is_publishing(operator_id),
        "publishing state leaked"
    );
    assert!(!ctx.publish_queue.is_in_queue(operator_id), "queue leaked");
}

// Missing required fields fail fast with no side effects
#[tokio::test]
async fn publish_rejects_empty_description() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "").await;

    let result = ctx.coordinator.publish("op-1").await;
    assert!(matches!(result, Err(PublishError::Validation(_))));

    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(!operator.published);
    assert_eq!(operator.publish_status, "draft");
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 0);
    assert_no_lock_leak(&ctx, "op-1");
}

// A full publish flips the record and serves the snapshot
#[tokio::test]
async fn publish_commits_snapshot_then_record() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "The best case site.").await;

    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "Welcome bonus", 0)])
        .await
        .unwrap();
    ctx.extensions
        .save_payment_methods(
            "op-1",
            vec![PaymentMethod {
                id: "pm-1".to_string(),
                operator_id: "op-1".to_string(),
                method_name: "Visa".to_string(),
                min_amount: Some(10.0),
                max_amount: Some(5000.0),
                fee_percentage: Some(1.5),
                fee_fixed: None,
                fee_level: None,
                processing_time: Some("Instant".to_string()),
            }],
        )
        .await
        .unwrap();
    ctx.extensions
        .save_features(
            "op-1",
            vec![Feature {
                id: "f-1".to_string(),
                operator_id: "op-1".to_string(),
                label: "Instant withdrawals".to_string(),
                available: true,
                highlighted: true,
            }],
        )
        .await
        .unwrap();
    ctx.extensions
        .save_security(
            "op-1",
            Security {
                id: "sec-1".to_string(),
                operator_id: "op-1".to_string(),
                ssl_enabled: true,
                ssl_provider: Some("Cloudflare".to_string()),
                license_number: Some("L-123".to_string()),
                license_authority: None,
                compliance_certifications: r#"["eCOGRA"]"#.to_string(),
                provably_fair: true,
                provably_fair_description: None,
                complaints_platform: None,
                audit_info: None,
            },
        )
        .await
        .unwrap();
    ctx.extensions
        .save_faqs("op-1", vec![faq("op-1", "faq-1", "Is it legit?", 0)])
        .await
        .unwrap();
    insert_overview_section(&ctx.content_db, "op-1", "<p>An in-depth Acme review.</p>").await;

    let snapshot = ctx.publish_operator("op-1").await.expect("publish succeeds");

    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(operator.published);
    assert_eq!(operator.publish_status, "published");
    assert!(operator.published_at.is_some());
    assert_no_lock_leak(&ctx, "op-1");

    // The reader serves the snapshot's content verbatim
    let served = ctx.reader.get_by_slug("acme").await.expect("snapshot hit");
    let expected = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(served, expected);

    // Denormalized shape: fee level defaulted, extension data embedded
    assert_eq!(served["payments"][0]["feeLevel"], "Medium");
    assert_eq!(served["bonuses"][0]["title"], "Welcome bonus");
    assert_eq!(served["security"]["complianceCertifications"][0], "eCOGRA");
    assert_eq!(served["operator"]["name"], "Acme Cases");

    // Derived SEO document stored alongside
    let seo_text: String =
        sqlx::query_scalar("SELECT seo_data FROM published_operator_content WHERE slug = 'acme'")
            .fetch_one(&ctx.content_db)
            .await
            .unwrap();
    let seo: serde_json::Value = serde_json::from_str(&seo_text).unwrap();
    assert_eq!(seo["description"], "An in-depth Acme review.");
    assert_eq!(seo["structuredData"]["@type"], "Review");
}

// A second publish while one is in flight is rejected
#[tokio::test]
async fn concurrent_publish_is_rejected() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let started = std::sync::Arc::new(tokio::sync::Notify::new());

    let holder = {
        let queue = std::sync::Arc::clone(&ctx.publish_queue);
        let started = std::sync::Arc::clone(&started);
        tokio::spawn(async move {
            queue
                .run("op-1", "publish", move || async move {
                    started.notify_one();
                    release_rx.await.ok();
                    Ok::<_, PublishError>(())
                })
                .await
        })
    };

    started.notified().await;
    assert!(ctx.publish_queue.is_in_queue("op-1"));

    // Rejected without touching the operator
    let rejected = ctx.publish_operator("op-1").await;
    assert!(rejected.is_none());
    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(!operator.published);

    release_tx.send(()).ok();
    holder.await.unwrap();
    assert_no_lock_leak(&ctx, "op-1");
}

// Snapshot commit failure leaves the record untouched and retryable
#[tokio::test]
async fn snapshot_commit_failure_keeps_record_draft() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    sqlx::query(
        "CREATE TRIGGER fail_snapshot BEFORE INSERT ON published_operator_content
         BEGIN SELECT RAISE(ABORT, 'injected snapshot failure'); END",
    )
    .execute(&ctx.content_db)
    .await
    .unwrap();

    let result = ctx.coordinator.publish("op-1").await;
    assert!(matches!(result, Err(PublishError::Commit(_))));

    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(!operator.published, "published must not flip without a snapshot");
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 0);
    assert_no_lock_leak(&ctx, "op-1");

    // A later attempt on the same slug succeeds and is consistent
    sqlx::query("DROP TRIGGER fail_snapshot")
        .execute(&ctx.content_db)
        .await
        .unwrap();

    ctx.coordinator.publish("op-1").await.expect("retry succeeds");
    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(operator.published);
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 1);
}

// Record commit failure removes the orphaned snapshot
#[tokio::test]
async fn record_commit_failure_compensates_snapshot() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    sqlx::query(
        "CREATE TRIGGER fail_record BEFORE UPDATE OF published ON operators
         WHEN NEW.published = 1
         BEGIN SELECT RAISE(ABORT, 'injected record failure'); END",
    )
    .execute(&ctx.content_db)
    .await
    .unwrap();

    let result = ctx.coordinator.publish("op-1").await;
    assert!(matches!(result, Err(PublishError::Commit(_))));

    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(!operator.published);
    // The draft operator must not leave a publicly servable snapshot behind
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 0);
    assert!(ctx.reader.get_by_slug("acme").await.is_none());
    assert_no_lock_leak(&ctx, "op-1");

    sqlx::query("DROP TRIGGER fail_record")
        .execute(&ctx.content_db)
        .await
        .unwrap();

    ctx.coordinator.publish("op-1").await.expect("retry succeeds");
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 1);
}

// Cancelling a publish mid-flight, as the queue timeout does by dropping
// the future, must still release the lock and publishing state
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_publish_releases_lock_and_state() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    let waker = futures::task::noop_waker();
    let mut poll_cx = Context::from_waker(&waker);
    let mut publish = Box::pin(ctx.coordinator.publish("op-1"));

    // Drive the future just past the point where it takes the lock, then
    // drop it the way the timeout race does
    let mut reached_lock = false;
    for _ in 0..10_000 {
        if ctx.locks.is_locked("op-1") {
            reached_lock = true;
            break;
        }
        if publish.as_mut().poll(&mut poll_cx).is_ready() {
            panic!("publish completed before the lock was observed");
        }
        std::thread::sleep(std::time::Duration::from_micros(100));
    }
    assert!(reached_lock, "publish never entered the locked section");
    drop(publish);

    assert!(!ctx.locks.is_locked("op-1"), "lock leaked after cancellation");
    assert!(!ctx.publishing_state.is_publishing("op-1"));

    // Extension saves must not be parked, and the operator stays publishable
    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "After cancel", 0)])
        .await
        .unwrap();
    assert_eq!(ctx.extensions.fetch_bonuses("op-1").await.unwrap().len(), 1);
    assert!(ctx.publish_operator("op-1").await.is_some());
}

// The retry budget is enforced across queue-wrapped attempts
#[tokio::test]
async fn retry_budget_blocks_fourth_attempt() {
    let ctx = test_ctx().await;
    // Operator with an empty description fails validation every time
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "").await;

    for _ in 0..3 {
        assert!(ctx.publish_operator("op-1").await.is_none());
    }
    assert_eq!(ctx.publish_queue.attempts("op-1"), 3);
    assert!(!ctx.publish_queue.can_retry("op-1"));

    // Fourth attempt is rejected outright
    assert!(ctx.publish_operator("op-1").await.is_none());
    assert_eq!(ctx.publish_queue.attempts("op-1"), 3);

    // Fixing the draft and clearing the error permits publishing again
    ctx.operators
        .auto_save("op-1", serde_json::json!({ "description": "Now valid" }))
        .await
        .unwrap();
    ctx.publish_queue.clear_error("op-1");

    let published = ctx.publish_operator("op-1").await;
    assert!(published.is_some());
    assert_eq!(ctx.publish_queue.attempts("op-1"), 0);
}

// FAQ saves diff against stable IDs instead of clearing the list
#[tokio::test]
async fn faq_save_diffs_by_id() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    ctx.extensions
        .save_faqs(
            "op-1",
            vec![
                faq("op-1", "faq-1", "Original question 1", 0),
                faq("op-1", "faq-2", "Original question 2", 1),
            ],
        )
        .await
        .unwrap();

    ctx.extensions
        .save_faqs(
            "op-1",
            vec![
                faq("op-1", "faq-1", "Updated question 1", 0),
                faq("op-1", "faq-3", "New question 3", 1),
            ],
        )
        .await
        .unwrap();

    let faqs = ctx.extensions.fetch_faqs("op-1").await.unwrap();
    let ids: Vec<&str> = faqs.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["faq-1", "faq-3"]);
    assert_eq!(faqs[0].question, "Updated question 1");
    assert_eq!(faqs[1].question, "New question 3");
}

// Auto-save never writes publishing-control fields
#[tokio::test]
async fn auto_save_strips_publish_fields() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    ctx.operators
        .auto_save(
            "op-1",
            serde_json::json!({
                "name": "Acme Cases Updated",
                "published": true,
                "publishStatus": "published",
                "publishedAt": "2026-01-01T00:00:00Z",
            }),
        )
        .await
        .unwrap();

    let operator = ctx.operators.get("op-1").await.unwrap().unwrap();
    assert!(!operator.published, "auto-save must not flip published");
    assert_eq!(operator.publish_status, "draft");
    assert!(operator.published_at.is_none());
    assert_eq!(operator.name, "Acme Cases Updated");
    assert!(operator.last_auto_saved_at.is_some());

    let draft: serde_json::Value =
        serde_json::from_str(operator.draft_data.as_deref().unwrap()).unwrap();
    assert!(draft.get("published").is_none());
    assert!(draft.get("publishStatus").is_none());
}

// A missing snapshot degrades to the live-assembly fallback
#[tokio::test]
async fn reader_falls_back_to_live_assembly() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;
    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "Welcome bonus", 0)])
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO seo_metadata (id, operator_id, meta_title, meta_description, canonical_url)
         VALUES ('seo-1', 'op-1', 'Custom title', NULL, NULL)",
    )
    .execute(&ctx.content_db)
    .await
    .unwrap();

    // Legacy record: published without a generated snapshot
    ctx.operators.mark_published("op-1").await.unwrap();

    assert!(ctx.reader.get_by_slug("acme").await.is_none());

    let view = ctx.reader.get_view("acme").await.expect("fallback view");
    assert_eq!(view["operator"]["name"], "Acme Cases");
    assert_eq!(view["bonuses"][0]["title"], "Welcome bonus");
    // SEO overrides surface through the fallback like the generator output
    assert_eq!(view["seoMetadata"]["meta_title"], "Custom title");

    // Unpublished operators are invisible to the fallback
    seed_operator(&ctx, "op-2", "draft-site", "Draft Site", "Description").await;
    assert!(ctx.reader.get_view("draft-site").await.is_none());
}

// Extension saves observe the publish lock instead of writing through
#[tokio::test]
async fn extension_saves_defer_while_locked() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    ctx.locks.lock("op-1");
    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "Deferred bonus", 0)])
        .await
        .unwrap();

    assert!(ctx.extensions.fetch_bonuses("op-1").await.unwrap().is_empty());
    assert_eq!(ctx.extensions.deferred().pending_count(), 1);

    ctx.locks.unlock("op-1");
    let report = ctx.extensions.flush_deferred().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert!(report.is_success());

    let bonuses = ctx.extensions.fetch_bonuses("op-1").await.unwrap();
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].title, "Deferred bonus");
}

// Saves deferred by the publish lock are written out once a publish
// settles, not parked until an unrelated editing-surface toggle
#[tokio::test]
async fn lock_deferred_saves_flush_after_publish() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    ctx.locks.lock("op-1");
    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "Mid-publish bonus", 0)])
        .await
        .unwrap();
    assert_eq!(ctx.extensions.deferred().pending_count(), 1);
    ctx.locks.unlock("op-1");

    ctx.publish_operator("op-1").await.expect("publish succeeds");

    assert_eq!(ctx.extensions.deferred().pending_count(), 0);
    let bonuses = ctx.extensions.fetch_bonuses("op-1").await.unwrap();
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].title, "Mid-publish bonus");
}

// The editing surface buffers saves until it deactivates
#[tokio::test]
async fn editing_surface_buffers_until_deactivated() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;

    ctx.extensions.set_editing_active(true).await.unwrap();
    ctx.extensions
        .save_features(
            "op-1",
            vec![Feature {
                id: "f-1".to_string(),
                operator_id: "op-1".to_string(),
                label: "Live chat".to_string(),
                available: true,
                highlighted: false,
            }],
        )
        .await
        .unwrap();
    assert!(ctx.extensions.fetch_features("op-1").await.unwrap().is_empty());

    let report = ctx.extensions.set_editing_active(false).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert!(report.is_success());
    assert_eq!(ctx.extensions.fetch_features("op-1").await.unwrap().len(), 1);
}

// Temporary operators are handled by the local-only draft path
#[tokio::test]
async fn temp_operator_saves_are_noops() {
    let ctx = test_ctx().await;

    ctx.extensions
        .save_faqs("temp-123", vec![faq("temp-123", "faq-1", "Q", 0)])
        .await
        .unwrap();

    assert!(ctx.extensions.fetch_faqs("temp-123").await.unwrap().is_empty());
    assert_eq!(ctx.extensions.deferred().pending_count(), 0);
}

// An exhausted retry budget can be reset over HTTP
#[tokio::test]
async fn clear_publish_error_endpoint_restores_retry_budget() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "").await;

    for _ in 0..3 {
        assert!(ctx.publish_operator("op-1").await.is_none());
    }
    assert!(!ctx.publish_queue.can_retry("op-1"));

    let app = operator_publish::server::build_router(ctx.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/operators/op-1/publish-error")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(ctx.publish_queue.can_retry("op-1"));
    assert_eq!(ctx.publish_queue.attempts("op-1"), 0);

    ctx.operators
        .auto_save("op-1", serde_json::json!({ "description": "Now valid" }))
        .await
        .unwrap();
    assert!(ctx.publish_operator("op-1").await.is_some());
}

// Duplication deep-copies extensions and always resets publish fields
#[tokio::test]
async fn duplicate_resets_publish_state() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;
    ctx.extensions
        .save_bonuses("op-1", vec![bonus("op-1", "b-1", "Welcome bonus", 0)])
        .await
        .unwrap();
    ctx.publish_operator("op-1").await.expect("publish");

    let new_id = ctx.operators.duplicate("op-1").await.unwrap();
    let copy = ctx.operators.get(&new_id).await.unwrap().unwrap();

    assert!(!copy.published);
    assert_eq!(copy.publish_status, "draft");
    assert!(copy.published_at.is_none());
    assert_ne!(copy.slug, "acme");
    assert!(copy.name.contains("Copy"));

    let copied_bonuses = ctx.extensions.fetch_bonuses(&new_id).await.unwrap();
    assert_eq!(copied_bonuses.len(), 1);
    assert_ne!(copied_bonuses[0].id, "b-1");
}

// Deleting an operator cascades to extensions and removes the snapshot
#[tokio::test]
async fn delete_cascades_and_removes_snapshot() {
    let ctx = test_ctx().await;
    seed_operator(&ctx, "op-1", "acme", "Acme Cases", "Description").await;
    ctx.extensions
        .save_faqs("op-1", vec![faq("op-1", "faq-1", "Q", 0)])
        .await
        .unwrap();
    ctx.publish_operator("op-1").await.expect("publish");

    ctx.operators.delete("op-1").await.unwrap();

    assert!(ctx.operators.get("op-1").await.unwrap().is_none());
    let faq_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM operator_faqs WHERE operator_id = 'op-1'")
            .fetch_one(&ctx.content_db)
            .await
            .unwrap();
    assert_eq!(faq_count, 0);
    assert_eq!(snapshot_count(&ctx.content_db, "acme").await, 0);
    assert!(ctx.reader.get_by_slug("acme").await.is_none());
}
