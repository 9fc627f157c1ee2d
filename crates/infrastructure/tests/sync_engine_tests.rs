//! End-to-end tests: SQLite stores and the HTTP adapter wired into the engine
//!
//! Tests cover:
//! - Offline mutations draining once connectivity returns
//! - Temporary id replacement across queue and cache
//! - Conflict recording and resolution against a real database
//! - Re-creating an entity deleted remotely under local-wins
//! - Crash recovery and vault state across restarts

use std::{path::Path, sync::Arc};

use application::{ApplicationError, EventNotifier, RetryPolicy, SyncEngine};
use domain::{
    CachePreferences, ConflictStrategy, Connectivity, EntityId, EntityType, KeyDerivationParams,
    ResolutionChoice, SyncOperation, SyncStatus, VaultState,
};
use infrastructure::{
    AppConfig, AsyncDatabase, AsyncDatabaseConfig, HttpRemoteAdapter, RemoteConfig, assemble,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn records() -> EntityType {
    EntityType::new("records").unwrap()
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.retry = RetryPolicy::immediate(3);
    config.vault = KeyDerivationParams {
        memory_kib: 64,
        iterations: 1,
        ..KeyDerivationParams::default()
    };
    config
}

fn remote(server: &MockServer) -> Arc<HttpRemoteAdapter> {
    Arc::new(
        HttpRemoteAdapter::new(&RemoteConfig {
            base_url: format!("{}/api", server.uri()),
            timeout_secs: 5,
            bearer_token: None,
        })
        .unwrap(),
    )
}

async fn memory_engine(server: &MockServer, config: &AppConfig) -> (AsyncDatabase, SyncEngine) {
    let db = AsyncDatabase::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let engine = assemble(&db, config, remote(server), Arc::new(EventNotifier::new()));
    engine.start().await.unwrap();
    (db, engine)
}

async fn file_engine(server: &MockServer, file: &Path) -> (AsyncDatabase, SyncEngine) {
    let db = AsyncDatabase::new(&AsyncDatabaseConfig::file(file))
        .await
        .unwrap();
    db.migrate().await.unwrap();
    let engine = assemble(
        &db,
        &test_config(),
        remote(server),
        Arc::new(EventNotifier::new()),
    );
    (db, engine)
}

fn entity(id: &str, data: serde_json::Value, modified: &str) -> serde_json::Value {
    json!({"id": id, "data": data, "last_modified": modified})
}

#[tokio::test]
async fn offline_create_and_update_sync_when_back_online() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(entity(
            "srv-1",
            json!({"title": "draft"}),
            "2026-03-01T10:00:00Z",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/records/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entity(
            "srv-1",
            json!({"title": "final"}),
            "2026-03-01T10:00:05Z",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, engine) = memory_engine(&server, &test_config()).await;
    let create = engine
        .queue()
        .enqueue_create(records(), json!({"title": "draft"}))
        .await
        .unwrap();
    engine
        .queue()
        .enqueue(
            SyncOperation::Update,
            records(),
            create.entity_id.clone(),
            json!({"title": "final"}),
        )
        .await
        .unwrap();

    // Visible locally before any network round trip
    let optimistic = engine.read(&records(), &create.entity_id).await.unwrap();
    assert_eq!(optimistic.unwrap().data, json!({"title": "final"}));
    assert!(engine.drain().await.unwrap().skipped);

    let report = engine
        .set_connectivity(Connectivity::Wifi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);

    let server_id = EntityId::server("srv-1").unwrap();
    let cached = engine.read(&records(), &server_id).await.unwrap().unwrap();
    assert_eq!(cached.data, json!({"title": "final"}));
    assert!(!cached.is_optimistic());
    assert!(
        engine
            .read(&records(), &create.entity_id)
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(engine.queue().stats().await.unwrap().outstanding(), 0);
    assert!(engine.queue().list(None).await.unwrap().is_empty());
    assert_eq!(engine.queue().clear_synced().await.unwrap(), 0);
}

#[tokio::test]
async fn local_wins_conflict_force_applies_and_can_be_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/records/r1"))
        .and(header_exists("if-unmodified-since"))
        .respond_with(ResponseTemplate::new(409).set_body_json(entity(
            "r1",
            json!({"title": "theirs"}),
            "2026-03-01T11:00:00Z",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/records/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entity(
            "r1",
            json!({"title": "ours"}),
            "2026-03-01T11:00:01Z",
        )))
        .mount(&server)
        .await;

    let (_db, engine) = memory_engine(&server, &test_config()).await;
    assert_eq!(
        engine.conflicts().strategy_for(&records()),
        ConflictStrategy::LocalWins
    );
    let r1 = EntityId::server("r1").unwrap();
    engine
        .queue()
        .enqueue(
            SyncOperation::Update,
            records(),
            r1.clone(),
            json!({"title": "ours"}),
        )
        .await
        .unwrap();

    let report = engine
        .set_connectivity(Connectivity::Wifi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.conflicts, 1);

    let open = engine.conflicts().list_unresolved().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].remote_version, Some(json!({"title": "theirs"})));
    assert_eq!(
        engine.read(&records(), &r1).await.unwrap().unwrap().data,
        json!({"title": "ours"})
    );

    let resolved = engine
        .conflicts()
        .resolve(&open[0].id, ResolutionChoice::Remote)
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert_eq!(engine.conflicts().unresolved_count().await.unwrap(), 0);

    let pending = engine
        .queue()
        .list(Some(SyncStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].force);
    assert_eq!(pending[0].payload, json!({"title": "theirs"}));

    let err = engine
        .conflicts()
        .resolve(&open[0].id, ResolutionChoice::Local)
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidOperation(_)));
}

#[tokio::test]
async fn local_wins_update_of_deleted_entity_recreates_it() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/records/r1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(entity(
            "srv-7",
            json!({"title": "ours"}),
            "2026-03-01T12:00:00Z",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, engine) = memory_engine(&server, &test_config()).await;
    let r1 = EntityId::server("r1").unwrap();
    engine
        .queue()
        .enqueue(
            SyncOperation::Update,
            records(),
            r1.clone(),
            json!({"title": "ours"}),
        )
        .await
        .unwrap();

    let report = engine
        .set_connectivity(Connectivity::Wifi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(engine.queue().stats().await.unwrap().outstanding(), 0);

    let srv7 = EntityId::server("srv-7").unwrap();
    let open = engine.conflicts().list_unresolved().await.unwrap();
    assert_eq!(open.len(), 1);
    assert!(open[0].remote_deleted());
    assert_eq!(open[0].entity_id, srv7);
    assert_eq!(
        engine.read(&records(), &srv7).await.unwrap().unwrap().data,
        json!({"title": "ours"})
    );
    assert!(engine.read(&records(), &r1).await.unwrap().is_none());
}

#[tokio::test]
async fn rejected_create_fails_without_blocking_other_entities() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/records/r9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, engine) = memory_engine(&server, &test_config()).await;
    engine
        .queue()
        .enqueue_create(records(), json!({}))
        .await
        .unwrap();
    engine
        .queue()
        .enqueue(
            SyncOperation::Delete,
            records(),
            EntityId::server("r9").unwrap(),
            json!(null),
        )
        .await
        .unwrap();

    let report = engine
        .set_connectivity(Connectivity::Cellular)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.synced, 1);

    let failed = engine
        .queue()
        .list(Some(SyncStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].last_error.as_deref().unwrap().contains("invalid"));
}

#[tokio::test]
async fn wifi_only_preference_blocks_cellular_sync() {
    let server = MockServer::start().await;
    let (_db, engine) = memory_engine(&server, &test_config()).await;

    engine
        .cache()
        .set_preferences(CachePreferences {
            sync_on_wifi_only: true,
            ..CachePreferences::default()
        })
        .await
        .unwrap();
    engine
        .queue()
        .enqueue_create(records(), json!({"title": "x"}))
        .await
        .unwrap();

    assert!(
        engine
            .set_connectivity(Connectivity::Cellular)
            .await
            .unwrap()
            .is_none()
    );
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(engine.queue().stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn restart_returns_abandoned_items_to_pending() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sync.db");

    let (db, engine) = file_engine(&server, &file).await;
    let item = engine
        .queue()
        .enqueue_create(records(), json!({"title": "x"}))
        .await
        .unwrap();
    sqlx::query("UPDATE sync_queue SET status = 'in_flight' WHERE id = $1")
        .bind(item.id.to_string())
        .execute(db.pool())
        .await
        .unwrap();
    drop(engine);
    db.close().await;

    let (_db, engine) = file_engine(&server, &file).await;
    assert_eq!(engine.start().await.unwrap(), 1);
    let recovered = engine.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, SyncStatus::Pending);
}

#[tokio::test]
async fn encrypted_drafts_need_the_passphrase_after_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sync.db");
    let passphrase = SecretString::from("correct horse");

    let (db, engine) = file_engine(&server, &file).await;
    engine
        .vault()
        .enable(&passphrase, &passphrase)
        .await
        .unwrap();
    let draft = engine
        .vault()
        .save_draft(None, "diary", "dear diary")
        .await
        .unwrap();
    assert!(draft.is_encrypted());

    let (text,): (Option<String>,) = sqlx::query_as("SELECT text FROM drafts WHERE id = $1")
        .bind(draft.id.to_string())
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert!(text.is_none());
    drop(engine);
    db.close().await;

    let (_db, engine) = file_engine(&server, &file).await;
    let vault = engine.vault();
    assert_eq!(vault.state().await.unwrap(), VaultState::Locked);
    assert!(matches!(
        vault.read_draft(&draft.id).await,
        Err(ApplicationError::VaultLocked)
    ));
    assert!(matches!(
        vault.unlock(&SecretString::from("wrong horse")).await,
        Err(ApplicationError::Auth)
    ));

    assert_eq!(
        vault.unlock(&passphrase).await.unwrap(),
        VaultState::Unlocked
    );
    assert_eq!(vault.read_draft(&draft.id).await.unwrap().text, "dear diary");
}
