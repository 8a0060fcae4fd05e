use chrono::{DateTime, TimeZone, Utc};
use registro_apagoes::kv_file::FileKeyValueStore;
use registro_apagoes::kv_memory::MemoryKeyValueStore;
use registro_apagoes::{
    EventId, EventStorage, EventStore, KeyValueStore, NewOutageEvent, OutageEventPatch,
    StorageError, StoreError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

const KEY: &str = "outage-events";

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

/// Cede a vez ao executor antes de cada escrita, abrindo espaço para
/// intercalação entre mutações.
#[derive(Clone, Default)]
struct YieldingKv {
    inner: MemoryKeyValueStore,
}

impl KeyValueStore for YieldingKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.remove(key).await
    }
}

/// Segura cada escrita até o teste liberar.
#[derive(Clone, Default)]
struct GatedKv {
    inner: MemoryKeyValueStore,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl KeyValueStore for GatedKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

async fn file_store(dir: &TempDir) -> EventStore<FileKeyValueStore> {
    let kv = FileKeyValueStore::open(dir.path()).await.unwrap();
    EventStore::new(EventStorage::new(kv, KEY))
}

#[tokio::test]
async fn full_lifecycle_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    assert_eq!(store.initialize().await, Ok(0));
    assert!(store.list().is_empty());

    let created = store
        .add(NewOutageEvent::new("Centro", at(10)))
        .await
        .unwrap();
    assert!(created.end_time.is_none());
    assert!(created.is_active());

    let updated = store
        .update(&created.id, OutageEventPatch::default().end_time(Some(at(12))))
        .await
        .unwrap();
    assert_eq!(updated.end_time, Some(at(12)));
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);

    // Um segundo store sobre o mesmo diretório vê o estado durável.
    let reopened = file_store(&dir).await;
    reopened.initialize().await.unwrap();
    assert_eq!(&*reopened.list(), &[updated.clone()]);

    store.delete(&created.id).await.unwrap();
    assert!(store.list().is_empty());
    let on_disk = EventStorage::new(FileKeyValueStore::open(dir.path()).await.unwrap(), KEY);
    assert!(on_disk.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_location_is_rejected_without_side_effects() {
    let kv = MemoryKeyValueStore::new();
    let store = EventStore::new(EventStorage::new(kv.clone(), KEY));
    store.initialize().await.unwrap();
    let writes = kv.write_count();

    let err = store
        .add(NewOutageEvent::new("", at(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));
    assert!(store.list().is_empty());
    assert_eq!(kv.write_count(), writes);
}

#[tokio::test]
async fn end_before_start_is_rejected() {
    let store = EventStore::new(EventStorage::new(MemoryKeyValueStore::new(), KEY));
    store.initialize().await.unwrap();
    let err = store
        .add(NewOutageEvent::new("Centro", at(10)).end_time(at(9)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));
    assert!(store.list().is_empty());
}

#[tokio::test]
async fn ids_stay_unique() {
    let store = EventStore::new(EventStorage::new(MemoryKeyValueStore::new(), KEY));
    store.initialize().await.unwrap();
    for n in 0..200 {
        store
            .add(NewOutageEvent::new(format!("Bairro {n}"), at(10)))
            .await
            .unwrap();
    }
    let ids: HashSet<EventId> = store.list().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids.len(), 200);
}

#[tokio::test]
async fn back_to_back_adds_do_not_lose_updates() {
    let kv = YieldingKv::default();
    let store = EventStore::new(EventStorage::new(kv.clone(), KEY));
    store.initialize().await.unwrap();

    let (a, b, c) = tokio::join!(
        store.add(NewOutageEvent::new("Centro", at(10))),
        store.add(NewOutageEvent::new("Norte", at(11))),
        store.add(NewOutageEvent::new("Sul", at(12))),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    let listed: Vec<EventId> = store.list().iter().map(|e| e.id.clone()).collect();
    assert_eq!(listed, vec![a.id, b.id, c.id]);
    let on_disk = EventStorage::new(kv, KEY);
    assert_eq!(on_disk.load_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn update_racing_delete_is_serialized() {
    let kv = YieldingKv::default();
    let store = EventStore::new(EventStorage::new(kv.clone(), KEY));
    store.initialize().await.unwrap();
    let event = store
        .add(NewOutageEvent::new("Centro", at(10)))
        .await
        .unwrap();

    let (deleted, updated) = tokio::join!(
        store.delete(&event.id),
        store.update(&event.id, OutageEventPatch::default().end_time(Some(at(11)))),
    );
    assert!(deleted.is_ok());
    assert!(updated.unwrap_err().is_not_found());
    assert!(store.list().is_empty());
    let on_disk = EventStorage::new(kv, KEY);
    assert!(on_disk.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn readers_see_previous_snapshot_while_write_is_pending() {
    let kv = GatedKv::default();
    let store = EventStore::new(EventStorage::new(kv.clone(), KEY));
    store.initialize().await.unwrap();

    let (added, ()) = tokio::join!(store.add(NewOutageEvent::new("Centro", at(10))), async {
        kv.entered.notified().await;
        assert!(store.list().is_empty());
        kv.release.notify_one();
    });
    let added = added.unwrap();
    assert_eq!(store.get(&added.id), Some(added));
}

#[tokio::test]
async fn failed_add_leaves_list_and_disk_unchanged() {
    let kv = MemoryKeyValueStore::new();
    let store = EventStore::new(EventStorage::new(kv.clone(), KEY));
    store.initialize().await.unwrap();
    store
        .add(NewOutageEvent::new("Centro", at(10)))
        .await
        .unwrap();
    let before = store.list();
    let on_disk = kv.raw(KEY);

    kv.fail_writes(true);
    let err = store
        .add(NewOutageEvent::new("Norte", at(11)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StorageWrite { .. }));
    assert_eq!(store.list(), before);
    assert_eq!(kv.raw(KEY), on_disk);
}

#[tokio::test]
async fn round_trip_through_adapter() {
    let dir = TempDir::new().unwrap();
    let kv = FileKeyValueStore::open(dir.path()).await.unwrap();
    let storage = EventStorage::new(kv, KEY);

    let store = EventStore::new(EventStorage::new(MemoryKeyValueStore::new(), KEY));
    store.initialize().await.unwrap();
    store
        .add(
            NewOutageEvent::new("Vila Nova", at(8))
                .end_time(at(9))
                .estimated_duration("1 hora")
                .cause("Vento forte")
                .damages("Portão eletrônico"),
        )
        .await
        .unwrap();
    store
        .add(NewOutageEvent::new("Centro", at(10)))
        .await
        .unwrap();

    let events = store.list().to_vec();
    storage.save_all(&events).await.unwrap();
    assert_eq!(storage.load_all().await.unwrap(), events);

    storage.save_all(&[]).await.unwrap();
    assert!(storage.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn legacy_keys_migrate_on_disk() {
    use registro_apagoes::legacy::{FLAT_KEY, LegacySource, NESTED_KEY};

    let dir = TempDir::new().unwrap();
    let kv = FileKeyValueStore::open(dir.path()).await.unwrap();
    kv.set(
        NESTED_KEY,
        r#"[{"id":"n1","timestampRegistro":"2024-05-01T12:00:00.000Z",
             "localizacao":{"descricao":"Jardim América"},
             "interrupcao":{"inicio":"2024-05-01T09:00:00.000Z","fim":"2024-05-01T11:00:00.000Z"},
             "causa":"Deslizamento"}]"#,
    )
    .await
    .unwrap();

    let store = EventStore::new(EventStorage::new(kv.clone(), KEY))
        .with_legacy_sources(LegacySource::defaults());
    assert_eq!(store.initialize().await, Ok(1));

    let event = &store.list()[0];
    assert_eq!(event.location, "Jardim América");
    assert_eq!(event.cause.as_deref(), Some("Deslizamento"));
    assert!(!event.is_active());

    assert_eq!(kv.get(NESTED_KEY).await.unwrap(), None);
    assert_eq!(kv.get(FLAT_KEY).await.unwrap(), None);
    assert!(kv.get(KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn unmigrated_legacy_records_stay_on_disk() {
    use registro_apagoes::legacy::{LegacySource, NESTED_KEY};

    let dir = TempDir::new().unwrap();
    let kv = FileKeyValueStore::open(dir.path()).await.unwrap();
    let raw = r#"[{"id":"a","timestampRegistro":"2024-05-01T12:00:00Z",
                   "localizacao":{"descricao":"Centro"},
                   "interrupcao":{"inicio":"2024-05-01T09:00:00Z"}},
                  {"id":"b","timestampRegistro":"2024-05-01T12:00:00",
                   "localizacao":{"descricao":"Norte"},
                   "interrupcao":{"inicio":"2024-05-01T09:00:00","fim":"2024-05-01T08:00:00"}}]"#;
    kv.set(NESTED_KEY, raw).await.unwrap();

    let store = EventStore::new(EventStorage::new(kv.clone(), KEY))
        .with_legacy_sources(LegacySource::defaults());
    assert_eq!(store.initialize().await, Ok(1));
    assert_eq!(store.migration_report().map(|r| r.skipped), Some(1));
    assert_eq!(kv.get(NESTED_KEY).await.unwrap().as_deref(), Some(raw));

    // Uma nova abertura continua apontando a chave pendente.
    let reopened = EventStore::new(EventStorage::new(kv.clone(), KEY))
        .with_legacy_sources(LegacySource::defaults());
    assert_eq!(reopened.initialize().await, Ok(1));
    let report = reopened.migration_report().unwrap();
    assert_eq!(report.retained, vec![NESTED_KEY.to_string()]);
}
