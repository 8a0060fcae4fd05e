//! storage.rs — Adaptador de persistência: a coleção inteira de eventos
//! gravada como um único blob JSON sob uma chave fixa.

use crate::error::StorageError;
use crate::types::OutageEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

/// Versão atual do envelope persistido.
pub const BLOB_VERSION: u32 = 1;

/// Armazenamento chave-valor de strings opacas (equivalente ao
/// armazenamento local do dispositivo).
///
/// `set` precisa ser atômico: ou o valor novo fica inteiro, ou o antigo
/// permanece intacto.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn set(&self, key: &str, value: &str)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    events: &'a [OutageEvent],
}

#[derive(Deserialize)]
struct Envelope {
    events: Vec<OutageEvent>,
}

/// Leitura/escrita da coleção completa. Não há operação por registro.
pub struct EventStorage<K> {
    kv: K,
    key: String,
}

impl<K: KeyValueStore> EventStorage<K> {
    pub fn new(kv: K, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn kv(&self) -> &K {
        &self.kv
    }

    /// Lê e desserializa a coleção. Sem blob, devolve vazio; blob ilegível
    /// é erro (nunca vira lista vazia silenciosamente).
    pub async fn load_all(&self) -> Result<Vec<OutageEvent>, StorageError> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            debug!("Nenhum blob sob a chave {}; coleção vazia.", self.key);
            return Ok(Vec::new());
        };
        let events = decode_blob(&self.key, &raw)?;
        debug!("{} eventos carregados da chave {}.", events.len(), self.key);
        Ok(events)
    }

    /// Serializa e sobrescreve o blob inteiro.
    pub async fn save_all(&self, events: &[OutageEvent]) -> Result<(), StorageError> {
        let raw = encode_blob(events)?;
        self.kv.set(&self.key, &raw).await?;
        debug!("{} eventos gravados na chave {}.", events.len(), self.key);
        Ok(())
    }

    /// Copia o blob atual (ilegível) para `<chave>.corrupt`, para que uma
    /// gravação posterior não apague a única cópia dos dados do usuário.
    pub async fn quarantine(&self) -> Result<Option<String>, StorageError> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            return Ok(None);
        };
        let backup_key = format!("{}.corrupt", self.key);
        self.kv.set(&backup_key, &raw).await?;
        warn!("Blob ilegível da chave {} copiado para {}.", self.key, backup_key);
        Ok(Some(backup_key))
    }
}

pub fn encode_blob(events: &[OutageEvent]) -> Result<String, StorageError> {
    let envelope = EnvelopeRef {
        version: BLOB_VERSION,
        events,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Aceita o envelope versionado e também o array puro (sem cabeçalho).
pub fn decode_blob(key: &str, raw: &str) -> Result<Vec<OutageEvent>, StorageError> {
    let corrupt = |source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    };
    let value: Value = serde_json::from_str(raw).map_err(corrupt)?;
    match value {
        Value::Array(_) => serde_json::from_value(value).map_err(corrupt),
        Value::Object(ref map) => {
            let version = map.get("version").and_then(Value::as_u64);
            match version {
                Some(v) if v == u64::from(BLOB_VERSION) => {}
                Some(v) => {
                    return Err(StorageError::UnsupportedVersion {
                        key: key.to_string(),
                        version: u32::try_from(v).unwrap_or(u32::MAX),
                    });
                }
                None => {
                    return Err(corrupt(serde::de::Error::custom(
                        "envelope sem versão numérica",
                    )));
                }
            }
            let envelope: Envelope = serde_json::from_value(value).map_err(corrupt)?;
            Ok(envelope.events)
        }
        _ => Err(corrupt(serde::de::Error::custom(
            "esperado um array ou um envelope versionado",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_memory::MemoryKeyValueStore;
    use crate::types::EventId;
    use chrono::{TimeZone, Utc};

    fn event(id: &str, location: &str) -> OutageEvent {
        OutageEvent {
            id: EventId::from(id),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            location: location.to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            estimated_duration: Some("2 horas".to_string()),
            cause: None,
            damages: Some("Geladeira queimada".to_string()),
        }
    }

    #[tokio::test]
    async fn missing_blob_loads_empty() {
        let storage = EventStorage::new(MemoryKeyValueStore::new(), "events");
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let storage = EventStorage::new(MemoryKeyValueStore::new(), "events");
        let events = vec![event("b", "Norte"), event("a", "Centro")];
        storage.save_all(&events).await.unwrap();
        assert_eq!(storage.load_all().await.unwrap(), events);

        storage.save_all(&[]).await.unwrap();
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error() {
        let kv = MemoryKeyValueStore::new();
        kv.insert_raw("events", "{not json");
        let storage = EventStorage::new(kv, "events");
        assert!(matches!(
            storage.load_all().await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn quarantine_copies_raw_blob() {
        let kv = MemoryKeyValueStore::new();
        kv.insert_raw("events", "{not json");
        let storage = EventStorage::new(kv.clone(), "events");
        let backup = storage.quarantine().await.unwrap();
        assert_eq!(backup.as_deref(), Some("events.corrupt"));
        assert_eq!(kv.raw("events.corrupt").as_deref(), Some("{not json"));
    }

    #[test]
    fn decodes_bare_array() {
        let raw = serde_json::to_string(&vec![event("a", "Centro")]).unwrap();
        let events = decode_blob("events", &raw).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location, "Centro");
    }

    #[test]
    fn rejects_unknown_version() {
        let raw = r#"{"version": 7, "events": []}"#;
        assert!(matches!(
            decode_blob("events", raw),
            Err(StorageError::UnsupportedVersion { version: 7, .. })
        ));
    }

    #[test]
    fn rejects_scalar_blob() {
        assert!(matches!(
            decode_blob("events", "42"),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_blob() {
        let kv = MemoryKeyValueStore::new();
        let storage = EventStorage::new(kv.clone(), "events");
        let before = vec![event("a", "Centro")];
        storage.save_all(&before).await.unwrap();

        kv.fail_writes(true);
        assert!(storage.save_all(&[]).await.is_err());
        kv.fail_writes(false);

        assert_eq!(storage.load_all().await.unwrap(), before);
    }
}
