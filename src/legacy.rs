//! legacy.rs — Migração única dos dois formatos antigos para a chave canônica.
//!
//! Formato aninhado: `{id, timestampRegistro, localizacao: {descricao},
//! interrupcao: {inicio, fim?, duracaoEstimada?}, prejuizos?, causa?}`.
//! Formato achatado: `{id, location, startDate, endDate?, status, cause?,
//! damages?, createdAt}`.

use crate::error::{StorageError, StoreError};
use crate::storage::{EventStorage, KeyValueStore};
use crate::types::{EventId, EventStatus, OutageEvent, normalize_text};
use crate::validation::validate_event;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{info, warn};

pub const NESTED_KEY: &str = "powerOutageEvents";
pub const FLAT_KEY: &str = "@PowerOutageTracker:events";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedRecord {
    id: String,
    timestamp_registro: DateTime<Utc>,
    localizacao: NestedLocation,
    interrupcao: NestedInterruption,
    #[serde(default)]
    prejuizos: Option<String>,
    #[serde(default)]
    causa: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedLocation {
    descricao: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedInterruption {
    inicio: DateTime<Utc>,
    #[serde(default)]
    fim: Option<DateTime<Utc>>,
    #[serde(default)]
    duracao_estimada: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatRecord {
    id: String,
    location: String,
    start_date: DateTime<Utc>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<EventStatus>,
    #[serde(default)]
    cause: Option<String>,
    #[serde(default)]
    damages: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<NestedRecord> for OutageEvent {
    fn from(record: NestedRecord) -> Self {
        Self {
            id: EventId::from(record.id),
            created_at: record.timestamp_registro,
            location: record.localizacao.descricao.trim().to_string(),
            start_time: record.interrupcao.inicio,
            end_time: record.interrupcao.fim,
            estimated_duration: normalize_text(record.interrupcao.duracao_estimada),
            cause: normalize_text(record.causa),
            damages: normalize_text(record.prejuizos),
        }
    }
}

impl From<FlatRecord> for OutageEvent {
    fn from(record: FlatRecord) -> Self {
        Self {
            id: EventId::from(record.id),
            created_at: record.created_at,
            location: record.location.trim().to_string(),
            start_time: record.start_date,
            end_time: record.end_date,
            estimated_duration: None,
            cause: normalize_text(record.cause),
            damages: normalize_text(record.damages),
        }
    }
}

/// Formato de cada chave legada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyShape {
    Nested,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySource {
    pub key: String,
    pub shape: LegacyShape,
}

impl LegacySource {
    pub fn new(key: impl Into<String>, shape: LegacyShape) -> Self {
        Self {
            key: key.into(),
            shape,
        }
    }

    /// As duas chaves usadas pelas versões antigas do app.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(NESTED_KEY, LegacyShape::Nested),
            Self::new(FLAT_KEY, LegacyShape::Flat),
        ]
    }
}

/// Resultado de uma migração.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub status_drift: usize,
    pub sources: Vec<String>,
    /// Chaves legadas mantidas porque têm registros que não puderam ser
    /// migrados; o blob original continua lá, intacto.
    pub retained: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.sources.is_empty()
    }

    /// Há dados legados que não chegaram à chave canônica.
    pub fn has_unmigrated(&self) -> bool {
        self.skipped > 0 || !self.retained.is_empty()
    }
}

/// Converte um blob legado (array JSON) na forma canônica.
fn decode_legacy(
    source: &LegacySource,
    raw: &str,
    report: &mut MigrationReport,
) -> Result<Vec<OutageEvent>, StorageError> {
    let corrupt = |source_err| StorageError::Corrupt {
        key: source.key.clone(),
        source: source_err,
    };
    // Registro a registro, para que um item ruim não derrube o blob inteiro.
    let items: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(corrupt)?;
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let event = match source.shape {
            LegacyShape::Nested => serde_json::from_value::<NestedRecord>(item).map(OutageEvent::from),
            LegacyShape::Flat => serde_json::from_value::<FlatRecord>(item).map(|record| {
                let derived = if record.end_date.is_some() {
                    EventStatus::Resolved
                } else {
                    EventStatus::Active
                };
                if let Some(stored) = record.status {
                    if stored != derived {
                        warn!(
                            "[MIGRACAO] Evento {} com status '{}' divergente de endDate; usando '{}'.",
                            record.id, stored, derived
                        );
                        report.status_drift += 1;
                    }
                }
                OutageEvent::from(record)
            }),
        };
        match event {
            Ok(event) => match validate_event(&event) {
                Ok(()) => events.push(event),
                Err(err) => {
                    warn!("[MIGRACAO] Evento {} descartado: {}", event.id, err);
                    report.skipped += 1;
                }
            },
            Err(err) => {
                warn!("[MIGRACAO] Registro ilegível em {} descartado: {}", source.key, err);
                report.skipped += 1;
            }
        }
    }
    Ok(events)
}

/// Migra as chaves legadas para a chave canônica, se ela ainda não existir.
///
/// Só remove as chaves legadas depois que a gravação canônica for confirmada,
/// e nunca remove uma chave da qual algum registro foi descartado.
pub async fn migrate<K: KeyValueStore>(
    storage: &EventStorage<K>,
    sources: &[LegacySource],
) -> Result<MigrationReport, StoreError> {
    let mut report = MigrationReport::default();
    if sources.is_empty() {
        return Ok(report);
    }
    let kv = storage.kv();

    if kv.get(storage.key()).await.map_err(StoreError::read)?.is_some() {
        // Chaves legadas que sobreviveram a uma migração anterior guardam
        // registros que não foram migrados.
        for source in sources {
            if kv.get(&source.key).await.map_err(StoreError::read)?.is_some() {
                warn!(
                    "[MIGRACAO] Chave legada {} ainda contém registros não migrados.",
                    source.key
                );
                report.retained.push(source.key.clone());
            }
        }
        return Ok(report);
    }

    let mut seen: HashSet<EventId> = HashSet::new();
    let mut events = Vec::new();
    for source in sources {
        let Some(raw) = kv.get(&source.key).await.map_err(StoreError::read)? else {
            continue;
        };
        let skipped_before = report.skipped;
        let decoded = decode_legacy(source, &raw, &mut report).map_err(StoreError::read)?;
        if report.skipped > skipped_before {
            report.retained.push(source.key.clone());
        }
        for event in decoded {
            if seen.insert(event.id.clone()) {
                events.push(event);
            } else {
                warn!("[MIGRACAO] Id duplicado {} ignorado.", event.id);
                report.duplicates += 1;
            }
        }
        report.sources.push(source.key.clone());
    }

    if report.is_noop() {
        return Ok(report);
    }

    storage.save_all(&events).await.map_err(StoreError::write)?;
    report.migrated = events.len();

    for key in &report.sources {
        if report.retained.contains(key) {
            warn!(
                "[MIGRACAO] Chave legada {} mantida: {} registros não puderam ser migrados.",
                key, report.skipped
            );
            continue;
        }
        if let Err(err) = kv.remove(key).await {
            // A chave canônica já existe; nas próximas cargas a legada aparece em `retained`.
            warn!("[MIGRACAO] Não foi possível remover a chave legada {}: {}", key, err);
        }
    }

    info!(
        "[MIGRACAO] {} eventos migrados de {:?} ({} descartados, {} duplicados).",
        report.migrated, report.sources, report.skipped, report.duplicates
    );
    Ok(report)
}
