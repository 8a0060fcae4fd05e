//! store.rs — Store de eventos: dono da coleção em memória, ponto único de
//! mutação e hub de notificações.
//!
//! Mutações são serializadas por `writer`: cada uma calcula a nova coleção
//! a partir do resultado da anterior, grava tudo e só então publica o novo
//! snapshot. Enquanto a gravação está pendente, leitores continuam vendo o
//! snapshot anterior.

use crate::bus::{ChangeBus, Snapshot, StoreChange, StoreNotification, Subscription};
use crate::error::{StorageError, StoreError};
use crate::legacy::{self, LegacySource, MigrationReport};
use crate::storage::{EventStorage, KeyValueStore};
use crate::types::{EventId, NewOutageEvent, OutageEvent, OutageEventPatch, normalize_text};
use crate::validation::{validate_draft, validate_event};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell, watch};
use tracing::{debug, error, info, warn};

pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Estados do store: não inicializado, carregando, pronto (permanente).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug, Clone)]
struct View {
    state: LoadState,
    events: Snapshot,
    load_error: Option<StoreError>,
    migration: Option<MigrationReport>,
}

pub struct EventStore<K> {
    storage: EventStorage<K>,
    legacy_sources: Vec<LegacySource>,
    view: watch::Sender<View>,
    writer: Mutex<()>,
    init: OnceCell<()>,
    bus: ChangeBus,
}

impl<K: KeyValueStore> EventStore<K> {
    pub fn new(storage: EventStorage<K>) -> Self {
        let (view, _) = watch::channel(View {
            state: LoadState::Uninitialized,
            events: Arc::from(Vec::new()),
            load_error: None,
            migration: None,
        });
        Self {
            storage,
            legacy_sources: Vec::new(),
            view,
            writer: Mutex::new(()),
            init: OnceCell::new(),
            bus: ChangeBus::new(DEFAULT_NOTIFICATION_CAPACITY),
        }
    }

    /// Chaves legadas a migrar no carregamento.
    pub fn with_legacy_sources(mut self, sources: Vec<LegacySource>) -> Self {
        self.legacy_sources = sources;
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.bus = ChangeBus::new(capacity);
        self
    }

    pub fn state(&self) -> LoadState {
        self.view.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Erro do último carregamento que falhou. Distingue "vazio porque não
    /// há dados" de "vazio porque a leitura falhou".
    pub fn load_error(&self) -> Option<StoreError> {
        self.view.borrow().load_error.clone()
    }

    /// Última migração legada que deixou dados para trás (registros
    /// descartados ou chaves legadas mantidas). `None` se nada ficou pendente.
    pub fn migration_report(&self) -> Option<MigrationReport> {
        self.view.borrow().migration.clone()
    }

    /// Carrega a coleção e marca o store como pronto. Chamadas concorrentes
    /// compartilham uma única leitura; chamadas posteriores não recarregam e
    /// refletem o estado atual: `Err(load_error)` se o último carregamento
    /// falhou, senão o número de eventos em memória.
    pub async fn initialize(&self) -> Result<usize, StoreError> {
        self.init
            .get_or_init(|| async {
                let _guard = self.writer.lock().await;
                self.view.send_modify(|view| view.state = LoadState::Loading);
                info!("[STORE] Carregando eventos da chave {}...", self.storage.key());
                // O resultado fica registrado em `view`.
                let _ = self.reload().await;
            })
            .await;
        let view = self.view.borrow();
        match &view.load_error {
            Some(err) => Err(err.clone()),
            None => Ok(view.events.len()),
        }
    }

    /// Recarrega do armazenamento e substitui a coleção inteira.
    ///
    /// Se a leitura falhar, a coleção em memória passa a ser vazia e o erro
    /// é devolvido e registrado em `load_error`.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        if !self.init.initialized() {
            return self.initialize().await;
        }
        let _guard = self.writer.lock().await;
        debug!("[STORE] Recarregando eventos.");
        self.reload().await
    }

    // Chamado com `writer` travado.
    async fn reload(&self) -> Result<usize, StoreError> {
        let loaded = match legacy::migrate(&self.storage, &self.legacy_sources).await {
            Ok(report) => {
                if report.has_unmigrated() {
                    warn!(
                        "[STORE] Migração deixou dados legados pendentes: {} descartados, chaves mantidas {:?}.",
                        report.skipped, report.retained
                    );
                    self.view.send_modify(|view| view.migration = Some(report));
                }
                self.load_canonical().await
            }
            Err(err) => Err(err),
        };

        match loaded {
            Ok(events) => {
                let count = events.len();
                let snapshot: Snapshot = Arc::from(events);
                self.view.send_modify(|view| {
                    view.state = LoadState::Ready;
                    view.events = snapshot.clone();
                    view.load_error = None;
                });
                info!("[STORE] {} eventos carregados.", count);
                self.bus.publish(StoreNotification {
                    change: StoreChange::Loaded,
                    snapshot,
                });
                Ok(count)
            }
            Err(err) => {
                error!("[STORE] Falha ao carregar eventos: {}", err);
                let snapshot: Snapshot = Arc::from(Vec::new());
                self.view.send_modify(|view| {
                    view.state = LoadState::Ready;
                    view.events = snapshot.clone();
                    view.load_error = Some(err.clone());
                });
                self.bus.publish(StoreNotification {
                    change: StoreChange::Loaded,
                    snapshot,
                });
                Err(err)
            }
        }
    }

    async fn load_canonical(&self) -> Result<Vec<OutageEvent>, StoreError> {
        match self.storage.load_all().await {
            Ok(events) => Ok(events),
            Err(err @ (StorageError::Corrupt { .. } | StorageError::UnsupportedVersion { .. })) => {
                if let Err(backup_err) = self.storage.quarantine().await {
                    warn!("[STORE] Não foi possível preservar o blob ilegível: {}", backup_err);
                }
                Err(StoreError::read(err))
            }
            Err(err) => Err(StoreError::read(err)),
        }
    }

    /// Snapshot atual, em ordem de inserção.
    pub fn list(&self) -> Snapshot {
        self.view.borrow().events.clone()
    }

    pub fn get(&self, id: &EventId) -> Option<OutageEvent> {
        self.view
            .borrow()
            .events
            .iter()
            .find(|event| &event.id == id)
            .cloned()
    }

    /// Inscreve um consumidor; cada mutação confirmada gera uma notificação
    /// com o snapshot completo.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Trava de mutação; falha se o store nunca foi inicializado.
    async fn lock_ready(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        let guard = self.writer.lock().await;
        if self.state() == LoadState::Uninitialized {
            return Err(StoreError::NotReady);
        }
        Ok(guard)
    }

    /// Grava a coleção nova e, só depois de confirmada, publica. Em caso de
    /// falha a coleção em memória fica como estava.
    async fn commit(&self, events: Vec<OutageEvent>, change: StoreChange) -> Result<(), StoreError> {
        if let Err(err) = self.storage.save_all(&events).await {
            error!(
                "[STORE] Falha ao gravar ({:?}); coleção em memória mantida: {}",
                change, err
            );
            return Err(StoreError::write(err));
        }
        let snapshot: Snapshot = Arc::from(events);
        self.view.send_modify(|view| view.events = snapshot.clone());
        debug!("[STORE] {:?} confirmado; {} eventos.", change, snapshot.len());
        self.bus.publish(StoreNotification { change, snapshot });
        Ok(())
    }

    pub async fn add(&self, draft: NewOutageEvent) -> Result<OutageEvent, StoreError> {
        let start_time = validate_draft(&draft)?;
        let _guard = self.lock_ready().await?;

        let current = self.list();
        let mut id = EventId::generate();
        while current.iter().any(|event| event.id == id) {
            id = EventId::generate();
        }

        let event = OutageEvent {
            id,
            created_at: Utc::now(),
            location: draft.location.trim().to_string(),
            start_time,
            end_time: draft.end_time,
            estimated_duration: normalize_text(draft.estimated_duration),
            cause: normalize_text(draft.cause),
            damages: normalize_text(draft.damages),
        };

        let mut events = current.to_vec();
        events.push(event.clone());
        self.commit(events, StoreChange::Added(event.id.clone())).await?;
        info!("[STORE] Evento {} registrado em {}.", event.id, event.location);
        Ok(event)
    }

    /// Mescla o patch no registro existente. `id` e `created_at` são
    /// preservados; o resultado passa pelas mesmas validações de `add`.
    pub async fn update(
        &self,
        id: &EventId,
        patch: OutageEventPatch,
    ) -> Result<OutageEvent, StoreError> {
        let _guard = self.lock_ready().await?;

        let mut events = self.list().to_vec();
        let Some(index) = events.iter().position(|event| &event.id == id) else {
            return Err(StoreError::NotFound { id: id.clone() });
        };

        let mut merged = events[index].clone();
        merged.apply(patch);
        validate_event(&merged)?;

        events[index] = merged.clone();
        self.commit(events, StoreChange::Updated(id.clone())).await?;
        info!("[STORE] Evento {} atualizado.", id);
        Ok(merged)
    }

    /// Remove o evento e devolve o registro removido.
    pub async fn delete(&self, id: &EventId) -> Result<OutageEvent, StoreError> {
        let _guard = self.lock_ready().await?;

        let mut events = self.list().to_vec();
        let Some(index) = events.iter().position(|event| &event.id == id) else {
            return Err(StoreError::NotFound { id: id.clone() });
        };
        let removed = events.remove(index);

        self.commit(events, StoreChange::Deleted(id.clone())).await?;
        info!("[STORE] Evento {} removido.", id);
        Ok(removed)
    }

    /// Remove todos os eventos; devolve quantos havia.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.lock_ready().await?;

        let count = self.list().len();
        self.commit(Vec::new(), StoreChange::Cleared).await?;
        info!("[STORE] {} eventos apagados.", count);
        Ok(count)
    }
}
