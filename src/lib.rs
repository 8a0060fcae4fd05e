//! Registro local de faltas de energia: store de eventos com persistência
//! em blob único, notificações de mudança e visões derivadas.

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod kv_file;
pub mod kv_memory;
pub mod legacy;
pub mod outage;
pub mod storage;
pub mod store;
pub mod types;
pub mod validation;

pub use crate::error::{StorageError, StoreError};
pub use crate::storage::{EventStorage, KeyValueStore};
pub use crate::store::{EventStore, LoadState};
pub use crate::types::{EventId, EventStatus, NewOutageEvent, OutageEvent, OutageEventPatch};
