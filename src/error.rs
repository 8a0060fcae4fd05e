use crate::types::EventId;
use thiserror::Error;

/// Erros da camada de persistência (chave-valor + serialização).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("erro de E/S na chave {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("blob corrompido na chave {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("falha ao serializar a coleção: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("versão {version} do blob não suportada na chave {key}")]
    UnsupportedVersion { key: String, version: u32 },
    #[error("armazenamento indisponível: {reason}")]
    Unavailable { reason: String },
}

/// Erros reportados pelo store aos consumidores (telas, CLI).
///
/// Clonável: o resultado de um `initialize` colapsado é entregue a todos
/// os chamadores concorrentes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("dados inválidos: {message}")]
    Validation { message: String },
    #[error("evento não encontrado: {id}")]
    NotFound { id: EventId },
    #[error("erro ao ler eventos salvos: {message}")]
    StorageRead { message: String },
    #[error("erro ao gravar eventos: {message}")]
    StorageWrite { message: String },
    #[error("store não inicializado")]
    NotReady,
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn read(err: StorageError) -> Self {
        Self::StorageRead {
            message: err.to_string(),
        }
    }

    pub fn write(err: StorageError) -> Self {
        Self::StorageWrite {
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
