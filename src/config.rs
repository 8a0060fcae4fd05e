use crate::legacy::{FLAT_KEY, LegacyShape, LegacySource, NESTED_KEY};
use crate::store::DEFAULT_NOTIFICATION_CAPACITY;
use ::config as config_crate;
use serde::Deserialize;
use std::path::PathBuf;

/// Chave canônica da coleção.
pub const DEFAULT_STORAGE_KEY: &str = "outage-events";

/// Configuração do registro de faltas de energia.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Diretório onde ficam os blobs persistidos.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Chave sob a qual a coleção inteira é gravada.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Chave do formato antigo aninhado (migrada e removida no carregamento).
    #[serde(default = "default_nested_key")]
    pub legacy_nested_key: String,
    /// Chave do formato antigo achatado.
    #[serde(default = "default_flat_key")]
    pub legacy_flat_key: String,
    /// Capacidade do canal de notificações por assinante.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("dados")
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_nested_key() -> String {
    NESTED_KEY.to_string()
}

fn default_flat_key() -> String {
    FLAT_KEY.to_string()
}

fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_key: default_storage_key(),
            legacy_nested_key: default_nested_key(),
            legacy_flat_key: default_flat_key(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl Config {
    /// Lê o arquivo `config` (opcional) e as variáveis `APAGOES_*`.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config_crate::Config::builder()
            .add_source(config_crate::File::with_name("config").required(false))
            .add_source(config_crate::Environment::with_prefix("APAGOES"))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage_key.trim().is_empty() {
            return Err("storage_key não pode ser vazio".into());
        }
        if self.notification_capacity == 0 {
            return Err("notification_capacity deve ser maior que zero".into());
        }
        if self.legacy_nested_key == self.storage_key || self.legacy_flat_key == self.storage_key {
            return Err("chaves legadas devem ser diferentes de storage_key".into());
        }
        Ok(())
    }

    pub fn legacy_sources(&self) -> Vec<LegacySource> {
        [
            (&self.legacy_nested_key, LegacyShape::Nested),
            (&self.legacy_flat_key, LegacyShape::Flat),
        ]
        .into_iter()
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, shape)| LegacySource::new(key.clone(), shape))
        .collect()
    }
}
