use crate::outage;
use crate::storage::KeyValueStore;
use crate::store::EventStore;
use crate::types::{EventId, NewOutageEvent, OutageEventPatch};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Parser)]
#[command(name = "apagoes", version, about = "Registro de faltas de energia")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lista os eventos em ordem de registro
    Listar {
        /// Mostra só eventos desta localização
        #[arg(long)]
        local: Option<String>,
    },
    /// Mostra um evento
    Mostrar { id: String },
    /// Registra uma nova interrupção
    Adicionar {
        #[arg(long)]
        local: String,
        /// Início (RFC 3339, ex.: 2024-01-01T10:00:00Z)
        #[arg(long)]
        inicio: DateTime<Utc>,
        #[arg(long)]
        fim: Option<DateTime<Utc>>,
        #[arg(long)]
        duracao_estimada: Option<String>,
        #[arg(long)]
        causa: Option<String>,
        #[arg(long)]
        prejuizos: Option<String>,
    },
    /// Atualiza campos de um evento (texto vazio limpa o campo)
    Atualizar {
        id: String,
        #[arg(long)]
        local: Option<String>,
        #[arg(long)]
        inicio: Option<DateTime<Utc>>,
        #[arg(long, conflicts_with = "reabrir")]
        fim: Option<DateTime<Utc>>,
        /// Remove o fim (evento volta a ficar ativo)
        #[arg(long)]
        reabrir: bool,
        #[arg(long)]
        duracao_estimada: Option<String>,
        #[arg(long)]
        causa: Option<String>,
        #[arg(long)]
        prejuizos: Option<String>,
    },
    /// Remove um evento
    Remover { id: String },
    /// Remove todos os eventos
    Limpar,
    /// Eventos por duração, do mais longo ao mais curto
    Duracao,
    /// Localizações afetadas
    Locais,
    /// Eventos com prejuízos registrados
    Prejuizos,
    /// Totais de eventos ativos e resolvidos
    Resumo,
}

impl Command {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Adicionar { .. }
                | Self::Atualizar { .. }
                | Self::Remover { .. }
                | Self::Limpar
        )
    }
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Executa um comando contra um store já inicializado.
pub async fn run<K: KeyValueStore>(
    store: &EventStore<K>,
    command: Command,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Listar { local } => {
            let events = store.list();
            match local {
                Some(local) => print_json(out, &outage::at_location(&events, &local))?,
                None => print_json(out, &*events)?,
            }
        }
        Command::Mostrar { id } => {
            let id = EventId::from(id);
            let Some(event) = store.get(&id) else {
                anyhow::bail!("evento {} não encontrado", id);
            };
            print_json(out, &event)?;
        }
        Command::Adicionar {
            local,
            inicio,
            fim,
            duracao_estimada,
            causa,
            prejuizos,
        } => {
            let draft = NewOutageEvent {
                location: local,
                start_time: Some(inicio),
                end_time: fim,
                estimated_duration: duracao_estimada,
                cause: causa,
                damages: prejuizos,
            };
            let event = store.add(draft).await?;
            print_json(out, &event)?;
        }
        Command::Atualizar {
            id,
            local,
            inicio,
            fim,
            reabrir,
            duracao_estimada,
            causa,
            prejuizos,
        } => {
            let patch = OutageEventPatch {
                location: local,
                start_time: inicio,
                end_time: if reabrir { Some(None) } else { fim.map(Some) },
                estimated_duration: duracao_estimada.map(Some),
                cause: causa.map(Some),
                damages: prejuizos.map(Some),
            };
            if patch.is_empty() {
                anyhow::bail!("nenhum campo para atualizar");
            }
            let event = store.update(&EventId::from(id), patch).await?;
            print_json(out, &event)?;
        }
        Command::Remover { id } => {
            let removed = store.delete(&EventId::from(id)).await?;
            writeln!(out, "Evento {} removido.", removed.id)?;
        }
        Command::Limpar => {
            let count = store.clear().await?;
            writeln!(out, "{count} eventos removidos.")?;
        }
        Command::Duracao => {
            let ranked = outage::rank_by_duration(&store.list(), Utc::now());
            let summary = outage::summarize_durations(&ranked);
            writeln!(
                out,
                "Duração total: {} h | Duração média: {} h",
                summary.total_hours, summary.average_hours
            )?;
            for item in &ranked {
                writeln!(
                    out,
                    "{:>4} h  {:<9} {}  ({})",
                    item.duration_hours, item.status, item.event.location, item.event.id
                )?;
            }
        }
        Command::Locais => {
            for summary in outage::summarize_locations(&store.list()) {
                writeln!(out, "{:>3}  {}", summary.count, summary.location)?;
            }
        }
        Command::Prejuizos => {
            let events = store.list();
            print_json(out, &outage::with_damages(&events))?;
        }
        Command::Resumo => {
            let counts = outage::overview(&store.list());
            writeln!(
                out,
                "Total: {} | Em andamento: {} | Resolvidos: {}",
                counts.total, counts.active, counts.resolved
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_memory::MemoryKeyValueStore;
    use crate::storage::EventStorage;

    async fn store() -> EventStore<MemoryKeyValueStore> {
        let store = EventStore::new(EventStorage::new(MemoryKeyValueStore::new(), "events"));
        store.initialize().await.unwrap();
        store
    }

    async fn exec(store: &EventStore<MemoryKeyValueStore>, args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("apagoes").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(store, cli.command, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn add_update_and_summaries() {
        let store = store().await;
        exec(
            &store,
            &[
                "adicionar",
                "--local",
                "Centro",
                "--inicio",
                "2024-01-01T10:00:00Z",
                "--prejuizos",
                "Geladeira",
            ],
        )
        .await
        .unwrap();
        let id = store.list()[0].id.to_string();

        exec(&store, &["atualizar", id.as_str(), "--fim", "2024-01-01T12:30:00Z"])
            .await
            .unwrap();
        assert!(!store.list()[0].is_active());

        let resumo = exec(&store, &["resumo"]).await.unwrap();
        assert_eq!(resumo.trim(), "Total: 1 | Em andamento: 0 | Resolvidos: 1");

        let duracao = exec(&store, &["duracao"]).await.unwrap();
        assert!(duracao.starts_with("Duração total: 3 h | Duração média: 3 h"));

        let locais = exec(&store, &["locais"]).await.unwrap();
        assert!(locais.contains("Centro"));

        exec(&store, &["atualizar", id.as_str(), "--reabrir"]).await.unwrap();
        assert!(store.list()[0].is_active());

        exec(&store, &["remover", id.as_str()]).await.unwrap();
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let store = store().await;
        assert!(
            exec(&store, &["adicionar", "--local", "", "--inicio", "2024-01-01T10:00:00Z"])
                .await
                .is_err()
        );
        assert!(exec(&store, &["atualizar", "x"]).await.is_err());
        assert!(exec(&store, &["mostrar", "x"]).await.is_err());
        assert!(exec(&store, &["adicionar", "--local", "A", "--inicio", "ontem"]).await.is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn mutations_are_flagged() {
        assert!(Command::Limpar.is_mutation());
        assert!(!Command::Resumo.is_mutation());
    }
}
