use anyhow::Result;
use clap::Parser;
use registro_apagoes::cli::{self, Cli};
use registro_apagoes::config::Config;
use registro_apagoes::kv_file::FileKeyValueStore;
use registro_apagoes::{EventStorage, EventStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs vão para stderr; stdout fica só com a saída dos comandos
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let config = Config::load()?;
    info!("Configuração carregada: {:?}", config);

    let kv = FileKeyValueStore::open(&config.data_dir).await?;
    let store = EventStore::new(EventStorage::new(kv, config.storage_key.clone()))
        .with_legacy_sources(config.legacy_sources())
        .with_notification_capacity(config.notification_capacity);

    // Falha de leitura não derruba o app: o store fica pronto e vazio,
    // mas o erro é mostrado e mutações são recusadas.
    if let Err(err) = store.initialize().await {
        error!("Não foi possível ler os eventos salvos: {}", err);
        if args.command.is_mutation() {
            anyhow::bail!("eventos salvos ilegíveis; nenhuma alteração foi feita ({err})");
        }
    }

    if let Some(report) = store.migration_report() {
        warn!(
            "Dados antigos não migrados: {} registros descartados; conteúdo original mantido em {:?}.",
            report.skipped, report.retained
        );
    }

    let stdout = std::io::stdout();
    cli::run(&store, args.command, &mut stdout.lock()).await
}
