use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fix_broker::{
    Acceptor, ExecIdSource, ExecutionDispatcher, OrderStore, SessionContext, SessionRegistry,
    Settings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(String::as_str) {
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        other => other,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Arc::new(Settings::load(config_path)?);
    info!(
        addr = %settings.bind_addr(),
        comp_id = %settings.server_comp_id,
        "starting FIX acceptor"
    );

    let store = Arc::new(OrderStore::new());
    let registry = Arc::new(SessionRegistry::new());
    let exec_ids = Arc::new(ExecIdSource::new());

    // The HTTP admin layer drives this object; constructing it here keeps
    // the wiring in one place for embedding callers.
    let _dispatcher = ExecutionDispatcher::new(store.clone(), registry.clone(), exec_ids.clone());

    let ctx = SessionContext {
        settings: settings.clone(),
        store,
        registry,
        exec_ids,
    };

    let acceptor = Acceptor::bind(ctx).await?;
    let (shutdown_tx, _) = broadcast::channel(1);
    let acceptor_task = tokio::spawn(acceptor.run(shutdown_tx.clone()));

    match signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(err) => error!("failed to listen for shutdown signal: {err}"),
    }
    let _ = shutdown_tx.send(());
    acceptor_task.await?;

    Ok(())
}

fn print_usage() {
    println!("fix-broker - FIX 4.2 broker acceptor");
    println!();
    println!("Usage:");
    println!("  fix-broker [CONFIG]      # run with optional config file (default broker.toml)");
    println!("  fix-broker --help        # show this help message");
    println!();
    println!("Environment:");
    println!("  RUST_LOG                 # tracing filter (default info)");
    println!("  BROKER_LISTEN_PORT etc.  # override any settings field");
}
