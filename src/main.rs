use log_distributor::config::DistributorConfig;
use log_distributor::distributor::handlers::router;
use log_distributor::distributor::monitor::spawn_monitor;
use log_distributor::distributor::queue::Distributor;

use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = DistributorConfig::from_env();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                if i + 1 >= args.len() {
                    eprintln!("Usage: {} [--port <port>]", args[0]);
                    std::process::exit(1);
                }
                config.port = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    tracing::info!(
        "starting coordinator: port={} task_timeout={}ms max_retries={} monitor_interval={:?}",
        config.port,
        config.task_timeout_ms,
        config.max_retries,
        config.monitor_interval
    );

    let distributor = Arc::new(Distributor::new(config.task_timeout_ms, config.max_retries));

    spawn_monitor(distributor.clone(), config.monitor_interval);

    let app = router(distributor);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("coordinator listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
