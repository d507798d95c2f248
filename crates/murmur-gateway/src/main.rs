//! murmur gateway binary.
//!
//! Usage: `murmur-gateway [config.yaml]` (default `murmur.yaml`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use murmur_core::clock::{Clock, SystemClock};
use murmur_gateway::attest::DevAttestationProvider;
use murmur_gateway::store::InMemoryStore;
use murmur_gateway::{app_state, config, router};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error=%e, "murmur-gateway exited");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "murmur.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg.gateway.listen.parse()?;
    let session_idle_ms = cfg.rate_limit.burst_window_ms.max(cfg.rate_limit.cooldown_ms);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = InMemoryStore::new();
    let state = app_state::AppState::new(
        cfg,
        Arc::new(DevAttestationProvider::default()),
        Arc::new(store.clone()),
        Arc::clone(&clock),
    )?;

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                let now = clock.now_ms();
                let expired = store.sweep_expired(now);
                let idle = state.sessions().evict_idle(now, session_idle_ms);
                if expired > 0 || idle > 0 {
                    tracing::debug!(expired, idle, "sweep");
                }
            }
        });
    }

    let app = router::build_router(state);

    tracing::info!(%listen, config=%path, "murmur-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
