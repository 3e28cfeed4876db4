use chia_pay_listener::{
    EventBus, FileSettingsStore, InMemoryRequestRepository, ListenerConfig, ListenerEvent,
    ListenerService, NodeRegistry, SettingsRepository,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ListenerConfig::from_env()?;
    log::info!("Settings directory: {}", config.data_dir.display());

    let settings: Arc<dyn SettingsRepository> =
        Arc::new(FileSettingsStore::new_with_base_dir(config.data_dir.clone()));
    let nodes = Arc::new(NodeRegistry::from_config(&config.chains)?);
    let requests = Arc::new(InMemoryRequestRepository::new());
    let events = EventBus::default();

    let service = ListenerService::start(&config, nodes, settings, requests, events)?;

    for handle in service.chains() {
        let pool = handle.pool.current();
        match pool.addresses.first() {
            Some(first) => log::info!(
                "{}: watching {} addresses, first {}",
                handle.config.chain_id(),
                pool.len(),
                first.address
            ),
            None => log::warn!(
                "{}: no master public key configured, nothing to watch",
                handle.config.chain_id()
            ),
        }
    }

    let chains = config.chains.clone();
    let mut receiver = service.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(ListenerEvent::PaymentReceived { chain, request_id, payment }) => {
                    let link = chains
                        .iter()
                        .find(|c| c.chain_id() == chain)
                        .map(|c| c.transaction_link(&payment.record.transaction_id.to_hex()))
                        .unwrap_or_default();
                    log::info!("Request {} received {} ({})", request_id, payment.amount, link);
                }
                Ok(ListenerEvent::ConfirmationsUpdated { request_id, confirmation_count, status, .. }) => {
                    log::info!(
                        "Request {}: {} confirmations, {:?}",
                        request_id,
                        confirmation_count,
                        status
                    );
                }
                Ok(ListenerEvent::AvailabilityChanged { chain, available, .. }) => {
                    log::info!("{} available: {}", chain, available);
                }
                Err(RecvError::Lagged(skipped)) => log::warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    service.shutdown().await;
    reporter.abort();
    Ok(())
}
