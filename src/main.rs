use std::{sync::Arc, time::Duration};

use management_rpc::{
    config::Config,
    domain::{
        api::ManagementApi, build_registries, memory::InMemoryServer,
        notifications::NotificationPublisher, types::GameEvent,
    },
    logging,
    rpc::{
        connection::RpcContext,
        executor::{MainThread, MainThreadHandle},
        server::ManagementServer,
    },
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;
    build_registries()?.install()?;
    let main_thread = MainThread::spawn()?;

    let game = Arc::new(InMemoryServer::new());
    let server = ManagementServer::new(
        RpcContext::installed(game.clone(), main_thread.handle())?,
        config.api_token.clone(),
    );
    let publisher = Arc::new(NotificationPublisher::new(server.clone()));
    game.attach_events(publisher.clone());

    let local_addr = server.start(bind_socket).await?;
    info!(
        bind_addr = %config.bind_addr,
        bind_port = local_addr.port(),
        "server starting"
    );
    game.mark_started();

    let ticker = server.spawn_ticker(config.tick_interval);
    let heartbeat = config.status_heartbeat.map(|period| {
        spawn_heartbeat(
            period,
            game.clone(),
            publisher.clone(),
            main_thread.handle(),
        )
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
        }
        () = game.stop_requested() => info!("stop requested over management protocol"),
    }

    publisher.publish(GameEvent::ServerStopping);
    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    ticker.abort();
    server.stop().await;
    main_thread.shutdown();
    info!("server stopped");
    Ok(())
}

/// Publishes `server/status` every `period`, reading state on the main thread.
fn spawn_heartbeat(
    period: Duration,
    game: Arc<InMemoryServer>,
    publisher: Arc<NotificationPublisher>,
    main_thread: MainThreadHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let game = game.clone();
            match main_thread.submit(move || game.status()).await {
                Ok(status) => publisher.publish(GameEvent::Status(status)),
                Err(err) => {
                    warn!(error = %err, "status heartbeat stopped");
                    break;
                }
            }
        }
    })
}
