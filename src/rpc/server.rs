//! Listener and live-connection set.

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::errors::RpcError;
use crate::rpc::connection::{Connection, Outbound, RpcContext};
use crate::rpc::envelope::json_rpc_error;
use crate::rpc::method::{ClientInfo, NotificationMethod};
use crate::{build_app, AppState};

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

pub struct ManagementServer {
    context: RpcContext,
    api_token: Arc<str>,
    connections: Mutex<BTreeMap<u64, Arc<Connection>>>,
    next_connection_id: AtomicU64,
    accepting: AtomicBool,
    listener: tokio::sync::Mutex<Option<RunningListener>>,
}

impl ManagementServer {
    pub fn new(context: RpcContext, api_token: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            context,
            api_token: api_token.into(),
            connections: Mutex::new(BTreeMap::new()),
            next_connection_id: AtomicU64::new(1),
            accepting: AtomicBool::new(false),
            listener: tokio::sync::Mutex::new(None),
        })
    }

    /// Binds `addr` and starts accepting sessions. Returns the bound address;
    /// if already running, returns the current one without rebinding.
    pub async fn start(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let mut listener_slot = self.listener.lock().await;
        if let Some(running) = listener_slot.as_ref() {
            return Ok(running.local_addr);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let app = build_app(AppState::new(Arc::clone(&self.api_token), Arc::clone(self)));
        let (shutdown, shutdown_signal) = oneshot::channel::<()>();
        self.accepting.store(true, Ordering::Release);
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_signal.await;
                })
                .await
        });

        *listener_slot = Some(RunningListener {
            local_addr,
            shutdown,
            task,
        });
        info!(%local_addr, "management server listening");
        Ok(local_addr)
    }

    /// Closes the listener and every live connection. No-op when stopped.
    pub async fn stop(&self) {
        let Some(running) = self.listener.lock().await.take() else {
            return;
        };
        let closing = {
            let mut connections = self.connections();
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *connections)
        };
        let closed_connections = closing.len();
        for connection in closing.into_values() {
            connection.close();
        }
        let _ = running.shutdown.send(());

        match running.task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "listener stopped with error"),
            Err(err) => warn!(error = %err, "listener task failed"),
        }
        info!(closed_connections, "management server stopped");
    }

    /// Whether new sessions are admitted: true between `start` and `stop`.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .await
            .as_ref()
            .map(|running| running.local_addr)
    }

    pub fn on_connected(&self, outbound: Outbound) -> Arc<Connection> {
        let connection = self.new_connection(outbound);
        self.connections()
            .insert(connection.client().connection_id, Arc::clone(&connection));
        info!(connection_id = connection.client().connection_id, "management connection opened");
        connection
    }

    /// Like [`ManagementServer::on_connected`], but only while accepting.
    /// The check and the insert share the set lock with `stop`, so a session
    /// is either closed by `stop` or never admitted.
    pub fn admit(&self, outbound: Outbound) -> Option<Arc<Connection>> {
        let connection = {
            let mut connections = self.connections();
            if !self.is_accepting() {
                return None;
            }
            let connection = self.new_connection(outbound);
            connections.insert(connection.client().connection_id, Arc::clone(&connection));
            connection
        };
        info!(connection_id = connection.client().connection_id, "management connection opened");
        Some(connection)
    }

    fn new_connection(&self, outbound: Outbound) -> Arc<Connection> {
        let client = ClientInfo {
            connection_id: self.next_connection_id.fetch_add(1, Ordering::Relaxed),
        };
        Arc::new(Connection::new(client, outbound, self.context.clone()))
    }

    pub fn on_disconnected(&self, client: ClientInfo) {
        if self.connections().remove(&client.connection_id).is_some() {
            info!(connection_id = client.connection_id, "management connection closed");
        }
    }

    /// Applies `action` to every live connection while holding the set lock.
    pub fn for_each_connection(&self, mut action: impl FnMut(&Connection)) {
        for connection in self.connections().values() {
            action(connection);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    pub fn tick_all(&self) {
        self.for_each_connection(Connection::tick);
    }

    pub fn broadcast<P: Serialize>(&self, method: &NotificationMethod<P>, params: &P) {
        self.for_each_connection(|connection| {
            if let Err(err) = connection.send_notification(method, params) {
                warn!(
                    connection_id = connection.client().connection_id,
                    method = %method.id(),
                    error = %err,
                    "failed to send notification"
                );
            }
        });
    }

    /// Ticks every connection each `period` until the task is aborted.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                server.tick_all();
            }
        })
    }

    /// Runs one upgraded socket until either side closes it.
    pub async fn serve_socket(self: Arc<Self>, socket: WebSocket) {
        let (outbound, mut queued) = tokio::sync::mpsc::unbounded_channel::<Value>();
        let Some(connection) = self.admit(outbound) else {
            debug!("rejecting session, server is stopping");
            return;
        };
        let (mut sink, mut stream) = socket.split();
        let connection_id = connection.client().connection_id;

        let writer = tokio::spawn(async move {
            while let Some(value) = queued.recv().await {
                if sink.send(Message::Text(value.to_string().into())).await.is_err() {
                    debug!(connection_id, "websocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                () = connection.closed() => break,
            };
            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    debug!(connection_id, error = %err, "websocket receive failed");
                    break;
                }
                None => break,
            };

            let reply = match frame {
                Message::Text(text) => connection.handle_text(text.as_str()).await,
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => connection.handle_text(text).await,
                    Err(_) => Some(json_rpc_error(Value::Null, &RpcError::ParseError)),
                },
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => break,
            };
            if let Some(reply) = reply {
                connection.write(reply);
            }
        }

        self.on_disconnected(connection.client());
        connection.close();
        drop(connection);
        if writer.await.is_err() {
            debug!(connection_id, "websocket writer task failed");
        }
    }

    fn connections(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{build_registries, memory::InMemoryServer};
    use crate::rpc::executor::MainThread;

    fn server(main: &MainThread) -> Arc<ManagementServer> {
        ManagementServer::new(
            RpcContext {
                registries: Arc::new(build_registries().expect("registries")),
                api: Arc::new(InMemoryServer::new()),
                main_thread: main.handle(),
            },
            "token",
        )
    }

    #[tokio::test]
    async fn sessions_are_admitted_only_while_accepting() {
        let main = MainThread::spawn().expect("spawn main thread");
        let server = server(&main);

        let (outbound, _queued) = tokio::sync::mpsc::unbounded_channel();
        assert!(server.admit(outbound).is_none());
        assert_eq!(server.connection_count(), 0);

        server
            .start("127.0.0.1:0".parse().expect("socket addr"))
            .await
            .expect("start server");
        let (outbound, _queued) = tokio::sync::mpsc::unbounded_channel();
        let admitted = server.admit(outbound).expect("admitted while running");
        assert_eq!(server.connection_count(), 1);

        server.stop().await;
        assert_eq!(server.connection_count(), 0);
        tokio::time::timeout(Duration::from_secs(1), admitted.closed())
            .await
            .expect("stop closes admitted sessions");

        let (outbound, _queued) = tokio::sync::mpsc::unbounded_channel();
        assert!(server.admit(outbound).is_none());
        assert_eq!(server.connection_count(), 0);
    }
}
