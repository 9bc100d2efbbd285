//! One management client session.
//!
//! Decodes incoming envelopes, dispatches calls through the incoming
//! registry, matches replies to the requests this side sent and reaps those
//! that expire. The pending map is only touched by the session's own reader
//! and by `tick`, which are serialized through its mutex.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Instant,
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::domain::api::ManagementApi;
use crate::errors::{CallError, RegistryError, RpcError};
use crate::rpc::envelope::{self, json_rpc_error, json_rpc_result, JSONRPC_VERSION};
use crate::rpc::executor::MainThreadHandle;
use crate::rpc::identifier::Identifier;
use crate::rpc::method::{
    ClientInfo, IncomingMethod, NotificationMethod, OutgoingMethod, RequestMethod,
};
use crate::rpc::pending::{PendingRequest, PendingRequests, REQUEST_TIMEOUT};
use crate::rpc::registry::Registries;

/// Write half of the transport: whole JSON values, serialized by the writer.
pub type Outbound = mpsc::UnboundedSender<Value>;

/// Everything a connection needs besides its transport.
#[derive(Clone)]
pub struct RpcContext {
    pub registries: Arc<Registries>,
    pub api: Arc<dyn ManagementApi>,
    pub main_thread: MainThreadHandle,
}

impl RpcContext {
    /// Context backed by the process-wide registries.
    pub fn installed(
        api: Arc<dyn ManagementApi>,
        main_thread: MainThreadHandle,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            registries: Registries::installed().ok_or(RegistryError::NotInstalled)?,
            api,
            main_thread,
        })
    }
}

pub struct Connection {
    client: ClientInfo,
    outbound: Outbound,
    context: RpcContext,
    next_transaction_id: AtomicU64,
    pending: Mutex<PendingRequests>,
    closed: Notify,
}

impl Connection {
    pub fn new(client: ClientInfo, outbound: Outbound, context: RpcContext) -> Self {
        Self {
            client,
            outbound,
            context,
            next_transaction_id: AtomicU64::new(1),
            pending: Mutex::new(PendingRequests::default()),
            closed: Notify::new(),
        }
    }

    pub fn client(&self) -> ClientInfo {
        self.client
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Handles one text message; a payload that is not JSON gets a parse
    /// error with a null id.
    pub async fn handle_text(&self, text: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(value).await,
            Err(err) => {
                debug!(connection_id = self.client.connection_id, error = %err, "unparsable message");
                Some(json_rpc_error(Value::Null, &RpcError::ParseError))
            }
        }
    }

    /// Turns one decoded message into zero or one replies.
    pub async fn handle_value(&self, value: Value) -> Option<Value> {
        match value {
            Value::Array(batch) => {
                let mut responses = Vec::new();
                for item in batch {
                    if let Some(response) = self.handle_single(item).await {
                        responses.push(response);
                    }
                }
                Some(Value::Array(responses))
            }
            Value::Object(_) => self.handle_single(value).await,
            _ => Some(json_rpc_error(
                Value::Null,
                &RpcError::invalid_request("message must be an object or an array"),
            )),
        }
    }

    async fn handle_single(&self, value: Value) -> Option<Value> {
        let Value::Object(mut message) = value else {
            return Some(json_rpc_error(
                Value::Null,
                &RpcError::invalid_request("batch entries must be objects"),
            ));
        };

        let supported_version = message
            .get("jsonrpc")
            .map_or(true, |version| version == JSONRPC_VERSION);

        let has_method = message.contains_key("method");
        let has_result = message.contains_key("result");
        let has_error = message.contains_key("error");

        match (has_method, has_result, has_error) {
            (true, false, false) => self.handle_call(message, supported_version).await,
            (false, true, false) if message.contains_key("id") => {
                if supported_version {
                    self.handle_response(&mut message);
                } else {
                    self.drop_unsupported_reply(&message);
                }
                None
            }
            (false, false, true) => {
                if supported_version {
                    self.handle_error_reply(&mut message);
                } else {
                    self.drop_unsupported_reply(&message);
                }
                None
            }
            _ => Some(json_rpc_error(
                reply_id(&message),
                &RpcError::invalid_request("message is neither a call nor a reply"),
            )),
        }
    }

    async fn handle_call(
        &self,
        mut message: Map<String, Value>,
        supported_version: bool,
    ) -> Option<Value> {
        let id = match message.remove("id") {
            None => None,
            Some(id) if envelope::is_valid_id(&id) => Some(id),
            Some(_) => {
                return Some(json_rpc_error(
                    Value::Null,
                    &RpcError::invalid_request("id must be a string, a number or null"),
                ))
            }
        };

        if !supported_version {
            debug!(
                connection_id = self.client.connection_id,
                version = ?message.get("jsonrpc"),
                "unsupported jsonrpc version"
            );
            return id.map(|id| {
                json_rpc_error(id, &RpcError::invalid_request("jsonrpc must be \"2.0\""))
            });
        }

        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        let outcome = self.dispatch(message).await;

        match &outcome {
            Ok(_) => debug!(
                connection_id = self.client.connection_id,
                method = %method,
                outcome = "success",
                "incoming call"
            ),
            Err(RpcError::Internal(detail)) => error!(
                connection_id = self.client.connection_id,
                method = %method,
                error = %detail,
                "incoming call failed with internal error"
            ),
            Err(err) => info!(
                connection_id = self.client.connection_id,
                method = %method,
                error = %err,
                outcome = "failure",
                "incoming call"
            ),
        }

        let id = id?;
        Some(match outcome {
            Ok(result) => json_rpc_result(id, result),
            Err(err) => json_rpc_error(id, &err),
        })
    }

    async fn dispatch(&self, mut message: Map<String, Value>) -> Result<Value, RpcError> {
        let name = match message.remove("method") {
            Some(Value::String(name)) => name,
            _ => return Err(RpcError::invalid_request("method must be a string")),
        };
        let params = match message.remove("params") {
            None => None,
            Some(params @ (Value::Array(_) | Value::Object(_))) => Some(params),
            Some(_) => {
                return Err(RpcError::invalid_request(
                    "params must be an array or an object",
                ))
            }
        };

        let id: Identifier = name
            .parse()
            .map_err(|_| RpcError::MethodNotFound(name.clone()))?;
        let method = self
            .context
            .registries
            .incoming()
            .lookup(&id)
            .cloned()
            .ok_or_else(|| RpcError::MethodNotFound(name.clone()))?;

        if method.attributes().run_on_main_thread && !self.context.main_thread.is_main_thread() {
            let api = Arc::clone(&self.context.api);
            let client = self.client;
            return self
                .context
                .main_thread
                .submit(move || method.invoke(api.as_ref(), params, &client))
                .await
                .map_err(|err| RpcError::internal(err.to_string()))?;
        }

        invoke_guarded(&method, self.context.api.as_ref(), params, &self.client)
    }

    fn handle_response(&self, message: &mut Map<String, Value>) {
        let result = message.remove("result").unwrap_or(Value::Null);
        let Some(id) = message.get("id").and_then(transaction_id) else {
            warn!(
                connection_id = self.client.connection_id,
                id = ?message.get("id"),
                "dropping response whose id is not a transaction id"
            );
            return;
        };

        match self.pending().take(id) {
            Some(request) => request.complete(Ok(result)),
            None => warn!(
                connection_id = self.client.connection_id,
                id,
                "dropping response for unknown request"
            ),
        }
    }

    fn handle_error_reply(&self, message: &mut Map<String, Value>) {
        let error = message.remove("error").unwrap_or(Value::Null);
        let id = message.get("id").and_then(transaction_id);
        warn!(
            connection_id = self.client.connection_id,
            id = ?id,
            error = %error,
            "peer replied with error"
        );

        if let Some(request) = id.and_then(|id| self.pending().take(id)) {
            request.complete(Err(CallError::Remote(error)));
        }
    }

    fn drop_unsupported_reply(&self, message: &Map<String, Value>) {
        warn!(
            connection_id = self.client.connection_id,
            id = ?message.get("id"),
            version = ?message.get("jsonrpc"),
            "dropping reply with unsupported jsonrpc version"
        );
    }

    /// Sends a notification; no reply is expected.
    pub fn send_notification<P: Serialize>(
        &self,
        method: &NotificationMethod<P>,
        params: &P,
    ) -> Result<(), CallError> {
        let descriptor = self.outgoing(method.id())?;
        let params = descriptor.encode_params(params)?;
        self.write(envelope::notification(descriptor.id(), params));
        Ok(())
    }

    /// Sends a request and returns a future of its decoded result.
    ///
    /// The request is written before this returns; the future resolves when
    /// the peer replies, when [`Connection::tick`] finds it expired, or with
    /// [`CallError::ConnectionClosed`] once the connection is gone.
    pub fn send_request<P, R>(
        &self,
        method: &RequestMethod<P, R>,
        params: &P,
    ) -> impl std::future::Future<Output = Result<R, CallError>> + Send + 'static
    where
        P: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let registered = self.register_request(method.id(), params);
        let decode = |value: Value| serde_json::from_value::<R>(value).map_err(CallError::Decode);

        async move {
            let receiver = registered?;
            let value = receiver.await.map_err(|_| CallError::ConnectionClosed)??;
            decode(value)
        }
    }

    fn register_request<P: Serialize>(
        &self,
        id: &Identifier,
        params: &P,
    ) -> Result<oneshot::Receiver<Result<Value, CallError>>, CallError> {
        let descriptor = self.outgoing(id)?;
        let params = descriptor.encode_params(params)?;
        let transaction_id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        let (completion, receiver) = oneshot::channel();

        self.pending().insert(
            transaction_id,
            PendingRequest::new(
                Arc::clone(&descriptor),
                completion,
                Instant::now() + REQUEST_TIMEOUT,
            ),
        );
        self.write(envelope::request(transaction_id, descriptor.id(), params));
        Ok(receiver)
    }

    /// Rejects every pending request whose deadline has passed.
    pub fn tick(&self) {
        self.expire_pending(Instant::now());
    }

    pub fn expire_pending(&self, now: Instant) {
        let expired = self.pending().take_expired(now);
        for (id, request) in expired {
            let method = request.method().id().clone();
            warn!(
                connection_id = self.client.connection_id,
                id,
                method = %method,
                "outgoing request timed out"
            );
            request.complete(Err(CallError::Timeout { method }));
        }
    }

    /// Writes a raw value to the transport.
    pub fn write(&self, value: Value) {
        if self.outbound.send(value).is_err() {
            debug!(
                connection_id = self.client.connection_id,
                "transport closed, dropping outgoing message"
            );
        }
    }

    /// Asks the session loop to end and abandons pending requests.
    pub fn close(&self) {
        self.pending().abandon_all();
        self.closed.notify_one();
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    fn outgoing(&self, id: &Identifier) -> Result<Arc<OutgoingMethod>, CallError> {
        self.context
            .registries
            .outgoing()
            .lookup(id)
            .cloned()
            .ok_or_else(|| CallError::UnknownMethod(id.clone()))
    }

    fn pending(&self) -> MutexGuard<'_, PendingRequests> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs a handler inline, turning a panic into an internal error.
fn invoke_guarded(
    method: &IncomingMethod,
    api: &dyn ManagementApi,
    params: Option<Value>,
    client: &ClientInfo,
) -> Result<Value, RpcError> {
    catch_unwind(AssertUnwindSafe(|| method.invoke(api, params, client)))
        .unwrap_or_else(|_| Err(RpcError::internal("handler panicked")))
}

/// Transaction ids are non-negative integers; peers may echo them as `1.0`.
fn transaction_id(id: &Value) -> Option<u64> {
    id.as_u64().or_else(|| {
        id.as_f64()
            .filter(|id| *id >= 0.0 && id.fract() == 0.0 && *id <= u64::MAX as f64)
            .map(|id| id as u64)
    })
}

/// Id to echo in an error reply for a malformed message.
fn reply_id(message: &Map<String, Value>) -> Value {
    message
        .get("id")
        .filter(|id| envelope::is_valid_id(id))
        .cloned()
        .unwrap_or(Value::Null)
}
