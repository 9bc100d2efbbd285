//! Registered method descriptors.
//!
//! Incoming methods are handlers the peer may call; outgoing methods are
//! notifications and requests this side may send. Both are closed sum types
//! over their parameter shape, so dispatch never inspects types at runtime.

use std::{fmt, marker::PhantomData};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::domain::api::ManagementApi;
use crate::errors::{CallError, RpcError};
use crate::rpc::identifier::Identifier;
use crate::rpc::schema::{DescribeSchema, MethodInfo, Schema, Slot};

/// Per-connection attribution passed to every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub connection_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingMethodAttributes {
    pub run_on_main_thread: bool,
    pub discoverable: bool,
}

impl IncomingMethodAttributes {
    pub const fn main_thread() -> Self {
        Self {
            run_on_main_thread: true,
            discoverable: true,
        }
    }

    pub const fn io_thread() -> Self {
        Self {
            run_on_main_thread: false,
            discoverable: true,
        }
    }

    pub const fn undiscoverable(self) -> Self {
        Self {
            discoverable: false,
            ..self
        }
    }
}

type ParameterlessFn = dyn Fn(&dyn ManagementApi, &ClientInfo) -> Result<Value, RpcError> + Send + Sync;
type WithParamsFn =
    dyn Fn(&dyn ManagementApi, Value, &ClientInfo) -> Result<Value, RpcError> + Send + Sync;

pub enum IncomingHandler {
    Parameterless(Box<ParameterlessFn>),
    WithParams(Box<WithParamsFn>),
}

pub struct IncomingMethod {
    info: MethodInfo,
    attributes: IncomingMethodAttributes,
    handler: IncomingHandler,
}

impl fmt::Debug for IncomingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMethod")
            .field("info", &self.info)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl IncomingMethod {
    pub fn parameterless<R, F>(
        description: &'static str,
        result_name: &'static str,
        attributes: IncomingMethodAttributes,
        handler: F,
    ) -> Self
    where
        R: Serialize + DescribeSchema,
        F: Fn(&dyn ManagementApi, &ClientInfo) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        Self {
            info: MethodInfo::new(description).with_result::<R>(result_name),
            attributes,
            handler: IncomingHandler::Parameterless(Box::new(move |api, client| {
                encode_result(handler(api, client)?)
            })),
        }
    }

    pub fn with_params<P, R, F>(
        description: &'static str,
        param_name: &'static str,
        result_name: &'static str,
        attributes: IncomingMethodAttributes,
        handler: F,
    ) -> Self
    where
        P: DeserializeOwned + DescribeSchema,
        R: Serialize + DescribeSchema,
        F: Fn(&dyn ManagementApi, P, &ClientInfo) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        Self {
            info: MethodInfo::new(description)
                .with_params::<P>(param_name)
                .with_result::<R>(result_name),
            attributes,
            handler: IncomingHandler::WithParams(Box::new(move |api, raw, client| {
                let params = serde_json::from_value::<P>(raw)
                    .map_err(|err| RpcError::invalid_params(err.to_string()))?;
                encode_result(handler(api, params, client)?)
            })),
        }
    }

    /// Parameterless method whose result is already a JSON value described by
    /// `result_schema`.
    pub(crate) fn raw(
        description: &'static str,
        result_name: &'static str,
        result_schema: Schema,
        attributes: IncomingMethodAttributes,
        handler: Box<ParameterlessFn>,
    ) -> Self {
        let mut info = MethodInfo::new(description);
        info.result = Some(Slot {
            name: result_name,
            schema: result_schema,
        });
        Self {
            info,
            attributes,
            handler: IncomingHandler::Parameterless(handler),
        }
    }

    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    pub fn attributes(&self) -> IncomingMethodAttributes {
        self.attributes
    }

    /// Runs the handler on the current thread.
    ///
    /// `params` is the raw `params` member of the request: a single-element
    /// array or an object keyed by the declared parameter name.
    pub fn invoke(
        &self,
        api: &dyn ManagementApi,
        params: Option<Value>,
        client: &ClientInfo,
    ) -> Result<Value, RpcError> {
        match &self.handler {
            IncomingHandler::Parameterless(handler) => {
                if !is_empty_params(params.as_ref()) {
                    return Err(RpcError::invalid_params("method takes no parameters"));
                }
                handler(api, client)
            }
            IncomingHandler::WithParams(handler) => {
                let name = self.info.params.as_ref().map_or("params", |slot| slot.name);
                let value = extract_single_param(name, params)?;
                handler(api, value, client)
            }
        }
    }
}

fn encode_result<R: Serialize>(result: R) -> Result<Value, RpcError> {
    serde_json::to_value(result)
        .map_err(|err| RpcError::internal(format!("failed to encode result: {err}")))
}

fn is_empty_params(params: Option<&Value>) -> bool {
    match params {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(_) => false,
    }
}

fn extract_single_param(name: &str, params: Option<Value>) -> Result<Value, RpcError> {
    match params {
        None | Some(Value::Null) => Err(RpcError::invalid_params(format!(
            "missing parameter `{name}`"
        ))),
        Some(Value::Array(mut items)) => {
            if items.len() != 1 {
                return Err(RpcError::invalid_params(format!(
                    "expected exactly one positional parameter, got {}",
                    items.len()
                )));
            }
            Ok(items.remove(0))
        }
        Some(Value::Object(mut fields)) => {
            let value = fields
                .remove(name)
                .ok_or_else(|| RpcError::invalid_params(format!("missing parameter `{name}`")))?;
            if let Some(unexpected) = fields.keys().next() {
                return Err(RpcError::invalid_params(format!(
                    "unexpected parameter `{unexpected}`"
                )));
            }
            Ok(value)
        }
        Some(_) => Err(RpcError::invalid_params(
            "params must be an array or an object",
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingMethodAttributes {
    pub discoverable: bool,
}

impl Default for OutgoingMethodAttributes {
    fn default() -> Self {
        Self { discoverable: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingShape {
    Notification,
    NotificationWithParams,
    Request,
    RequestWithParams,
}

impl OutgoingShape {
    pub fn takes_params(self) -> bool {
        matches!(self, Self::NotificationWithParams | Self::RequestWithParams)
    }

    pub fn expects_reply(self) -> bool {
        matches!(self, Self::Request | Self::RequestWithParams)
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingMethod {
    id: Identifier,
    info: MethodInfo,
    attributes: OutgoingMethodAttributes,
    shape: OutgoingShape,
}

impl OutgoingMethod {
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    pub fn attributes(&self) -> OutgoingMethodAttributes {
        self.attributes
    }

    pub fn shape(&self) -> OutgoingShape {
        self.shape
    }

    /// Wire form of `params`: a single-element array, or nothing for
    /// parameterless shapes.
    pub fn encode_params<P: Serialize>(&self, params: &P) -> Result<Option<Value>, CallError> {
        if !self.shape.takes_params() {
            return Ok(None);
        }
        let value = serde_json::to_value(params).map_err(CallError::Encode)?;
        Ok(Some(Value::Array(vec![value])))
    }
}

/// Typed handle of a notification this side sends.
pub struct NotificationMethod<P = ()> {
    id: Identifier,
    param: Option<&'static str>,
    _params: PhantomData<fn(P)>,
}

impl NotificationMethod<()> {
    pub const fn new(path: &'static str) -> Self {
        Self {
            id: Identifier::vanilla(path),
            param: None,
            _params: PhantomData,
        }
    }
}

impl<P> NotificationMethod<P> {
    pub const fn with_param(path: &'static str, param: &'static str) -> Self {
        Self {
            id: Identifier::vanilla(path),
            param: Some(param),
            _params: PhantomData,
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }
}

impl<P: DescribeSchema> NotificationMethod<P> {
    pub fn describe(
        &self,
        description: &'static str,
        attributes: OutgoingMethodAttributes,
    ) -> OutgoingMethod {
        let (info, shape) = match self.param {
            Some(name) => (
                MethodInfo::new(description).with_params::<P>(name),
                OutgoingShape::NotificationWithParams,
            ),
            None => (MethodInfo::new(description), OutgoingShape::Notification),
        };
        OutgoingMethod {
            id: self.id.clone(),
            info,
            attributes,
            shape,
        }
    }
}

/// Typed handle of a request this side sends and whose reply it decodes.
pub struct RequestMethod<P, R> {
    id: Identifier,
    param: Option<&'static str>,
    result: &'static str,
    _types: PhantomData<fn(P) -> R>,
}

impl<R> RequestMethod<(), R> {
    pub const fn new(path: &'static str, result: &'static str) -> Self {
        Self {
            id: Identifier::vanilla(path),
            param: None,
            result,
            _types: PhantomData,
        }
    }
}

impl<P, R> RequestMethod<P, R> {
    pub const fn with_param(path: &'static str, param: &'static str, result: &'static str) -> Self {
        Self {
            id: Identifier::vanilla(path),
            param: Some(param),
            result,
            _types: PhantomData,
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }
}

impl<P: DescribeSchema, R: DescribeSchema> RequestMethod<P, R> {
    pub fn describe(
        &self,
        description: &'static str,
        attributes: OutgoingMethodAttributes,
    ) -> OutgoingMethod {
        let base = MethodInfo::new(description).with_result::<R>(self.result);
        let (info, shape) = match self.param {
            Some(name) => (
                base.with_params::<P>(name),
                OutgoingShape::RequestWithParams,
            ),
            None => (base, OutgoingShape::Request),
        };
        OutgoingMethod {
            id: self.id.clone(),
            info,
            attributes,
            shape,
        }
    }
}

impl DescribeSchema for () {
    fn schema() -> Schema {
        Schema::Object(Vec::new())
    }
}
