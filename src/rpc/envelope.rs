//! JSON-RPC 2.0 envelope builders.

use serde_json::{json, Value};

use crate::errors::RpcError;
use crate::rpc::identifier::Identifier;

pub const JSONRPC_VERSION: &str = "2.0";

pub fn json_rpc_error(id: Value, error: &RpcError) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": error.to_error_object(),
    })
}

pub fn json_rpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn request(id: u64, method: &Identifier, params: Option<Value>) -> Value {
    let mut envelope = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method.to_string(),
    });
    if let Some(params) = params {
        envelope["params"] = params;
    }
    envelope
}

pub fn notification(method: &Identifier, params: Option<Value>) -> Value {
    let mut envelope = json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method.to_string(),
    });
    if let Some(params) = params {
        envelope["params"] = params;
    }
    envelope
}

/// Request ids may be null, a string or a number.
pub fn is_valid_id(id: &Value) -> bool {
    matches!(id, Value::Null | Value::String(_) | Value::Number(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_has_sorted_members() {
        let body = json_rpc_error(json!(1), &RpcError::MethodNotFound("x".to_string()));
        assert_eq!(
            body.to_string(),
            "{\"error\":{\"code\":-32601,\"message\":\"Method not found\"},\"id\":1,\"jsonrpc\":\"2.0\"}"
        );
    }

    #[test]
    fn notification_omits_id_and_empty_params() {
        let body = notification(&Identifier::vanilla("notification/server/started"), None);
        assert!(body.get("id").is_none());
        assert!(body.get("params").is_none());
        assert_eq!(body["method"], "minecraft:notification/server/started");
    }

    #[test]
    fn request_carries_transaction_id() {
        let body = request(3, &Identifier::vanilla("test/ask"), Some(json!([true])));
        assert_eq!(body["id"], 3);
        assert_eq!(body["params"], json!([true]));
    }

    #[test]
    fn id_types() {
        assert!(is_valid_id(&json!(null)));
        assert!(is_valid_id(&json!("abc")));
        assert!(is_valid_id(&json!(4.5)));
        assert!(!is_valid_id(&json!({})));
        assert!(!is_valid_id(&json!([1])));
        assert!(!is_valid_id(&json!(true)));
    }
}
