//! `rpc.discover`: an OpenRPC document of every discoverable method.

use serde_json::{json, Value};

use crate::rpc::identifier::Identifier;
use crate::rpc::method::{IncomingMethod, IncomingMethodAttributes};
use crate::rpc::registry::{IncomingRegistry, OutgoingRegistry};
use crate::rpc::schema::{MethodInfo, Schema};

pub const OPENRPC_VERSION: &str = "1.3.2";

pub static DISCOVER: Identifier = Identifier::vanilla("rpc.discover");

pub fn discovery_document(incoming: &IncomingRegistry, outgoing: &OutgoingRegistry) -> Value {
    let mut entries: Vec<(String, &MethodInfo)> = incoming
        .iter()
        .filter(|(_, method)| method.attributes().discoverable)
        .map(|(id, method)| (id.to_string(), method.info()))
        .chain(
            outgoing
                .iter()
                .filter(|(_, method)| method.attributes().discoverable)
                .map(|(id, method)| (id.to_string(), method.info())),
        )
        .collect();
    entries.sort_by(|left, right| left.0.cmp(&right.0));

    let methods: Vec<Value> = entries
        .into_iter()
        .map(|(name, info)| describe_method(name, info))
        .collect();

    json!({
        "openrpc": OPENRPC_VERSION,
        "info": {
            "title": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "methods": methods,
    })
}

fn describe_method(name: String, info: &MethodInfo) -> Value {
    let params: Vec<Value> = info
        .params
        .iter()
        .map(|slot| {
            json!({
                "name": slot.name,
                "schema": slot.schema.to_json(),
                "required": true,
            })
        })
        .collect();

    let mut entry = json!({
        "name": name,
        "description": info.description,
        "params": params,
    });
    if let Some(result) = &info.result {
        entry["result"] = json!({
            "name": result.name,
            "schema": result.schema.to_json(),
        });
    }
    entry
}

pub fn discover_method(document: Value) -> IncomingMethod {
    IncomingMethod::raw(
        "Describe the methods this server accepts and the notifications it sends",
        "result",
        Schema::Object(Vec::new()),
        IncomingMethodAttributes::io_thread().undiscoverable(),
        Box::new(move |_api, _client| Ok(document.clone())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::method::{NotificationMethod, OutgoingMethodAttributes};

    #[test]
    fn lists_only_discoverable_methods_sorted() {
        static STARTED: NotificationMethod = NotificationMethod::new("notification/test/started");
        static HIDDEN: NotificationMethod = NotificationMethod::new("notification/test/hidden");

        let mut incoming = IncomingRegistry::new();
        incoming
            .register(
                Identifier::vanilla("zeta/toggle"),
                IncomingMethod::with_params(
                    "Toggle",
                    "enable",
                    "enabled",
                    IncomingMethodAttributes::main_thread(),
                    |_api, enable: bool, _client| Ok(enable),
                ),
            )
            .expect("register toggle");
        incoming
            .register(
                Identifier::vanilla("alpha/secret"),
                IncomingMethod::parameterless(
                    "Secret",
                    "value",
                    IncomingMethodAttributes::io_thread().undiscoverable(),
                    |_api, _client| Ok(true),
                ),
            )
            .expect("register secret");

        let mut outgoing = OutgoingRegistry::new();
        outgoing
            .register_notification(&STARTED, "Started", OutgoingMethodAttributes::default())
            .expect("register started");
        outgoing
            .register_notification(
                &HIDDEN,
                "Hidden",
                OutgoingMethodAttributes {
                    discoverable: false,
                },
            )
            .expect("register hidden");

        let document = discovery_document(&incoming, &outgoing);
        let names: Vec<&str> = document["methods"]
            .as_array()
            .expect("methods array")
            .iter()
            .filter_map(|method| method["name"].as_str())
            .collect();

        assert_eq!(document["openrpc"], OPENRPC_VERSION);
        assert_eq!(
            names,
            vec!["minecraft:notification/test/started", "minecraft:zeta/toggle"]
        );

        let toggle = &document["methods"][1];
        assert_eq!(toggle["params"][0]["name"], "enable");
        assert_eq!(toggle["params"][0]["schema"]["type"], "boolean");
        assert_eq!(toggle["result"]["name"], "enabled");
        assert!(document["methods"][0].get("result").is_none());
    }
}
