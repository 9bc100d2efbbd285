//! Game administration exposed over the management protocol
//!
//! Holds the payload types, the handlers clients may call, and the
//! notifications the server pushes when game state changes.

pub mod api;
pub mod memory;
pub mod methods;
pub mod notifications;
pub mod types;
pub mod utils;

use crate::errors::RegistryError;
use crate::rpc::registry::{Registries, RegistriesBuilder};

/// Builds the full management catalog, `rpc.discover` included.
pub fn build_registries() -> Result<Registries, RegistryError> {
    let mut builder = RegistriesBuilder::new();
    methods::register(&mut builder.incoming)?;
    notifications::register(&mut builder.outgoing)?;
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::discovery::DISCOVER;
    use crate::rpc::identifier::Identifier;

    #[test]
    fn catalog_contains_management_surface() {
        let registries = build_registries().expect("registries");

        assert!(registries.incoming().lookup(&DISCOVER).is_some());
        assert!(registries
            .incoming()
            .lookup(&Identifier::vanilla("allowlist/set"))
            .is_some());
        assert_eq!(registries.outgoing().len(), 15);
    }

    #[test]
    fn discovery_lists_methods_and_notifications() {
        let registries = build_registries().expect("registries");
        let discover = registries.incoming().lookup(&DISCOVER).expect("rpc.discover");
        let api = crate::domain::memory::InMemoryServer::new();

        let document = discover
            .invoke(&api, None, &crate::rpc::method::ClientInfo { connection_id: 1 })
            .expect("discovery document");

        assert_eq!(document["openrpc"], "1.3.2");
        let methods = document["methods"].as_array().expect("methods");
        assert_eq!(methods.len(), 34 + 15);
        let names: Vec<&str> = methods
            .iter()
            .filter_map(|method| method["name"].as_str())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"minecraft:notification/players/joined"));
        assert!(!names.contains(&"minecraft:rpc.discover"));
    }
}
