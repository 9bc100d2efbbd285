//! Process-wide method catalogs.
//!
//! Both registries are filled once while the process boots, frozen into a
//! [`Registries`] value and installed globally before the first connection is
//! accepted. After that they are only read, so lookups take no lock.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, OnceLock},
};

use crate::errors::RegistryError;
use crate::rpc::discovery;
use crate::rpc::identifier::Identifier;
use crate::rpc::method::{
    IncomingMethod, NotificationMethod, OutgoingMethod, OutgoingMethodAttributes, RequestMethod,
};
use crate::rpc::schema::DescribeSchema;

static INSTALLED: OnceLock<Arc<Registries>> = OnceLock::new();

#[derive(Debug)]
pub struct MethodRegistry<M> {
    methods: HashMap<Identifier, Arc<M>>,
}

impl<M> Default for MethodRegistry<M> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<M> MethodRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: Identifier, method: M) -> Result<(), RegistryError> {
        match self.methods.entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(method));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, id: &Identifier) -> Option<&Arc<M>> {
        self.methods.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Arc<M>)> {
        self.methods.iter()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

pub type IncomingRegistry = MethodRegistry<IncomingMethod>;
pub type OutgoingRegistry = MethodRegistry<OutgoingMethod>;

impl OutgoingRegistry {
    pub fn register_notification<P: DescribeSchema>(
        &mut self,
        method: &NotificationMethod<P>,
        description: &'static str,
        attributes: OutgoingMethodAttributes,
    ) -> Result<(), RegistryError> {
        self.register(
            method.id().clone(),
            method.describe(description, attributes),
        )
    }

    pub fn register_request<P: DescribeSchema, R: DescribeSchema>(
        &mut self,
        method: &RequestMethod<P, R>,
        description: &'static str,
        attributes: OutgoingMethodAttributes,
    ) -> Result<(), RegistryError> {
        self.register(
            method.id().clone(),
            method.describe(description, attributes),
        )
    }
}

/// Mutable registries while the process boots.
#[derive(Debug, Default)]
pub struct RegistriesBuilder {
    pub incoming: IncomingRegistry,
    pub outgoing: OutgoingRegistry,
}

impl RegistriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes the catalogs and adds `rpc.discover`, whose document is
    /// computed here since nothing can be registered afterwards.
    pub fn build(mut self) -> Result<Registries, RegistryError> {
        let document = discovery::discovery_document(&self.incoming, &self.outgoing);
        self.incoming
            .register(discovery::DISCOVER.clone(), discovery::discover_method(document))?;

        Ok(Registries {
            incoming: self.incoming,
            outgoing: self.outgoing,
        })
    }
}

/// Frozen registries shared by every connection.
#[derive(Debug)]
pub struct Registries {
    incoming: IncomingRegistry,
    outgoing: OutgoingRegistry,
}

impl Registries {
    pub fn incoming(&self) -> &IncomingRegistry {
        &self.incoming
    }

    pub fn outgoing(&self) -> &OutgoingRegistry {
        &self.outgoing
    }

    /// Publishes these registries process-wide. Fails if already installed.
    pub fn install(self) -> Result<Arc<Registries>, RegistryError> {
        let registries = Arc::new(self);
        INSTALLED
            .set(Arc::clone(&registries))
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        Ok(registries)
    }

    pub fn installed() -> Option<Arc<Registries>> {
        INSTALLED.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::InMemoryServer;
    use crate::rpc::connection::RpcContext;
    use crate::rpc::executor::MainThread;
    use crate::rpc::method::IncomingMethodAttributes;

    fn constant() -> IncomingMethod {
        IncomingMethod::parameterless(
            "Constant flag",
            "value",
            IncomingMethodAttributes::io_thread(),
            |_api, _client| Ok(true),
        )
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = IncomingRegistry::new();
        let id = Identifier::vanilla("test/constant");

        registry
            .register(id.clone(), constant())
            .expect("first registration");
        let err = registry
            .register(id.clone(), constant())
            .expect_err("second registration must fail");

        assert_eq!(err, RegistryError::Duplicate(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_of_unknown_identifier_is_none() {
        let registry = IncomingRegistry::new();
        assert!(registry.lookup(&Identifier::vanilla("missing")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_notification_fails() {
        static PING: NotificationMethod = NotificationMethod::new("notification/test/ping");
        let mut registry = OutgoingRegistry::new();
        let attributes = OutgoingMethodAttributes::default();

        registry
            .register_notification(&PING, "Ping", attributes)
            .expect("first registration");
        assert!(matches!(
            registry.register_notification(&PING, "Ping", attributes),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn build_adds_discovery_method() {
        let registries = RegistriesBuilder::new().build().expect("build registries");
        let discover = registries
            .incoming()
            .lookup(&discovery::DISCOVER)
            .expect("rpc.discover registered");

        assert!(!discover.attributes().discoverable);
        assert!(!discover.attributes().run_on_main_thread);
    }

    // The only test that touches the process-wide slot.
    #[test]
    fn install_happens_once() {
        let installed = RegistriesBuilder::new()
            .build()
            .expect("build registries")
            .install()
            .expect("first install");
        let again = RegistriesBuilder::new()
            .build()
            .expect("build registries")
            .install();

        assert!(matches!(again, Err(RegistryError::AlreadyInstalled)));
        let current = Registries::installed().expect("installed registries");
        assert!(Arc::ptr_eq(&installed, &current));

        let main = MainThread::spawn().expect("spawn main thread");
        let context = RpcContext::installed(Arc::new(InMemoryServer::new()), main.handle())
            .expect("context from installed registries");
        assert!(Arc::ptr_eq(&installed, &context.registries));
    }

    #[test]
    fn building_with_a_custom_discover_method_fails() {
        let mut builder = RegistriesBuilder::new();
        builder
            .incoming
            .register(discovery::DISCOVER.clone(), constant())
            .expect("register");

        assert!(matches!(
            builder.build(),
            Err(RegistryError::Duplicate(_))
        ));
    }
}
