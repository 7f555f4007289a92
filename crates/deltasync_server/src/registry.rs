//! Entity registry: the set of syncable entities and their adapters.

use crate::adapter::{adapter_for, SyncAdapter};
use crate::clock::Clock;
use crate::descriptor::EntityDescriptor;
use crate::error::{ServerError, ServerResult};
use deltasync_store::Database;
use std::collections::HashMap;
use std::sync::Arc;

/// Registered sync adapters, indexed by server and mobile table name.
///
/// Registration order is preserved; pulls and logs follow it.
#[derive(Default)]
pub struct EntityRegistry {
    adapters: Vec<Arc<dyn SyncAdapter>>,
    by_server: HashMap<&'static str, usize>,
    by_mobile: HashMap<&'static str, usize>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with one adapter per descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Configuration`] on duplicate table names.
    pub fn from_descriptors(
        descriptors: &[EntityDescriptor],
        database: &Arc<Database>,
        clock: &Arc<dyn Clock>,
    ) -> ServerResult<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(adapter_for(
                *descriptor,
                Arc::clone(database),
                Arc::clone(clock),
            ))?;
        }
        Ok(registry)
    }

    /// Registers an adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Configuration`] if either of the adapter's
    /// table names is already registered.
    pub fn register(&mut self, adapter: Arc<dyn SyncAdapter>) -> ServerResult<()> {
        let descriptor = *adapter.descriptor();
        if self.by_server.contains_key(descriptor.server_table) {
            return Err(ServerError::Configuration(format!(
                "server table {} registered twice",
                descriptor.server_table
            )));
        }
        if self.by_mobile.contains_key(descriptor.mobile_table) {
            return Err(ServerError::Configuration(format!(
                "mobile table {} registered twice",
                descriptor.mobile_table
            )));
        }

        let index = self.adapters.len();
        self.adapters.push(adapter);
        self.by_server.insert(descriptor.server_table, index);
        self.by_mobile.insert(descriptor.mobile_table, index);
        Ok(())
    }

    /// Looks up an adapter by server table name.
    pub fn by_server_table(&self, name: &str) -> Option<&Arc<dyn SyncAdapter>> {
        self.by_server.get(name).map(|&i| &self.adapters[i])
    }

    /// Looks up an adapter by mobile table name.
    pub fn by_mobile_table(&self, name: &str) -> Option<&Arc<dyn SyncAdapter>> {
        self.by_mobile.get(name).map(|&i| &self.adapters[i])
    }

    /// Adapters whose entities are sent to clients on pull.
    pub fn pushable(&self) -> impl Iterator<Item = &Arc<dyn SyncAdapter>> {
        self.adapters
            .iter()
            .filter(|adapter| adapter.descriptor().push_to_client)
    }

    /// Resolves the adapter that applies a pushed mobile table.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownTable`] if the name is not registered
    /// and [`ServerError::NotAccepted`] if the entity is push-only.
    pub fn resolve_for_push(&self, mobile_table: &str) -> ServerResult<&Arc<dyn SyncAdapter>> {
        let adapter = self
            .by_mobile_table(mobile_table)
            .ok_or_else(|| ServerError::UnknownTable(mobile_table.to_string()))?;
        if !adapter.descriptor().pull_from_client {
            return Err(ServerError::NotAccepted(mobile_table.to_string()));
        }
        Ok(adapter)
    }

    /// Descriptors of all registered entities, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.adapters.iter().map(|adapter| adapter.descriptor())
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.descriptors().map(|d| d.server_table))
            .finish()
    }
}
