//! Plugin-based provider registry
//!
//! The registry allows remote DNS clients to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnsync_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! dnsync_provider_cloudflare::register(&registry);
//!
//! let remote = registry.create_remote("cloudflare", &credentials, &client_config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations should register themselves during initialization:
//!
//! ```rust,ignore
//! // In dnsync-provider-cloudflare crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::{ClientConfig, Credentials};
use crate::error::{Error, Result};
use crate::traits::{RemoteDns, RemoteDnsFactory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Provider registry for plugin-based remote client creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered remote DNS factories
    providers: RwLock<HashMap<String, Box<dyn RemoteDnsFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote DNS factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare")
    /// - `factory`: Factory object for creating client instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn RemoteDnsFactory>) {
        let name = name.into();
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(name, factory);
    }

    /// Create a remote client for one environment's credentials
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn RemoteDns>)`: Created client
    /// - `Err(Error::Config)`: If the provider is not registered or the
    ///   credentials are incomplete
    pub fn create_remote(
        &self,
        provider: &str,
        credentials: &Credentials,
        config: &ClientConfig,
    ) -> Result<Box<dyn RemoteDns>> {
        credentials.validate()?;
        config.validate()?;

        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let factory = providers
            .get(provider)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider)))?;

        factory.create(credentials, config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.contains_key(name)
    }
}
