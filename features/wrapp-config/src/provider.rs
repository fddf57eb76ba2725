use std::{
    any::{type_name, Any, TypeId},
    collections::BTreeMap,
    fmt::Debug,
    sync::Arc,
};

use tracing::debug;

use crate::errors::ConfigError;

struct ConfigEntry {
    type_name: &'static str,
    config: Arc<dyn Any + Send + Sync + 'static>,
}

/// A provider to register all configs.
///
/// Configs can be registered and retrieved based on type.
#[derive(Default)]
pub struct ConfigProvider {
    configs: BTreeMap<TypeId, ConfigEntry>,
}

impl Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self
            .configs
            .values()
            .map(|entry| entry.type_name)
            .collect::<Vec<_>>();
        names.sort_unstable();
        f.debug_struct("ConfigProvider").field("configs", &names).finish()
    }
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type.
    ///
    /// Returns `Ok(None)` if the config type is not registered
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ConfigError> {
        self.configs
            .get(&TypeId::of::<T>())
            .map(|entry| entry.config.clone().downcast())
            .transpose()
            .map_err(|_| ConfigError::ConfigMissing(type_name::<T>()))
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return a
    /// [`ConfigError`] runtime error
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, ConfigError> {
        let type_id = TypeId::of::<T>();

        if self.configs.contains_key(&type_id) {
            return Err(ConfigError::ConfigAlreadyRegistered(type_name::<T>()));
        }

        debug!("Registered config {}", type_name::<T>());
        self.configs.insert(
            type_id,
            ConfigEntry {
                type_name: type_name::<T>(),
                config: Arc::new(config),
            },
        );
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct AppConfig {
        host: String,
        port: u16,
    }

    #[test]
    fn configs_are_retrieved_by_type() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(AppConfig {
                host: "localhost".to_string(),
                port: 8080,
            })
            .unwrap()
            .maybe_add_config::<u32>(None)
            .unwrap();

        let config = provider.get_config::<AppConfig>().unwrap().unwrap();
        assert_eq!(config.port, 8080);
        assert!(provider.get_config::<u32>().unwrap().is_none());
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn configs_are_registered_once() {
        let mut provider = ConfigProvider::new();
        provider.add_config(1_u8).unwrap();
        assert!(matches!(
            provider.add_config(2_u8),
            Err(ConfigError::ConfigAlreadyRegistered("u8"))
        ));
    }
}
