//! Wrapp Config provides a global registry of configs that can be injected in the rest of the
//! modules.
//!
//! Wrapp Config is split into three major parts:
//! 1. ConfigProvider: Used to create the registry of all configs
//! 2. ConfigModule: Exposes the registry to every module of an application
//! 3. Config<T>: A wrapper type to be able to resolve and retrieve configs
//!
//! # Examples
//!
//! ```rust
//! use wrapp_config::{ConfigModule, ConfigProvider};
//! use wrapp_injector::{ModuleDeclaration, ModuleDefinition, ModuleMetadata};
//!
//! #[derive(Clone)]
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! #[derive(Default)]
//! struct AppModule;
//! impl ModuleDefinition for AppModule {
//!     fn metadata() -> ModuleMetadata {
//!         let mut config_provider = ConfigProvider::new();
//!         config_provider
//!             .add_config(AppConfig {
//!                 host: "localhost".to_string(),
//!                 port: 8080_u16,
//!             })
//!             .expect("registered once");
//!
//!         ModuleMetadata::new().import(ConfigModule::for_root(config_provider))
//!     }
//! }
//!
//! let root = ModuleDeclaration::of::<AppModule>();
//! # let _ = root;
//! ```

mod config;
mod errors;
mod module;
mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use module::ConfigModule;
pub use provider::ConfigProvider;
