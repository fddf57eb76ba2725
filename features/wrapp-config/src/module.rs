use wrapp_injector::{DynamicModule, ModuleDefinition, ModuleMetadata, ProviderDeclaration, Token};

use crate::provider::ConfigProvider;

/// Makes a config registry available to every module of the application
#[derive(Default)]
pub struct ConfigModule;

impl ModuleDefinition for ConfigModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

impl ConfigModule {
    /// A global module providing and exporting the registry
    pub fn for_root(provider: ConfigProvider) -> DynamicModule {
        DynamicModule::new::<ConfigModule>()
            .provider(ProviderDeclaration::value(Token::of::<ConfigProvider>(), provider))
            .export(Token::of::<ConfigProvider>())
            .global()
    }
}
