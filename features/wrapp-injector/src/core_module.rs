use std::sync::Weak;

use thiserror::Error;

use crate::{
    compiler::{DynamicModule, ModuleDeclaration, ModuleDefinition, ModuleMetadata},
    container::ModulesContainer,
    lazy_loader::LazyModuleLoader,
    provider::{ProviderDeclaration, Scope},
    resolver::Args,
    token::Token,
};

/// Token of the request payload registered for a context
pub const REQUEST: &str = "REQUEST";

#[derive(Error, Debug)]
#[error("No request payload was registered for the current context, use `register_request_by_context_id`")]
pub struct RequestNotRegistered;

/// Global module holding the engine's own components
#[derive(Default)]
pub struct InternalCoreModule;

impl ModuleDefinition for InternalCoreModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }

    fn global() -> bool {
        true
    }
}

pub(crate) fn core_module_declaration(container: Weak<ModulesContainer>) -> ModuleDeclaration {
    let request = ProviderDeclaration::factory(REQUEST, Vec::new(), |_: Args| async {
        Err::<(), _>(RequestNotRegistered)
    })
    .scope(Scope::Request);

    DynamicModule::new::<InternalCoreModule>()
        .provider(ProviderDeclaration::value(
            Token::of::<LazyModuleLoader>(),
            LazyModuleLoader::new(container),
        ))
        .provider(request)
        .export(Token::of::<LazyModuleLoader>())
        .export(REQUEST)
        .into()
}
