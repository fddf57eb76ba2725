use std::{
    any::type_name,
    fmt::Debug,
    sync::{Arc, Weak},
};

use tracing::trace;

use crate::{
    container::ModulesContainer,
    context::ContextId,
    core_module::REQUEST,
    errors::RequireError,
    injector::Injector,
    module::Module,
    provider::{ClassDescriptor, Provide, Scope, ScopeOptions},
    token::Token,
    types::{Injectable, Instance},
    wrapper::InstanceWrapper,
};

/// Access to the components visible from one module
///
/// Every module provides its own reference under `Token::of::<ModuleRef>()`.
#[derive(Clone)]
pub struct ModuleRef {
    container: Weak<ModulesContainer>,
    module: Weak<Module>,
}

impl Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModuleRef")
            .field(&self.module.upgrade().map(|module| module.name()))
            .finish()
    }
}

impl ModuleRef {
    pub(crate) fn new(container: Weak<ModulesContainer>, module: Weak<Module>) -> Self {
        ModuleRef { container, module }
    }

    fn container(&self) -> Result<Arc<ModulesContainer>, RequireError> {
        self.container.upgrade().ok_or(RequireError::ContainerDropped)
    }

    pub fn module(&self) -> Result<Arc<Module>, RequireError> {
        self.module.upgrade().ok_or(RequireError::ContainerDropped)
    }

    /// Own components first, then the exports of imported modules
    fn find(&self, token: &Token) -> Result<Arc<InstanceWrapper>, RequireError> {
        let container = self.container()?;
        let module = self.module()?;
        module
            .find(token)
            .or_else(|| container.injector().lookup_component(&module, token))
            .ok_or_else(|| RequireError::UnknownElement(token.name()))
    }

    /// Returns the static instance of a token visible from this module
    pub fn get<T: Injectable>(&self, token: impl Into<Token>) -> Result<Arc<T>, RequireError> {
        let wrapper = self.find(&token.into())?;
        downcast(static_instance(&wrapper)?)
    }

    /// Resolves the instance of a token in a context
    ///
    /// Uses a fresh context if none is given, static components are returned as is.
    pub async fn resolve<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context_id: Option<ContextId>,
    ) -> Result<Arc<T>, RequireError> {
        let container = self.container()?;
        let wrapper = self.find(&token.into())?;
        downcast(resolve_in(&container, &wrapper, context_id).await?)
    }

    /// Instantiates a class which is not registered, its dependencies are resolved from this module
    ///
    /// Every call creates a new instance.
    pub async fn create<T: Provide>(&self) -> Result<Arc<T>, RequireError> {
        let container = self.container()?;
        let module = self.module()?;
        let injector = container.injector();

        let mut wrapper = InstanceWrapper::from_class(Token::of::<T>(), &ClassDescriptor::of::<T>(), None, &module).detach();
        if wrapper.scope == Scope::Transient {
            wrapper.scope = Scope::Singleton;
        }
        let wrapper = Arc::new(wrapper);
        injector.link(&wrapper)?;

        let context_id = match wrapper.is_dependency_tree_static() {
            true => ContextId::static_context(),
            false => ContextId::new(),
        };
        trace!("Creating {} in context {}", wrapper.name(), context_id.id());
        let instance = injector.load_instance(&wrapper, &context_id, None).await;
        container.release_context(&context_id);
        let instance =
            instance?.ok_or_else(|| RequireError::UnknownElement(wrapper.name().to_string()))?;
        downcast(instance)
    }

    /// Scope of the component visible under the token
    pub fn introspect(&self, token: impl Into<Token>) -> Result<ScopeOptions, RequireError> {
        Ok(self.find(&token.into())?.scope())
    }

    /// Registers the request payload injected under [REQUEST] in the context
    pub fn register_request_by_context_id<R: Injectable>(
        &self,
        request: R,
        context_id: &ContextId,
    ) -> Result<(), RequireError> {
        let container = self.container()?;
        register_request(&container, Instance::new(request), context_id)
    }
}

pub(crate) fn downcast<T: Injectable>(instance: Instance) -> Result<Arc<T>, RequireError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| RequireError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

/// The instance of a static singleton, request scoped and transient components have none
pub(crate) fn static_instance(wrapper: &InstanceWrapper) -> Result<Instance, RequireError> {
    if wrapper.is_transient() || !wrapper.is_dependency_tree_static() {
        return Err(RequireError::InvalidScope(wrapper.name().to_string()));
    }
    wrapper
        .existing_host(&ContextId::static_context())
        .and_then(|host| host.instance())
        .ok_or_else(|| RequireError::NotResolved(wrapper.name().to_string()))
}

async fn resolve_instance(
    injector: &Injector,
    wrapper: &Arc<InstanceWrapper>,
    context_id: &ContextId,
) -> Result<Instance, RequireError> {
    if !wrapper.is_transient() && wrapper.is_dependency_tree_static() {
        if let Ok(instance) = static_instance(wrapper) {
            return Ok(instance);
        }
    }
    injector
        .load_instance(wrapper, context_id, Some(wrapper))
        .await?
        .ok_or_else(|| RequireError::UnknownElement(wrapper.name().to_string()))
}

/// Resolves in the given context, or in a fresh one which is released afterwards
pub(crate) async fn resolve_in(
    container: &ModulesContainer,
    wrapper: &Arc<InstanceWrapper>,
    context_id: Option<ContextId>,
) -> Result<Instance, RequireError> {
    match context_id {
        Some(context_id) => resolve_instance(container.injector(), wrapper, &context_id).await,
        None => {
            let context_id = ContextId::new();
            let instance = resolve_instance(container.injector(), wrapper, &context_id).await;
            container.release_context(&context_id);
            instance
        }
    }
}

pub(crate) fn register_request(
    container: &ModulesContainer,
    request: Instance,
    context_id: &ContextId,
) -> Result<(), RequireError> {
    let token = Token::named(REQUEST);
    let wrapper = container
        .core_module()
        .and_then(|core| core.provider(&token))
        .ok_or_else(|| RequireError::UnknownElement(token.name()))?;

    let injector = container.injector();
    injector.link(&wrapper)?;
    let context_id = injector.effective_context(&wrapper, context_id);
    trace!("Registering request payload in context {}", context_id.id());
    wrapper.host_for(&context_id, None).set(request);
    Ok(())
}
