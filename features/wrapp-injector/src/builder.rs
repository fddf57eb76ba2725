use std::{any::type_name, fmt::Debug, sync::Arc};

use tracing::{debug, info};

use crate::{
    compiler::ModuleDeclaration,
    container::ModulesContainer,
    context::ContextId,
    dependency_graph::DependencyGraph,
    errors::{InitError, RequireError},
    instance_loader::InstanceLoader,
    lazy_loader::LazyModuleLoader,
    module_ref::{downcast, register_request, resolve_in, static_instance, ModuleRef},
    scanner::DependenciesScanner,
    token::Token,
    types::{Injectable, Instance},
    wrapper::InstanceWrapper,
};

//////////////////////////////////////////////////////////////////////
///
/// An application is built in two steps.
/// 1. The ApplicationBuilder scans the root module and everything it imports
/// 2. The instance loader links and instantiates every static component

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationOptions {
    /// Only build and check the graph, nothing is instantiated
    pub preview: bool,
}

pub struct ApplicationBuilder {
    root: ModuleDeclaration,
    options: ApplicationOptions,
}

impl ApplicationBuilder {
    pub fn preview(mut self, preview: bool) -> Self {
        self.options.preview = preview;
        self
    }

    pub fn options(mut self, options: ApplicationOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn build(self) -> Result<ApplicationContext, InitError> {
        let container = ModulesContainer::new();
        let modules = DependenciesScanner::new(container.clone()).scan(&self.root)?;
        debug!("Scanned {} modules", modules.len());

        let graph = InstanceLoader::new(*container.injector(), self.options.preview)
            .create_instances_of_dependencies(&container.modules())
            .await?;
        info!("Application initialized with {} modules", modules.len());

        Ok(ApplicationContext(Arc::new(ApplicationContextInner {
            container,
            graph,
            options: self.options,
        })))
    }
}

/// A built application
#[derive(Clone)]
pub struct ApplicationContext(pub Arc<ApplicationContextInner>);
pub struct ApplicationContextInner {
    container: Arc<ModulesContainer>,
    graph: DependencyGraph,
    options: ApplicationOptions,
}

impl Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("ApplicationContext");
        for module in self.0.container.modules() {
            map.field(module.name(), &module.providers().len());
        }
        map.finish()
    }
}

impl ApplicationContext {
    pub fn builder(root: impl Into<ModuleDeclaration>) -> ApplicationBuilder {
        ApplicationBuilder {
            root: root.into(),
            options: ApplicationOptions::default(),
        }
    }

    /// Last registration in module order wins
    fn find(&self, token: &Token) -> Result<Arc<InstanceWrapper>, RequireError> {
        self.0
            .container
            .modules()
            .iter()
            .rev()
            .find_map(|module| module.find(token))
            .ok_or_else(|| RequireError::UnknownElement(token.name()))
    }

    /// Returns the static instance registered under the token in any module
    pub fn get<T: Injectable>(&self, token: impl Into<Token>) -> Result<Arc<T>, RequireError> {
        let wrapper = self.find(&token.into())?;
        downcast(static_instance(&wrapper)?)
    }

    /// Attempts to get the static instance of a class registered under its own type
    pub fn require<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        self.get::<T>(Token::of::<T>()).map_err(|error| match error {
            RequireError::UnknownElement(_) => RequireError::UnknownElement(type_name::<T>().to_string()),
            error => error,
        })
    }

    /// Resolves the instance registered under the token in a context, a fresh one if None
    pub async fn resolve<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context_id: Option<ContextId>,
    ) -> Result<Arc<T>, RequireError> {
        let wrapper = self.find(&token.into())?;
        downcast(resolve_in(&self.0.container, &wrapper, context_id).await?)
    }

    /// The reference of the module compiled from the declaration
    pub fn select(&self, module: impl Into<ModuleDeclaration>) -> Result<ModuleRef, RequireError> {
        let declaration = module.into();
        let module = self
            .0
            .container
            .compiler()
            .compile(&declaration, &[])
            .and_then(|compiled| self.0.container.get(&compiled.token))
            .ok_or_else(|| {
                RequireError::UnknownElement(
                    declaration
                        .module_type()
                        .map(|module| module.name().to_string())
                        .unwrap_or_default(),
                )
            })?;
        Ok(ModuleRef::new(self.0.container.weak(), Arc::downgrade(&module)))
    }

    pub fn lazy_loader(&self) -> LazyModuleLoader {
        LazyModuleLoader::new(self.0.container.weak())
    }

    /// Registers the request payload injected under [crate::REQUEST] in the context
    pub fn register_request_by_context_id<R: Injectable>(
        &self,
        request: R,
        context_id: &ContextId,
    ) -> Result<(), RequireError> {
        register_request(&self.0.container, Instance::new(request), context_id)
    }

    /// Drops every instance cached for a finished request context
    pub fn release_context(&self, context_id: &ContextId) {
        self.0.container.release_context(context_id);
    }

    /// The dependency graph of the modules present at bootstrap
    pub fn graph(&self) -> &DependencyGraph {
        &self.0.graph
    }

    pub fn container(&self) -> &Arc<ModulesContainer> {
        &self.0.container
    }

    pub fn options(&self) -> ApplicationOptions {
        self.0.options
    }
}
