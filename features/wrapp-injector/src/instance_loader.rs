use std::sync::Arc;

use futures::{stream::FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::{
    context::ContextId,
    dependency_graph::DependencyGraph,
    errors::ResolveError,
    injector::Injector,
    module::Module,
    wrapper::InstanceWrapper,
};

/// Instantiates the static components of a set of modules
pub(crate) struct InstanceLoader {
    injector: Injector,
    preview: bool,
}

impl InstanceLoader {
    pub(crate) fn new(injector: Injector, preview: bool) -> Self {
        InstanceLoader { injector, preview }
    }

    /// Links every component, checks the graph and resolves all static instances
    ///
    /// In preview mode only the graph is built and checked.
    pub(crate) async fn create_instances_of_dependencies(
        &self,
        modules: &[Arc<Module>],
    ) -> Result<DependencyGraph, ResolveError> {
        self.create_prototypes(modules);

        for module in modules {
            for wrapper in module.wrappers() {
                self.injector.link(&wrapper)?;
            }
        }
        let graph = DependencyGraph::new(modules);
        graph.check()?;
        debug!("Dependency graph with {} components is valid", graph.len());

        if self.preview {
            info!("Preview mode, skipping instantiation of {} modules", modules.len());
            return Ok(graph);
        }

        // Modules run concurrently, the groups of one module in sequence
        let mut loads = modules
            .iter()
            .map(|module| self.create_instances(module))
            .collect::<FuturesUnordered<_>>();
        while let Some(result) = loads.next().await {
            result?;
        }
        Ok(graph)
    }

    fn create_prototypes(&self, modules: &[Arc<Module>]) {
        let static_context = ContextId::static_context();
        for wrapper in modules.iter().flat_map(|module| module.wrappers()) {
            if wrapper.is_newable() && !wrapper.is_transient() {
                wrapper.host_for(&static_context, None);
            }
        }
    }

    /// Providers first, then injectables, then controllers
    async fn create_instances(&self, module: &Module) -> Result<(), ResolveError> {
        for wrappers in [module.providers(), module.injectables(), module.controllers()] {
            self.load_all(wrappers).await?;
        }
        info!("{} dependencies initialized", module.name());
        Ok(())
    }

    async fn load_all(&self, wrappers: Vec<Arc<InstanceWrapper>>) -> Result<(), ResolveError> {
        let static_context = ContextId::static_context();
        let mut loads = wrappers
            .iter()
            .map(|wrapper| self.injector.load_instance(wrapper, &static_context, None))
            .collect::<FuturesUnordered<_>>();

        while let Some(result) = loads.next().await {
            result?;
        }
        Ok(())
    }
}
