use std::{
    fmt::Debug,
    future::Future,
    sync::{Arc, Weak},
};

use tracing::{debug, info};

use crate::{
    compiler::ModuleDeclaration,
    container::ModulesContainer,
    errors::{InitError, ScanError},
    instance_loader::InstanceLoader,
    module_ref::ModuleRef,
    scanner::DependenciesScanner,
};

/// Loads modules into a running application
///
/// Injectable through `Token::of::<LazyModuleLoader>()`.
#[derive(Clone)]
pub struct LazyModuleLoader {
    container: Weak<ModulesContainer>,
}

impl Debug for LazyModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LazyModuleLoader")
    }
}

impl LazyModuleLoader {
    pub(crate) fn new(container: Weak<ModulesContainer>) -> Self {
        LazyModuleLoader { container }
    }

    /// Scans and instantiates the module returned by the loader
    ///
    /// Only modules which are not part of the application yet are scanned and
    /// instantiated, loading the same module twice returns a reference to the
    /// existing one.
    pub async fn load<F, Fut>(&self, loader: F) -> Result<ModuleRef, InitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ModuleDeclaration>,
    {
        let container = self.container.upgrade().ok_or(InitError::ContainerDropped)?;
        let declaration = loader().await;

        let scanner = DependenciesScanner::new(container.clone());
        let modules = scanner.scan_for_modules(&declaration)?;

        let Some(root) = modules.first().cloned() else {
            let compiled = container
                .compiler()
                .compile(&declaration, &[])
                .ok_or_else(|| ScanError::InvalidModule {
                    index: 0,
                    chain: Vec::new(),
                })?;
            let module = container
                .get(&compiled.token)
                .ok_or_else(|| ScanError::UnknownModule(compiled.module_type.name().to_string()))?;
            debug!("{} is already loaded", module.name());
            return Ok(ModuleRef::new(self.container.clone(), Arc::downgrade(&module)));
        };

        scanner.scan_modules_for_dependencies(&modules)?;
        scanner.add_scoped_enhancers_metadata(&modules);
        for module in &modules {
            container.bind_globals_to_imports(module);
        }

        InstanceLoader::new(*container.injector(), false)
            .create_instances_of_dependencies(&modules)
            .await?;
        info!("Lazily loaded {} with {} modules", root.name(), modules.len());

        Ok(ModuleRef::new(self.container.clone(), Arc::downgrade(&root)))
    }
}
