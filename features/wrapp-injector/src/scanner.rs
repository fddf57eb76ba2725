//! Turns module declarations into the module graph
//!
//! Scanning runs in two passes: every reachable module is compiled and inserted
//! first, then imports, providers, controllers, enhancers and exports are wired.

use std::{
    collections::HashSet,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{
    compiler::{ModuleDeclaration, ModuleToken},
    container::ModulesContainer,
    core_module::core_module_declaration,
    errors::ScanError,
    module::{Module, ModuleId},
    provider::{EnhancerDeclaration, EnhancerSubtype, Provider, Scope},
    types::TypeInfo,
    wrapper::InstanceWrapper,
};

pub(crate) struct DependenciesScanner {
    container: Arc<ModulesContainer>,
}

impl DependenciesScanner {
    pub(crate) fn new(container: Arc<ModulesContainer>) -> Self {
        DependenciesScanner { container }
    }

    /// Scans the whole application below the root module
    pub(crate) fn scan(&self, root: &ModuleDeclaration) -> Result<Vec<Arc<Module>>, ScanError> {
        let mut modules = self.register_core_module()?;
        let scanned = self.scan_for_modules(root)?;
        let root_module = scanned.first().cloned();
        modules.extend(scanned);

        self.scan_modules_for_dependencies(&modules)?;
        if let Some(root_module) = root_module {
            self.calculate_modules_distance(&root_module);
        }
        self.add_scoped_enhancers_metadata(&modules);
        self.container.bind_global_scope();
        Ok(modules)
    }

    fn register_core_module(&self) -> Result<Vec<Arc<Module>>, ScanError> {
        if let Some(core) = self.container.core_module() {
            trace!("Core module {} is already registered", core.token());
            return Ok(Vec::new());
        }

        let declaration = core_module_declaration(self.container.weak());
        let modules = self.scan_for_modules(&declaration)?;
        if let Some(core) = modules.first() {
            self.container.set_core(core.clone());
        }
        Ok(modules)
    }

    /// Inserts every module reachable from the declaration
    ///
    /// Returns the newly inserted modules in insertion order, modules already in
    /// the container are neither returned nor traversed again.
    pub(crate) fn scan_for_modules(
        &self,
        declaration: &ModuleDeclaration,
    ) -> Result<Vec<Arc<Module>>, ScanError> {
        let mut inserted = Vec::new();
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.scan_module(declaration, &[], 0, &mut chain, &mut visited, &mut inserted)?;
        Ok(inserted)
    }

    fn scan_module(
        &self,
        declaration: &ModuleDeclaration,
        scope: &[TypeInfo],
        index: usize,
        chain: &mut Vec<String>,
        visited: &mut HashSet<ModuleToken>,
        inserted: &mut Vec<Arc<Module>>,
    ) -> Result<(), ScanError> {
        let compiled = self
            .container
            .compiler()
            .compile(declaration, scope)
            .ok_or_else(|| ScanError::InvalidModule {
                index,
                chain: chain.clone(),
            })?;
        if !visited.insert(compiled.token.clone()) {
            return Ok(());
        }

        let (module, is_new) = self.container.add_module(compiled, scope);
        if !is_new {
            return Ok(());
        }
        inserted.push(module.clone());

        let metadata = self
            .container
            .metadata(module.token())
            .ok_or_else(|| ScanError::UnknownModule(module.name().to_string()))?;

        chain.push(module.name().to_string());
        let import_scope = module.import_scope();
        for (index, import) in metadata.imports.iter().enumerate() {
            self.scan_module(import, &import_scope, index, chain, visited, inserted)?;
        }
        chain.pop();
        Ok(())
    }

    /// Wires imports, providers, controllers, enhancers and exports of the modules
    pub(crate) fn scan_modules_for_dependencies(&self, modules: &[Arc<Module>]) -> Result<(), ScanError> {
        for module in modules {
            let metadata = self
                .container
                .metadata(module.token())
                .ok_or_else(|| ScanError::UnknownModule(module.name().to_string()))?;
            debug!("Scanning dependencies of {}", module.name());

            self.reflect_imports(module, &metadata.imports)?;

            for declaration in &metadata.providers {
                if let Some(subtype) = EnhancerSubtype::from_global_token(&declaration.provide) {
                    let enhancer = module.add_global_enhancer(declaration, subtype)?;
                    self.container.add_global_enhancer(&enhancer);
                    continue;
                }
                let wrapper = module.add_provider(declaration)?;
                if let Provider::Class(class) = &declaration.provider {
                    self.reflect_enhancers(module, &wrapper, class.enhancers())?;
                }
            }

            for controller in &metadata.controllers {
                let wrapper = module.add_controller(controller)?;
                self.reflect_enhancers(module, &wrapper, controller.enhancers())?;
            }

            for export in &metadata.exports {
                let token = export.token().ok_or_else(|| ScanError::CircularImport {
                    context: module.name().to_string(),
                })?;
                module.add_export(token)?;
            }
        }
        Ok(())
    }

    fn reflect_imports(&self, module: &Arc<Module>, imports: &[ModuleDeclaration]) -> Result<(), ScanError> {
        let scope = module.import_scope();
        for import in imports {
            let related = self
                .container
                .compiler()
                .compile(import, &scope)
                .and_then(|compiled| self.container.get(&compiled.token))
                .ok_or_else(|| ScanError::CircularImport {
                    context: module.name().to_string(),
                })?;
            module.add_import(&related);
        }
        Ok(())
    }

    fn reflect_enhancers(
        &self,
        module: &Module,
        wrapper: &Arc<InstanceWrapper>,
        enhancers: Vec<EnhancerDeclaration>,
    ) -> Result<(), ScanError> {
        for enhancer in enhancers {
            module.add_injectable(&enhancer.class, enhancer.subtype, Some(wrapper))?;
        }
        Ok(())
    }

    /// Longest import path from the root to every module, the core module always comes last
    fn calculate_modules_distance(&self, root: &Arc<Module>) {
        let mut stack = vec![root.id()];
        Self::calculate_distance(root, 1, &mut stack);

        if let Some(core) = self.container.core_module() {
            core.set_distance(usize::MAX);
        }
    }

    fn calculate_distance(module: &Arc<Module>, distance: usize, stack: &mut Vec<ModuleId>) {
        for import in module.imports() {
            // Back edge of a cyclic import
            if stack.contains(&import.id()) {
                continue;
            }
            if distance <= import.distance() {
                continue;
            }
            import.set_distance(distance);
            stack.push(import.id());
            Self::calculate_distance(&import, distance + 1, stack);
            stack.pop();
        }
    }

    /// Request scoped or transient global enhancers make every controller non static
    pub(crate) fn add_scoped_enhancers_metadata(&self, modules: &[Arc<Module>]) {
        let scoped = self
            .container
            .global_enhancers()
            .into_iter()
            .filter(|enhancer| enhancer.scope != Scope::Singleton)
            .collect::<Vec<_>>();
        if scoped.is_empty() {
            return;
        }

        for controller in modules.iter().flat_map(|module| module.controllers()) {
            for enhancer in &scoped {
                controller.add_enhancer(enhancer);
            }
        }
    }
}
