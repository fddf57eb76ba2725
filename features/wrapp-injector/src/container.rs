use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

use tracing::{debug, trace};

use crate::{
    compiler::{CompiledModule, ModuleCompiler, ModuleMetadata, ModuleToken},
    context::ContextId,
    injector::Injector,
    module::{Module, ModuleId},
    types::TypeInfo,
    wrapper::InstanceWrapper,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The module graph of one application
pub struct ModulesContainer {
    this: Weak<ModulesContainer>,
    compiler: ModuleCompiler,
    injector: Injector,
    /// Modules in insertion order
    modules: RwLock<Vec<Arc<Module>>>,
    by_token: RwLock<HashMap<ModuleToken, Arc<Module>>>,
    /// Static and dynamic metadata of each module, computed once at insertion
    metadata: RwLock<HashMap<ModuleToken, ModuleMetadata>>,
    globals: RwLock<Vec<Weak<Module>>>,
    /// Wrappers registered under one of the APP_* enhancer tokens
    global_enhancers: RwLock<Vec<Weak<InstanceWrapper>>>,
    core: OnceLock<Arc<Module>>,
}

impl Debug for ModulesContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for module in read(&self.modules).iter() {
            list.entry(module);
        }
        list.finish()
    }
}

impl ModulesContainer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| ModulesContainer {
            this: this.clone(),
            compiler: ModuleCompiler::new(),
            injector: Injector::new(),
            modules: RwLock::new(Vec::new()),
            by_token: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            globals: RwLock::new(Vec::new()),
            global_enhancers: RwLock::new(Vec::new()),
            core: OnceLock::new(),
        })
    }

    pub fn compiler(&self) -> &ModuleCompiler {
        &self.compiler
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub(crate) fn weak(&self) -> Weak<ModulesContainer> {
        self.this.clone()
    }

    /// Inserts a compiled module, returns false if a module with its token already exists
    pub(crate) fn add_module(&self, compiled: CompiledModule, scope: &[TypeInfo]) -> (Arc<Module>, bool) {
        let mut by_token = write(&self.by_token);
        if let Some(existing) = by_token.get(&compiled.token) {
            return (existing.clone(), false);
        }

        let module = Module::new(
            compiled.token.clone(),
            compiled.module_type.clone(),
            scope.to_vec(),
            self.weak(),
        );
        if compiled.is_global() {
            module.set_global();
            write(&self.globals).push(Arc::downgrade(&module));
        }
        write(&self.metadata).insert(compiled.token.clone(), compiled.metadata());
        by_token.insert(compiled.token, module.clone());
        write(&self.modules).push(module.clone());

        debug!("Inserted module {} ({})", module.name(), module.token());
        (module, true)
    }

    pub(crate) fn set_core(&self, module: Arc<Module>) {
        let _ = self.core.set(module);
    }

    /// The internal module providing the engine's own components
    pub fn core_module(&self) -> Option<&Arc<Module>> {
        self.core.get()
    }

    pub fn get(&self, token: &ModuleToken) -> Option<Arc<Module>> {
        read(&self.by_token).get(token).cloned()
    }

    pub fn get_by_id(&self, id: ModuleId) -> Option<Arc<Module>> {
        read(&self.modules)
            .iter()
            .find(|module| module.id() == id)
            .cloned()
    }

    /// All modules in insertion order
    pub fn modules(&self) -> Vec<Arc<Module>> {
        read(&self.modules).clone()
    }

    /// All modules, the deepest imports first
    ///
    /// The order lifecycle hooks run in, the core module comes first.
    pub fn modules_by_distance(&self) -> Vec<Arc<Module>> {
        let mut modules = self.modules();
        modules.sort_by_key(|module| std::cmp::Reverse(module.distance()));
        modules
    }

    /// Drops every instance cached for the context in any module
    pub fn release_context(&self, context_id: &ContextId) {
        trace!("Releasing context {}", context_id.id());
        for wrapper in self.modules().iter().flat_map(|module| module.wrappers()) {
            wrapper.release_context(context_id);
        }
    }

    pub(crate) fn metadata(&self, token: &ModuleToken) -> Option<ModuleMetadata> {
        read(&self.metadata).get(token).cloned()
    }

    pub fn global_modules(&self) -> Vec<Arc<Module>> {
        read(&self.globals).iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn add_global_enhancer(&self, enhancer: &Arc<InstanceWrapper>) {
        write(&self.global_enhancers).push(Arc::downgrade(enhancer));
    }

    pub fn global_enhancers(&self) -> Vec<Arc<InstanceWrapper>> {
        read(&self.global_enhancers)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Links every global module as an implicit import of every module
    pub(crate) fn bind_global_scope(&self) {
        for module in self.modules() {
            self.bind_globals_to_imports(&module);
        }
    }

    pub(crate) fn bind_globals_to_imports(&self, module: &Arc<Module>) {
        for global in self.global_modules() {
            self.bind_global_module_to_module(module, &global);
        }
    }

    fn bind_global_module_to_module(&self, target: &Arc<Module>, global: &Arc<Module>) {
        let is_core = self
            .core
            .get()
            .is_some_and(|core| core.id() == target.id());
        if target.id() == global.id() || is_core {
            return;
        }
        target.add_import(global);
    }
}
