use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use tracing::trace;

use crate::{
    errors::{ResolveError, UnknownDependency},
    injector::Injector,
    module::{Module, ModuleId},
    provider::DependencyInfo,
    token::Token,
    wrapper::InstanceWrapper,
};

/// The slot a dependency is injected into
#[derive(Clone, Copy)]
enum Slot {
    Index(usize),
    Key(&'static str),
}

impl Injector {
    /// Finds the wrapper visible under the token from inside the module
    ///
    /// Own providers come first, then the exports of imported modules depth first
    /// in import declaration order.
    pub fn lookup_component(&self, module: &Arc<Module>, token: &Token) -> Option<Arc<InstanceWrapper>> {
        trace!("Looking for {token} in {}", module.name());
        if let Some(wrapper) = module.provider(token) {
            trace!("Found {token} in {}", module.name());
            return Some(wrapper);
        }
        let mut visited = HashSet::from([module.id()]);
        self.lookup_component_in_imports(module, token, &mut visited, false)
    }

    fn lookup_component_in_imports(
        &self,
        module: &Arc<Module>,
        token: &Token,
        visited: &mut HashSet<ModuleId>,
        is_traversing: bool,
    ) -> Option<Arc<InstanceWrapper>> {
        let mut children = module.imports();
        if is_traversing {
            // Only modules which are re-exported are visible through this one
            children.retain(|child| module.exports(&child.module_type().token()));
        }

        for child in children {
            if !visited.insert(child.id()) {
                continue;
            }
            trace!("Looking for {token} in {}", child.name());

            if child.exports(token) {
                if let Some(wrapper) = child.provider(token) {
                    trace!("Found {token} in {}", child.name());
                    return Some(wrapper);
                }
            }
            if let Some(wrapper) = self.lookup_component_in_imports(&child, token, visited, true) {
                return Some(wrapper);
            }
        }
        None
    }

    /// Records the wrappers every constructor and property dependency resolves to
    ///
    /// Fails with an unknown dependency error for the first required dependency which
    /// is not visible from the wrapper's module.
    pub(crate) fn link(&self, wrapper: &Arc<InstanceWrapper>) -> Result<(), ResolveError> {
        if wrapper.is_linked() {
            return Ok(());
        }
        let module = wrapper.host().ok_or_else(|| {
            ResolveError::Runtime(format!("The module of {} was dropped", wrapper.name))
        })?;

        let dependencies = wrapper
            .inject
            .iter()
            .enumerate()
            .map(|(index, info)| self.lookup_dependency(&module, wrapper, info, Slot::Index(index)))
            .collect::<Result<Vec<_>, _>>()?;
        let properties = wrapper
            .properties
            .iter()
            .map(|property| {
                self.lookup_dependency(&module, wrapper, &property.dependency, Slot::Key(property.key))
            })
            .collect::<Result<Vec<_>, _>>()?;

        wrapper.link(dependencies, properties);
        Ok(())
    }

    fn lookup_dependency(
        &self,
        module: &Arc<Module>,
        wrapper: &InstanceWrapper,
        info: &DependencyInfo,
        slot: Slot,
    ) -> Result<Option<Weak<InstanceWrapper>>, ResolveError> {
        let token = info.token.resolve();
        let found = match &token {
            // A component depending on its own token would find itself
            Some(token) if *token == wrapper.token && !wrapper.detached => None,
            Some(token) => self.lookup_component(module, token),
            None => None,
        };

        match found {
            Some(found) => Ok(Some(Arc::downgrade(&found))),
            None if info.optional => Ok(None),
            None => Err(ResolveError::UnknownDependency(Box::new(UnknownDependency {
                consumer: wrapper.name.clone(),
                token: info.token.to_string(),
                index: match slot {
                    Slot::Index(index) => Some(index),
                    Slot::Key(_) => None,
                },
                key: match slot {
                    Slot::Index(_) => None,
                    Slot::Key(key) => Some(key),
                },
                dependencies: wrapper
                    .inject
                    .iter()
                    .map(|dependency| dependency.token.to_string())
                    .collect(),
                module: module.name().to_string(),
            }))),
        }
    }
}
