//! The resolution engine
//!
//! Resolving a wrapper in a context resolves its dependencies concurrently,
//! constructs the instance and caches it on the wrapper's host for the
//! context. Concurrent resolutions of the same host wait for the first one.
//! A host becomes ready once the lazy dependencies of its instance are filled,
//! which happens after it settled.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::{
    future::{try_join_all, BoxFuture},
    FutureExt,
};
use tracing::{debug, error, trace};

use crate::{
    context::{ContextId, HostComponentInfo},
    errors::ResolveError,
    provider::DependencyInfo,
    resolver::{Argument, Args, Properties},
    types::{Instance, InstanceList},
    wrapper::{lock, Claim, InstanceHost, InstanceWrapper, WrapperId, WrapperKind},
};

mod lookup;

/// A lazy dependency handed out as placeholder, resolved after its consumer
struct DeferredLoad {
    wrapper: Arc<InstanceWrapper>,
    context_id: ContextId,
    inquirer: Arc<InstanceWrapper>,
}

/// State of one top level resolution
#[derive(Default)]
struct Resolution {
    deferred: Mutex<Vec<DeferredLoad>>,
    /// Hosts which are ready once the deferred queue is drained
    settled: Mutex<Vec<Arc<InstanceHost>>>,
}

impl Resolution {
    fn defer(&self, load: DeferredLoad) {
        lock(&self.deferred).push(load);
    }

    fn take_deferred(&self) -> Vec<DeferredLoad> {
        std::mem::take(&mut *lock(&self.deferred))
    }

    fn track(&self, host: Arc<InstanceHost>) {
        lock(&self.settled).push(host);
    }

    fn mark_ready(&self) {
        for host in lock(&self.settled).drain(..) {
            host.mark_ready();
        }
    }
}

/// Settles an owned host if the resolution is dropped before it finished
struct SettleGuard {
    host: Arc<InstanceHost>,
    settled: bool,
}

impl SettleGuard {
    fn new(host: Arc<InstanceHost>) -> Self {
        SettleGuard {
            host,
            settled: false,
        }
    }

    fn settle(mut self, result: Result<Option<Instance>, ResolveError>) {
        self.settled = true;
        self.host.settle(result);
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.host.settle(Err(ResolveError::Runtime(
                "The resolution was cancelled".to_string(),
            )));
        }
    }
}

/// Resolves instance wrappers
#[derive(Debug, Default, Clone, Copy)]
pub struct Injector;

impl Injector {
    pub fn new() -> Self {
        Injector
    }

    /// Resolves the wrapper in the context
    ///
    /// Returns None if the wrapper has no instance in the context, e.g. a request
    /// scoped component in the static context.
    /// Lazy dependencies handed out during the resolution are resolved before this returns.
    pub async fn load_instance(
        &self,
        wrapper: &Arc<InstanceWrapper>,
        context_id: &ContextId,
        inquirer: Option<&Arc<InstanceWrapper>>,
    ) -> Result<Option<Instance>, ResolveError> {
        let resolution = Resolution::default();
        let instance = self
            .resolve_component(
                &resolution,
                wrapper.clone(),
                context_id.clone(),
                inquirer.cloned(),
                Vec::new(),
            )
            .await?;
        self.resolve_deferred(&resolution).await?;
        resolution.mark_ready();
        Ok(instance)
    }

    async fn resolve_deferred(&self, resolution: &Resolution) -> Result<(), ResolveError> {
        loop {
            let batch = resolution.take_deferred();
            if batch.is_empty() {
                return Ok(());
            }
            trace!("Resolving {} lazy dependencies", batch.len());
            try_join_all(batch.into_iter().map(|load| {
                self.resolve_component(
                    resolution,
                    load.wrapper,
                    load.context_id,
                    Some(load.inquirer),
                    Vec::new(),
                )
            }))
            .await?;
        }
    }

    /// The context the wrapper's instance lives in
    ///
    /// Durable trees may be lifted by the context's parent resolver, static trees
    /// always live in the static context unless they are transient.
    pub(crate) fn effective_context(&self, wrapper: &InstanceWrapper, context_id: &ContextId) -> ContextId {
        if wrapper.is_dependency_tree_static() && !wrapper.is_transient() {
            return ContextId::static_context();
        }
        context_id.resolve_for(&HostComponentInfo {
            token: wrapper.token.clone(),
            is_tree_durable: wrapper.is_dependency_tree_durable(),
        })
    }

    fn resolve_component<'a>(
        &'a self,
        resolution: &'a Resolution,
        wrapper: Arc<InstanceWrapper>,
        context_id: ContextId,
        inquirer: Option<Arc<InstanceWrapper>>,
        path: Vec<Arc<InstanceWrapper>>,
    ) -> BoxFuture<'a, Result<Option<Instance>, ResolveError>> {
        async move {
            if path.iter().any(|visited| visited.id == wrapper.id) {
                return Err(ResolveError::CircularDependency {
                    chain: circular_chain(&path, &wrapper),
                });
            }

            self.link(&wrapper)?;
            let context_id = self.effective_context(&wrapper, &context_id);
            let host = wrapper.host_for(&context_id, inquirer.as_deref());

            match host.claim() {
                Claim::Resolved(instance) => {
                    self.observe(
                        resolution,
                        &wrapper,
                        &context_id,
                        inquirer.as_ref(),
                        host,
                        &mut HashSet::new(),
                    );
                    return Ok(instance);
                }
                Claim::Wait(waiter) => {
                    trace!("Waiting for {} in context {}", wrapper.name, context_id.id());
                    match waiter.await {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => return Err(error),
                        Err(_) => {
                            return Err(ResolveError::Runtime(format!(
                                "The resolution of {} was abandoned",
                                wrapper.name
                            )))
                        }
                    }
                    let instance = host.instance();
                    self.observe(
                        resolution,
                        &wrapper,
                        &context_id,
                        inquirer.as_ref(),
                        host,
                        &mut HashSet::new(),
                    );
                    return Ok(instance);
                }
                Claim::Owner => {}
            }

            let guard = SettleGuard::new(host.clone());
            let result = self
                .instantiate(resolution, &wrapper, &context_id, inquirer.as_ref(), path)
                .await;
            guard.settle(result.clone());
            if result.is_ok() {
                resolution.track(host);
            }
            result
        }
        .boxed()
    }

    /// Defers the unfilled lazy dependencies of an instance this resolution did not construct
    ///
    /// The owner of a host fills the lazy dependencies of its tree only after settling,
    /// so the tree is walked along eager edges down to hosts which are ready.
    fn observe(
        &self,
        resolution: &Resolution,
        wrapper: &Arc<InstanceWrapper>,
        context_id: &ContextId,
        inquirer: Option<&Arc<InstanceWrapper>>,
        host: Arc<InstanceHost>,
        visited: &mut HashSet<WrapperId>,
    ) {
        if host.is_ready() || !host.is_resolved() || !visited.insert(wrapper.id) {
            return;
        }
        resolution.track(host);

        let dependencies = wrapper
            .inject
            .iter()
            .enumerate()
            .map(|(index, info)| (info, wrapper.linked_dependency(index)));
        let properties = wrapper
            .properties
            .iter()
            .enumerate()
            .map(|(index, property)| (&property.dependency, wrapper.linked_property(index)));
        for (info, target) in dependencies.chain(properties) {
            let Some(target) = target else {
                continue;
            };
            let target_inquirer = self.dependency_inquirer(wrapper, inquirer, &target);
            let target_context = self.effective_context(&target, context_id);
            let target_host = target.host_for(&target_context, Some(&target_inquirer));

            if !wrapper.is_deferred(info) {
                self.observe(
                    resolution,
                    &target,
                    &target_context,
                    Some(&target_inquirer),
                    target_host,
                    visited,
                );
            } else if !target_host.is_resolved() {
                trace!("Deferring {} for {}", target.name, wrapper.name);
                resolution.defer(DeferredLoad {
                    wrapper: target,
                    context_id: context_id.clone(),
                    inquirer: target_inquirer,
                });
            }
        }
    }

    async fn instantiate(
        &self,
        resolution: &Resolution,
        wrapper: &Arc<InstanceWrapper>,
        context_id: &ContextId,
        inquirer: Option<&Arc<InstanceWrapper>>,
        mut path: Vec<Arc<InstanceWrapper>>,
    ) -> Result<Option<Instance>, ResolveError> {
        let module = wrapper.host().ok_or_else(|| {
            ResolveError::Runtime(format!("The module of {} was dropped", wrapper.name))
        })?;
        if !wrapper.detached && !module.hosts(wrapper) {
            return Err(ResolveError::Runtime(format!(
                "{} is not registered in {}",
                wrapper.name,
                module.name()
            )));
        }

        if !wrapper.is_in_context(context_id, inquirer.map(Arc::as_ref)) {
            trace!(
                "{} has no instance in context {}",
                wrapper.name,
                context_id.id()
            );
            return Ok(None);
        }

        debug!("Resolving {} in {}", wrapper.name, module.name());
        path.push(wrapper.clone());
        let path = path.as_slice();

        let edges = (0..wrapper.inject.len())
            .map(|index| wrapper.linked_dependency(index))
            .collect::<Vec<_>>();
        let arguments = try_join_all(wrapper.inject.iter().zip(edges).map(|(info, target)| {
            self.resolve_argument(resolution, wrapper, info, target, context_id, inquirer, path)
        }))
        .await?;

        let property_edges = (0..wrapper.properties.len())
            .map(|index| wrapper.linked_property(index))
            .collect::<Vec<_>>();
        let properties = try_join_all(wrapper.properties.iter().zip(property_edges).map(
            |(property, target)| async move {
                let argument = self
                    .resolve_argument(
                        resolution,
                        wrapper,
                        &property.dependency,
                        target,
                        context_id,
                        inquirer,
                        path,
                    )
                    .await?;
                Ok::<_, ResolveError>((property.key, argument))
            },
        ))
        .await?;

        let instance = self
            .construct(wrapper, arguments, properties.into_iter().collect())
            .await?;
        debug!(
            "Instantiated {} in context {}",
            wrapper.name,
            context_id.id()
        );
        Ok(Some(instance))
    }

    /// The inquirer passed on to a dependency
    ///
    /// Transient chains keep the first non transient consumer as inquirer.
    fn dependency_inquirer(
        &self,
        wrapper: &Arc<InstanceWrapper>,
        inquirer: Option<&Arc<InstanceWrapper>>,
        target: &InstanceWrapper,
    ) -> Arc<InstanceWrapper> {
        match inquirer {
            Some(parent) if wrapper.is_transient() && target.is_transient() => parent.clone(),
            _ => wrapper.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_argument(
        &self,
        resolution: &Resolution,
        wrapper: &Arc<InstanceWrapper>,
        info: &DependencyInfo,
        target: Option<Arc<InstanceWrapper>>,
        context_id: &ContextId,
        inquirer: Option<&Arc<InstanceWrapper>>,
        path: &[Arc<InstanceWrapper>],
    ) -> Result<Argument, ResolveError> {
        let Some(target) = target else {
            return Ok(Argument::Missing);
        };
        let target_inquirer = self.dependency_inquirer(wrapper, inquirer, &target);

        if wrapper.is_deferred(info) {
            self.link(&target)?;
            let target_context = self.effective_context(&target, context_id);
            let host = target.host_for(&target_context, Some(&target_inquirer));
            if !host.is_resolved() {
                trace!("Deferring {} for {}", target.name, wrapper.name);
                resolution.defer(DeferredLoad {
                    wrapper: target,
                    context_id: context_id.clone(),
                    inquirer: target_inquirer,
                });
            }
            return Ok(Argument::Deferred(host.prototype().clone()));
        }

        let instance = self
            .resolve_component(
                resolution,
                target,
                context_id.clone(),
                Some(target_inquirer),
                path.to_vec(),
            )
            .await?;
        Ok(match instance {
            Some(instance) => Argument::Instance(instance),
            None => Argument::Unavailable,
        })
    }

    async fn construct(
        &self,
        wrapper: &InstanceWrapper,
        arguments: Vec<Argument>,
        properties: HashMap<&'static str, Argument>,
    ) -> Result<Instance, ResolveError> {
        match &wrapper.kind {
            WrapperKind::Class(class) => {
                let mut args = Args::new(wrapper.name.clone(), arguments);
                let instance = match class.construct(&mut args) {
                    Some(Ok(instance)) => instance,
                    Some(Err(cause)) => {
                        error!("Constructor of {} failed: {cause}", wrapper.name);
                        return Err(ResolveError::provider(cause));
                    }
                    None => return Err(ResolveError::InvalidClass(wrapper.name.clone())),
                };

                let mut properties = Properties::new(wrapper.name.clone(), properties);
                class
                    .inject_properties(&instance, &mut properties)
                    .map_err(|cause| {
                        error!("Property injection of {} failed: {cause}", wrapper.name);
                        ResolveError::provider(Box::new(cause))
                    })?;
                Ok(instance)
            }
            WrapperKind::Factory(factory) => {
                let args = Args::new(wrapper.name.clone(), arguments);
                factory(args).await.map_err(|cause| {
                    error!("Factory of {} failed: {cause}", wrapper.name);
                    ResolveError::provider(cause)
                })
            }
            WrapperKind::Alias => match arguments.into_iter().next() {
                Some(Argument::Instance(instance)) => Ok(instance),
                _ => Err(ResolveError::Runtime(format!(
                    "The alias {} has no instance",
                    wrapper.name
                ))),
            },
            WrapperKind::Multi => {
                let elements = arguments
                    .into_iter()
                    .filter_map(|argument| match argument {
                        Argument::Instance(instance) => Some(instance),
                        _ => None,
                    })
                    .collect();
                Ok(Instance::new(InstanceList::new(elements)))
            }
            // Values are resolved at registration
            WrapperKind::Value => wrapper
                .host_for(&ContextId::static_context(), None)
                .instance()
                .ok_or_else(|| ResolveError::Runtime(format!("The value {} is missing", wrapper.name))),
        }
    }
}

fn circular_chain(path: &[Arc<InstanceWrapper>], wrapper: &InstanceWrapper) -> Vec<String> {
    let mut chain = path
        .iter()
        .skip_while(|visited| visited.id != wrapper.id)
        .map(|visited| visited.name.clone())
        .collect::<Vec<_>>();
    chain.push(wrapper.name.clone());
    chain
}
