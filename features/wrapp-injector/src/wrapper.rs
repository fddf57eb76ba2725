//! Instance wrappers describe one resolvable component of a module and cache its
//! instances per context.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak,
    },
};

use futures_channel::oneshot;
use uuid::Uuid;

use crate::{
    context::{ContextId, STATIC_CONTEXT_ID},
    errors::ResolveError,
    module::{Module, ModuleId},
    provider::{
        ClassDescriptor, DependencyInfo, EnhancerSubtype, FactoryFn, PropertyInfo, Provider,
        ProviderDeclaration, Scope, ScopeOptions,
    },
    token::Token,
    types::Instance,
};

pub type WrapperId = Uuid;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stable identity of an instance which may not be constructed yet
///
/// Lazy handles point at the prototype of their target host, the instance is
/// filled in once the host settles.
#[derive(Clone, Default)]
pub struct Prototype(Arc<OnceLock<Instance>>);

impl Prototype {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolved(instance: Instance) -> Self {
        let prototype = Self::new();
        prototype.fill(&instance);
        prototype
    }

    pub(crate) fn fill(&self, instance: &Instance) {
        let _ = self.0.set(instance.clone());
    }

    pub fn get(&self) -> Option<&Instance> {
        self.0.get()
    }

    pub fn ptr_eq(&self, other: &Prototype) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Prototype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Prototype").field(&self.0.get()).finish()
    }
}

type Waiter = oneshot::Sender<Result<(), ResolveError>>;

enum HostState {
    Unresolved,
    /// A resolution is running, every waiter is settled with its outcome
    Pending(Vec<Waiter>),
    /// None if the component has no instance in this context
    Resolved(Option<Instance>),
}

/// Outcome of claiming a host for resolution
pub(crate) enum Claim {
    Resolved(Option<Instance>),
    Wait(oneshot::Receiver<Result<(), ResolveError>>),
    /// The caller has to resolve the host and settle it
    Owner,
}

/// The instance of a wrapper in one context
pub(crate) struct InstanceHost {
    state: Mutex<HostState>,
    prototype: Prototype,
    /// Set once every lazy dependency reachable from the instance is filled
    ready: AtomicBool,
}

impl InstanceHost {
    fn new() -> Self {
        InstanceHost {
            state: Mutex::new(HostState::Unresolved),
            prototype: Prototype::new(),
            ready: AtomicBool::new(false),
        }
    }

    fn resolved(instance: Instance) -> Self {
        InstanceHost {
            prototype: Prototype::resolved(instance.clone()),
            state: Mutex::new(HostState::Resolved(Some(instance))),
            ready: AtomicBool::new(true),
        }
    }

    pub(crate) fn claim(&self) -> Claim {
        let mut state = lock(&self.state);
        match &mut *state {
            HostState::Resolved(instance) => Claim::Resolved(instance.clone()),
            HostState::Pending(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Claim::Wait(rx)
            }
            HostState::Unresolved => {
                *state = HostState::Pending(Vec::new());
                Claim::Owner
            }
        }
    }

    /// Finishes a resolution claimed with [InstanceHost::claim]
    ///
    /// A failed resolution returns the host to unresolved.
    pub(crate) fn settle(&self, result: Result<Option<Instance>, ResolveError>) {
        let next = match &result {
            Ok(instance) => {
                if let Some(instance) = instance {
                    self.prototype.fill(instance);
                }
                HostState::Resolved(instance.clone())
            }
            Err(_) => HostState::Unresolved,
        };

        let previous = std::mem::replace(&mut *lock(&self.state), next);
        if let HostState::Pending(waiters) = previous {
            let outcome = result.map(|_| ());
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Marks the host as resolved from outside the injector
    pub(crate) fn set(&self, instance: Instance) {
        self.settle(Ok(Some(instance)));
        self.mark_ready();
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn instance(&self) -> Option<Instance> {
        match &*lock(&self.state) {
            HostState::Resolved(instance) => instance.clone(),
            _ => None,
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        matches!(&*lock(&self.state), HostState::Resolved(_))
    }

    pub(crate) fn prototype(&self) -> &Prototype {
        &self.prototype
    }
}

/// How the instance of a wrapper is produced
#[derive(Clone)]
pub(crate) enum WrapperKind {
    Class(ClassDescriptor),
    Factory(FactoryFn),
    /// Preset instance, resolved at registration
    Value,
    /// Resolves to the instance of its single dependency
    Alias,
    /// Resolves to all of its dependencies as an InstanceList
    Multi,
}

/// Edges recorded by the link pass
#[derive(Default)]
struct Links {
    dependencies: Vec<Option<Weak<InstanceWrapper>>>,
    properties: Vec<Option<Weak<InstanceWrapper>>>,
}

/// A resolvable component registered on a module
pub struct InstanceWrapper {
    pub(crate) id: WrapperId,
    pub(crate) token: Token,
    pub(crate) name: String,
    pub(crate) kind: WrapperKind,
    /// Constructor or factory dependencies in argument order
    pub(crate) inject: Vec<DependencyInfo>,
    pub(crate) properties: Vec<PropertyInfo>,
    pub(crate) scope: Scope,
    pub(crate) durable: bool,
    pub(crate) subtype: Option<EnhancerSubtype>,
    /// Not registered in any module collection, e.g. created through a module reference
    pub(crate) detached: bool,
    host_id: ModuleId,
    host: Weak<Module>,
    values: Mutex<HashMap<u64, Arc<InstanceHost>>>,
    /// Transient instances by inquirer and context
    transient: Mutex<HashMap<WrapperId, HashMap<u64, Arc<InstanceHost>>>>,
    enhancers: Mutex<Vec<Weak<InstanceWrapper>>>,
    links: RwLock<Option<Links>>,
    tree_static: OnceLock<bool>,
    tree_durable: OnceLock<bool>,
}

impl Debug for InstanceWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("durable", &self.durable)
            .finish()
    }
}

impl InstanceWrapper {
    #[allow(clippy::too_many_arguments)]
    fn new(
        token: Token,
        name: String,
        kind: WrapperKind,
        inject: Vec<DependencyInfo>,
        properties: Vec<PropertyInfo>,
        scope: ScopeOptions,
        host: &Module,
    ) -> Self {
        InstanceWrapper {
            id: Uuid::new_v4(),
            token,
            name,
            kind,
            inject,
            properties,
            scope: scope.scope,
            durable: scope.durable,
            subtype: None,
            detached: false,
            host_id: host.id(),
            host: host.weak(),
            values: Mutex::new(HashMap::new()),
            transient: Mutex::new(HashMap::new()),
            enhancers: Mutex::new(Vec::new()),
            links: RwLock::new(None),
            tree_static: OnceLock::new(),
            tree_durable: OnceLock::new(),
        }
    }

    /// Creates the wrapper of a provider declaration
    pub(crate) fn from_provider(declaration: &ProviderDeclaration, host: &Module) -> Self {
        let token = declaration.provide.clone();
        let name = token.name();
        let mut wrapper = match &declaration.provider {
            Provider::Class(class) => {
                let mut options = class.scope();
                if let Some(scope) = declaration.scope {
                    options.scope = scope;
                }
                Self::new(
                    token,
                    name,
                    WrapperKind::Class(class.clone()),
                    class.dependencies(),
                    class.properties(),
                    options,
                    host,
                )
            }
            Provider::Factory(factory) => Self::new(
                token,
                name,
                WrapperKind::Factory(factory.factory.clone()),
                factory.inject.clone(),
                Vec::new(),
                ScopeOptions {
                    scope: declaration.scope.unwrap_or_default(),
                    durable: false,
                },
                host,
            ),
            Provider::Value(value) => {
                let wrapper = Self::new(
                    token,
                    name,
                    WrapperKind::Value,
                    Vec::new(),
                    Vec::new(),
                    ScopeOptions::default(),
                    host,
                );
                wrapper.preset(value.value.clone());
                wrapper
            }
            Provider::Existing(target) => Self::new(
                token,
                name,
                WrapperKind::Alias,
                vec![DependencyInfo {
                    token: target.clone(),
                    optional: false,
                    lazy: false,
                }],
                Vec::new(),
                ScopeOptions::default(),
                host,
            ),
        };
        if let Some(durable) = declaration.durable {
            wrapper.durable = durable;
        }
        wrapper
    }

    /// Creates the wrapper of a class registered under the given token
    pub(crate) fn from_class(
        token: Token,
        class: &ClassDescriptor,
        subtype: Option<EnhancerSubtype>,
        host: &Module,
    ) -> Self {
        let mut wrapper = Self::new(
            token,
            class.name().to_string(),
            WrapperKind::Class(class.clone()),
            class.dependencies(),
            class.properties(),
            class.scope(),
            host,
        );
        wrapper.subtype = subtype;
        wrapper
    }

    /// Creates a resolved wrapper holding an existing instance
    pub(crate) fn from_value(token: Token, instance: Instance, host: &Module) -> Self {
        let wrapper = Self::new(
            token.clone(),
            token.name(),
            WrapperKind::Value,
            Vec::new(),
            Vec::new(),
            ScopeOptions::default(),
            host,
        );
        wrapper.preset(instance);
        wrapper
    }

    /// Creates the aggregating wrapper of a multi provider
    pub(crate) fn multi(token: Token, elements: &[Token], host: &Module) -> Self {
        let inject = elements
            .iter()
            .map(|element| DependencyInfo::token(element.clone()))
            .collect();
        Self::new(
            token.clone(),
            token.name(),
            WrapperKind::Multi,
            inject,
            Vec::new(),
            ScopeOptions::default(),
            host,
        )
    }

    pub(crate) fn detach(mut self) -> Self {
        self.detached = true;
        self
    }

    fn preset(&self, instance: Instance) {
        lock(&self.values).insert(STATIC_CONTEXT_ID, Arc::new(InstanceHost::resolved(instance)));
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ScopeOptions {
        ScopeOptions {
            scope: self.scope,
            durable: self.durable,
        }
    }

    pub fn host_id(&self) -> ModuleId {
        self.host_id
    }

    pub(crate) fn host(&self) -> Option<Arc<Module>> {
        self.host.upgrade()
    }

    pub fn is_transient(&self) -> bool {
        self.scope == Scope::Transient
    }

    /// Classes which are constructed by the injector
    pub(crate) fn is_newable(&self) -> bool {
        matches!(self.kind, WrapperKind::Class(_))
    }

    /// Returns the host of the given context, creating an unresolved one on first use
    pub(crate) fn host_for(
        &self,
        context_id: &ContextId,
        inquirer: Option<&InstanceWrapper>,
    ) -> Arc<InstanceHost> {
        if matches!(self.kind, WrapperKind::Value) {
            if let Some(host) = lock(&self.values).get(&STATIC_CONTEXT_ID) {
                return host.clone();
            }
        }

        if let (Scope::Transient, Some(inquirer)) = (self.scope, inquirer) {
            return lock(&self.transient)
                .entry(inquirer.id)
                .or_default()
                .entry(context_id.id())
                .or_insert_with(|| Arc::new(InstanceHost::new()))
                .clone();
        }

        lock(&self.values)
            .entry(context_id.id())
            .or_insert_with(|| Arc::new(InstanceHost::new()))
            .clone()
    }

    /// Returns the host of the given context if it exists
    pub(crate) fn existing_host(&self, context_id: &ContextId) -> Option<Arc<InstanceHost>> {
        lock(&self.values).get(&context_id.id()).cloned()
    }

    /// Drops every instance cached for the context
    pub(crate) fn release_context(&self, context_id: &ContextId) {
        if context_id.is_static() {
            return;
        }
        lock(&self.values).remove(&context_id.id());
        for hosts in lock(&self.transient).values_mut() {
            hosts.remove(&context_id.id());
        }
    }

    /// Number of hosts cached over every context and inquirer
    #[cfg(test)]
    pub(crate) fn cached_hosts(&self) -> usize {
        lock(&self.values).len() + lock(&self.transient).values().map(HashMap::len).sum::<usize>()
    }

    pub(crate) fn add_enhancer(&self, enhancer: &Arc<InstanceWrapper>) {
        lock(&self.enhancers).push(Arc::downgrade(enhancer));
    }

    /// Records the resolved constructor and property edges
    pub(crate) fn link(
        &self,
        dependencies: Vec<Option<Weak<InstanceWrapper>>>,
        properties: Vec<Option<Weak<InstanceWrapper>>>,
    ) {
        let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
        *links = Some(Links {
            dependencies,
            properties,
        });
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The linked constructor dependency at the index
    pub(crate) fn linked_dependency(&self, index: usize) -> Option<Arc<InstanceWrapper>> {
        let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
        links
            .as_ref()?
            .dependencies
            .get(index)?
            .as_ref()?
            .upgrade()
    }

    /// The linked property dependency at the index of [InstanceWrapper::properties]
    pub(crate) fn linked_property(&self, index: usize) -> Option<Arc<InstanceWrapper>> {
        let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
        links
            .as_ref()?
            .properties
            .get(index)?
            .as_ref()?
            .upgrade()
    }

    /// Every recorded edge, constructor dependencies first
    pub(crate) fn edges(&self) -> Vec<Arc<InstanceWrapper>> {
        let mut edges: Vec<Arc<InstanceWrapper>> = Vec::new();
        if let Some(links) = &*self.links.read().unwrap_or_else(PoisonError::into_inner) {
            edges.extend(
                links
                    .dependencies
                    .iter()
                    .chain(links.properties.iter())
                    .flatten()
                    .filter_map(Weak::upgrade),
            );
        }
        edges.extend(lock(&self.enhancers).iter().filter_map(Weak::upgrade));
        edges
    }

    /// Whether the dependency is resolved after this wrapper was constructed
    ///
    /// Aliases hand out their target itself, so their edge is always eager.
    pub(crate) fn is_deferred(&self, info: &DependencyInfo) -> bool {
        info.is_deferred() && !matches!(self.kind, WrapperKind::Alias)
    }

    /// Edges which have to be resolved before construction, paired with their slot
    pub(crate) fn eager_edges(&self) -> Vec<(String, Arc<InstanceWrapper>)> {
        let Some(links) = &*self.links.read().unwrap_or_else(PoisonError::into_inner) else {
            return Vec::new();
        };
        let dependencies = self
            .inject
            .iter()
            .zip(links.dependencies.iter())
            .enumerate()
            .filter(|(_, (info, _))| !self.is_deferred(info))
            .filter_map(|(index, (_, edge))| Some((format!("[{index}]"), edge.as_ref()?.upgrade()?)));
        let properties = self
            .properties
            .iter()
            .zip(links.properties.iter())
            .filter(|(info, _)| !self.is_deferred(&info.dependency))
            .filter_map(|(info, edge)| Some((info.key.to_string(), edge.as_ref()?.upgrade()?)));
        dependencies.chain(properties).collect()
    }

    /// True if no request scoped component is reachable through the recorded edges
    pub fn is_dependency_tree_static(&self) -> bool {
        if let Some(cached) = self.tree_static.get() {
            return *cached;
        }
        let is_static = self.walk_static(&mut HashSet::new());
        if self.is_linked() {
            let _ = self.tree_static.set(is_static);
        }
        is_static
    }

    fn walk_static(&self, visited: &mut HashSet<WrapperId>) -> bool {
        if self.scope == Scope::Request {
            return false;
        }
        if let Some(cached) = self.tree_static.get() {
            return *cached;
        }
        // Cycles are decided by the other participants
        if !visited.insert(self.id) {
            return true;
        }
        self.edges().iter().all(|edge| edge.walk_static(visited))
    }

    /// True if the instances of the tree may be shared by contexts with the same durable parent
    pub fn is_dependency_tree_durable(&self) -> bool {
        if let Some(cached) = self.tree_durable.get() {
            return *cached;
        }
        let is_durable = self.walk_durable(&mut HashSet::new());
        if self.is_linked() {
            let _ = self.tree_durable.set(is_durable);
        }
        is_durable
    }

    fn walk_durable(&self, visited: &mut HashSet<WrapperId>) -> bool {
        if self.scope == Scope::Request {
            return self.durable;
        }
        if self.is_dependency_tree_static() {
            return false;
        }
        if let Some(cached) = self.tree_durable.get() {
            return *cached;
        }
        if !visited.insert(self.id) {
            return true;
        }
        !self.edges().iter().any(|edge| {
            !edge.is_dependency_tree_static() && !edge.walk_durable(visited)
        })
    }

    /// Constructed in the static context
    pub(crate) fn is_static(&self, context_id: &ContextId, inquirer: Option<&InstanceWrapper>) -> bool {
        let is_inquirer_request_scoped =
            inquirer.is_some_and(|inquirer| !inquirer.is_dependency_tree_static());
        let is_static_transient = self.is_transient() && !is_inquirer_request_scoped;
        self.is_dependency_tree_static()
            && context_id.is_static()
            && (!self.is_transient()
                || (is_static_transient && inquirer.is_some_and(|inquirer| !inquirer.is_transient())))
    }

    /// Constructed per request context
    pub(crate) fn is_in_request_scope(
        &self,
        context_id: &ContextId,
        inquirer: Option<&InstanceWrapper>,
    ) -> bool {
        !self.is_dependency_tree_static()
            && !context_id.is_static()
            && (!self.is_transient() || inquirer.is_some())
    }

    /// A static transient consumed by a request scoped component
    pub(crate) fn is_lazy_transient(
        &self,
        context_id: &ContextId,
        inquirer: Option<&InstanceWrapper>,
    ) -> bool {
        let is_inquirer_request_scoped =
            inquirer.is_some_and(|inquirer| !inquirer.is_dependency_tree_static());
        self.is_dependency_tree_static()
            && !context_id.is_static()
            && self.is_transient()
            && is_inquirer_request_scoped
    }

    /// Requested directly, or by a transient consumer, in a request context
    pub(crate) fn is_explicitly_requested(
        &self,
        context_id: &ContextId,
        inquirer: Option<&InstanceWrapper>,
    ) -> bool {
        let is_self_requested = inquirer.is_some_and(|inquirer| inquirer.id == self.id);
        self.is_dependency_tree_static()
            && !context_id.is_static()
            && (is_self_requested || inquirer.is_some_and(InstanceWrapper::is_transient))
    }

    /// Whether an instance is constructed for the context and inquirer
    pub(crate) fn is_in_context(&self, context_id: &ContextId, inquirer: Option<&InstanceWrapper>) -> bool {
        self.is_static(context_id, inquirer)
            || self.is_in_request_scope(context_id, inquirer)
            || self.is_lazy_transient(context_id, inquirer)
            || self.is_explicitly_requested(context_id, inquirer)
    }
}
