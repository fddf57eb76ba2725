//! Context identities select which per-context instance cache a resolution uses.
//!
//! There is exactly one static context for application wide singletons. Every
//! other context stands for one in-flight request (or a manually created scope).

use std::{
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::token::Token;

/// Id of the static context
pub const STATIC_CONTEXT_ID: u64 = 1;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(STATIC_CONTEXT_ID + 1);

/// Information handed to a parent resolver to pick the context a component lives in
#[derive(Debug, Clone)]
pub struct HostComponentInfo {
    pub token: Token,
    /// Whether the component's dependency tree may be shared across requests
    pub is_tree_durable: bool,
}

/// Picks the effective context for a component, used to lift durable trees to a shared context
pub type ContextIdResolver = Arc<dyn Fn(&HostComponentInfo) -> ContextId + Send + Sync>;

/// Identity of a resolution context
///
/// Two context ids are equal if and only if they share the same numeric id.
#[derive(Clone)]
pub struct ContextId {
    id: u64,
    parent: Option<ContextIdResolver>,
}

impl ContextId {
    /// Creates a fresh request context
    pub fn new() -> Self {
        ContextId {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
        }
    }

    /// The application wide singleton context
    pub fn static_context() -> Self {
        ContextId {
            id: STATIC_CONTEXT_ID,
            parent: None,
        }
    }

    /// Attaches a resolver which decides the effective context per component
    pub fn with_parent(
        mut self,
        resolver: impl Fn(&HostComponentInfo) -> ContextId + Send + Sync + 'static,
    ) -> Self {
        self.parent = Some(Arc::new(resolver));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_static(&self) -> bool {
        self.id == STATIC_CONTEXT_ID
    }

    /// Resolves the context a component with the given info should use
    pub fn resolve_for(&self, info: &HostComponentInfo) -> ContextId {
        match &self.parent {
            Some(parent) => parent(info),
            None => self.clone(),
        }
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ContextId {}
impl Hash for ContextId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextId")
            .field("id", &self.id)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Decides how request contexts are mapped onto durable contexts
///
/// Implemented by applications with durable providers, e.g. to share one
/// tenant's provider tree across all requests of that tenant.
pub trait ContextIdStrategy<Request: ?Sized>: Send + Sync {
    /// Returns a resolver for the request, or None to keep the request context for everything
    fn attach(&self, context_id: &ContextId, request: &Request) -> Option<ContextIdResolver>;
}

/// Creates context ids
pub struct ContextIdFactory;

impl ContextIdFactory {
    pub fn create() -> ContextId {
        ContextId::new()
    }

    /// Creates a request context, applying the strategy to attach a parent resolver
    pub fn create_for<Request: ?Sized>(
        strategy: &dyn ContextIdStrategy<Request>,
        request: &Request,
    ) -> ContextId {
        let mut context_id = ContextId::new();
        context_id.parent = strategy.attach(&context_id, request);
        context_id
    }
}
