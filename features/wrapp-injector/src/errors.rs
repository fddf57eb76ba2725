use std::{fmt::Display, sync::Arc};

use thiserror::Error;

use crate::{dependency_graph::DependencyGraphErrors, types::DynError};

/// Errors while turning module declarations into the module graph
#[derive(Error, Debug, Clone)]
pub enum ScanError {
    /// An import resolved to nothing, e.g. a forward reference which never resolves
    #[error("Cannot scan the import at index [{index}] of {}: it resolved to nothing. Check for a forward reference which never resolves.", .chain.join(" -> "))]
    InvalidModule { index: usize, chain: Vec<String> },
    /// An import could not be resolved while wiring the module graph
    #[error("A circular import was detected inside {context}. Use a forward reference on both sides of the import.")]
    CircularImport { context: String },
    /// A module exports a token which it neither provides nor imports
    #[error("Module '{module}' cannot export '{token}' because it is neither one of its providers nor an imported module")]
    UnknownExport { token: String, module: String },
    /// A registration has no usable constructor
    #[error("'{name}' cannot be registered in '{module}' because it has no constructor")]
    InvalidClass { name: String, module: String },
    /// Multi and non-multi registrations share a token
    #[error("'{token}' is registered in '{module}' both as a multi provider and as a regular provider")]
    MixedMultiProvider { token: String, module: String },
    /// The module has not been inserted into the container
    #[error("Module '{0}' is not registered in the container")]
    UnknownModule(String),
}

/// A dependency of a component could not be found in its module's scope
#[derive(Debug, Clone)]
pub struct UnknownDependency {
    /// Name of the component which requested the dependency
    pub consumer: String,
    /// Name of the missing dependency
    pub token: String,
    /// Constructor parameter index, None for property dependencies
    pub index: Option<usize>,
    /// Property key for property dependencies
    pub key: Option<&'static str>,
    /// Names of all constructor dependencies of the consumer
    pub dependencies: Vec<String>,
    /// Module the lookup started in
    pub module: String,
}

impl UnknownDependency {
    /// Total number of constructor dependencies of the consumer
    pub fn count(&self) -> usize {
        self.dependencies.len()
    }
}

impl Display for UnknownDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.index, self.key) {
            (_, Some(key)) => write!(
                f,
                "Cannot resolve dependencies of {}. Make sure the property '{key}' ({}) is available in the {} context.",
                self.consumer, self.token, self.module
            ),
            (Some(index), None) => {
                let arguments = self
                    .dependencies
                    .iter()
                    .enumerate()
                    .map(|(position, name)| if position == index { "?" } else { name.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "Cannot resolve dependencies of {} ({arguments}). Make sure the argument {} at index [{index}] is available in the {} context.",
                    self.consumer, self.token, self.module
                )
            }
            (None, None) => write!(
                f,
                "Cannot resolve {} for {} in the {} context.",
                self.token, self.consumer, self.module
            ),
        }
    }
}

/// An error raised by a constructor or factory, kept as is
#[derive(Debug, Clone)]
pub struct ProviderError(pub Arc<DynError>);

impl ProviderError {
    /// Returns the original error if it is of type E
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors while resolving component instances
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("{0}")]
    UnknownDependency(Box<UnknownDependency>),
    /// A dependency cycle without a lazy edge was entered
    #[error("A circular dependency was detected through {}. Inject one side as `Lazy`.", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },
    #[error(transparent)]
    DependencyGraph(#[from] DependencyGraphErrors),
    /// A constructor or factory failed
    #[error(transparent)]
    Provider(ProviderError),
    #[error("'{0}' is not a constructible class")]
    InvalidClass(String),
    /// An internal invariant was violated
    #[error("Invalid injector state: {0}")]
    Runtime(String),
}

impl ResolveError {
    pub(crate) fn provider(error: DynError) -> Self {
        ResolveError::Provider(ProviderError(Arc::new(error)))
    }
}

/// Errors when trying to require an instance from a resolved graph
#[derive(Error, Debug, Clone)]
pub enum RequireError {
    /// The requested token is not registered anywhere in scope
    #[error("'{0}' is not registered in the requested scope")]
    UnknownElement(String),
    /// The requested token is request scoped or transient and has no static instance
    #[error("'{0}' is request scoped or transient, resolve it with a context instead")]
    InvalidScope(String),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// The component is static but has not been instantiated, e.g. in preview mode
    #[error("'{0}' has not been instantiated yet")]
    NotResolved(String),
    /// The container the handle belongs to has been dropped
    #[error("The application context has been dropped")]
    ContainerDropped,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errors while extracting arguments inside a constructor or factory
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("'{consumer}' requested argument [{index}] but only {count} were declared")]
    ArgumentMissing {
        consumer: String,
        index: usize,
        count: usize,
    },
    #[error("Argument [{index}] of '{consumer}' is not available")]
    ArgumentUnavailable { consumer: String, index: usize },
    #[error("Argument [{index}] of '{consumer}' is lazy, inject it as `Lazy`")]
    ArgumentIsLazy { consumer: String, index: usize },
    #[error("Argument [{index}] of '{consumer}' is not a multi provider")]
    NotAList { consumer: String, index: usize },
    #[error("Property '{key}' of '{consumer}' was not declared")]
    PropertyMissing { consumer: String, key: String },
    #[error(transparent)]
    RequireError(#[from] RequireError),
    /// Generic error during Injection
    #[error("Error during injection: {0}")]
    Other(DynError),
}

/// Errors while initiating the application graph
#[derive(Error, Debug, Clone)]
pub enum InitError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("The application context has been dropped")]
    ContainerDropped,
}
