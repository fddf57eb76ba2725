//! Module based dependency injection
//!
//! Applications are declared as a graph of modules. Each module provides components,
//! imports other modules and exports a subset of its components to its importers.
//! [ApplicationContext::builder] scans the graph, links every component to its
//! dependencies and instantiates all static singletons. Request scoped and transient
//! components are resolved per [ContextId].

mod builder;
mod compiler;
mod container;
mod context;
mod core_module;
mod dependency_graph;
mod errors;
mod injector;
mod instance_loader;
mod lazy_loader;
mod module;
mod module_ref;
mod provider;
mod resolver;
mod scanner;
mod token;
mod types;
mod wrapper;

pub use builder::{ApplicationBuilder, ApplicationContext, ApplicationOptions};
pub use compiler::{
    CompiledModule, DynamicModule, ExportDeclaration, ModuleCompiler, ModuleDeclaration,
    ModuleDefinition, ModuleMetadata, ModuleToken, ModuleType,
};
pub use container::ModulesContainer;
pub use context::{
    ContextId, ContextIdFactory, ContextIdResolver, ContextIdStrategy, HostComponentInfo,
    STATIC_CONTEXT_ID,
};
pub use core_module::{InternalCoreModule, RequestNotRegistered, REQUEST};
pub use dependency_graph::{DependencyGraph, DependencyGraphError, DependencyGraphErrors};
pub use errors::{
    InitError, InjectError, ProviderError, RequireError, ResolveError, ScanError,
    UnknownDependency,
};
pub use injector::Injector;
pub use lazy_loader::LazyModuleLoader;
pub use module::{Module, ModuleId};
pub use module_ref::ModuleRef;
pub use provider::{
    ClassDescriptor, DependencyInfo, EnhancerDeclaration, EnhancerSubtype, FactoryFn,
    FactoryFuture, Property, PropertyInfo, Provide, Provider, ProviderDeclaration, Scope,
    ScopeOptions, APP_FILTER, APP_GUARD, APP_INTERCEPTOR, APP_PIPE,
};
pub use resolver::{
    lazy::{Lazy, LazyOption},
    Args, Properties, Resolver,
};
pub use token::{forward_ref, ForwardRef, Symbol, Token, TokenRef};
pub use types::{DynError, Injectable, Instance, InstanceList, TypeInfo};
pub use wrapper::{InstanceWrapper, Prototype, WrapperId};
