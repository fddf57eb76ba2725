use std::{
    any::type_name,
    fmt::Debug,
    future::Future,
    sync::{Arc, OnceLock},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::{InjectError, RequireError},
    resolver::{Args, Properties},
    token::{forward_ref, Token, TokenRef},
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Token under which global guards are registered
pub const APP_GUARD: &str = "APP_GUARD";
/// Token under which global interceptors are registered
pub const APP_INTERCEPTOR: &str = "APP_INTERCEPTOR";
/// Token under which global pipes are registered
pub const APP_PIPE: &str = "APP_PIPE";
/// Token under which global exception filters are registered
pub const APP_FILTER: &str = "APP_FILTER";

/// Lifetime of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance for the whole application
    #[default]
    Singleton,
    /// One instance per request context
    Request,
    /// One instance per consumer
    Transient,
}

/// Scope declared by a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeOptions {
    pub scope: Scope,
    /// Request scoped components which may be shared by contexts with the same parent
    pub durable: bool,
}

impl ScopeOptions {
    pub fn request() -> Self {
        ScopeOptions {
            scope: Scope::Request,
            durable: false,
        }
    }

    pub fn transient() -> Self {
        ScopeOptions {
            scope: Scope::Transient,
            durable: false,
        }
    }

    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// Information about a constructor or factory dependency
#[derive(Clone, Debug)]
pub struct DependencyInfo {
    /// The required token
    pub token: TokenRef,
    /// If it is optional or required
    pub optional: bool,
    /// If the dependency is injected lazily
    pub lazy: bool,
}

impl DependencyInfo {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self::token(Token::of::<T>())
    }

    pub fn token(token: impl Into<Token>) -> Self {
        DependencyInfo {
            token: TokenRef::Token(token.into()),
            optional: false,
            lazy: false,
        }
    }

    /// A forward referenced dependency, always injected lazily
    pub fn forward(resolve: impl Fn() -> Token + Send + Sync + 'static) -> Self {
        DependencyInfo {
            token: TokenRef::Forward(forward_ref(resolve)),
            optional: false,
            lazy: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Whether the slot is resolved after its consumer was constructed
    pub fn is_deferred(&self) -> bool {
        self.lazy || self.token.is_forward()
    }
}

/// A dependency injected into a property after construction
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    pub key: &'static str,
    pub dependency: DependencyInfo,
}

impl PropertyInfo {
    pub fn new(key: &'static str, dependency: DependencyInfo) -> Self {
        PropertyInfo { key, dependency }
    }
}

/// Cross cutting component kinds attached to controllers and providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnhancerSubtype {
    Guard,
    Interceptor,
    Pipe,
    Filter,
}

impl EnhancerSubtype {
    /// The global registration token of this subtype
    pub fn global_token(&self) -> &'static str {
        match self {
            EnhancerSubtype::Guard => APP_GUARD,
            EnhancerSubtype::Interceptor => APP_INTERCEPTOR,
            EnhancerSubtype::Pipe => APP_PIPE,
            EnhancerSubtype::Filter => APP_FILTER,
        }
    }

    pub(crate) fn from_global_token(token: &Token) -> Option<EnhancerSubtype> {
        let Token::Named(name) = token else {
            return None;
        };
        [
            EnhancerSubtype::Guard,
            EnhancerSubtype::Interceptor,
            EnhancerSubtype::Pipe,
            EnhancerSubtype::Filter,
        ]
        .into_iter()
        .find(|subtype| subtype.global_token() == name.as_ref())
    }
}

/// A class level enhancer declared by a controller or provider
#[derive(Clone)]
pub struct EnhancerDeclaration {
    pub subtype: EnhancerSubtype,
    pub class: ClassDescriptor,
}

impl EnhancerDeclaration {
    pub fn new<T: Provide>(subtype: EnhancerSubtype) -> Self {
        EnhancerDeclaration {
            subtype,
            class: ClassDescriptor::of::<T>(),
        }
    }
}

/// A class which can be constructed by the injector
///
/// This is the declaration-time metadata of a class: its ordered constructor
/// dependencies, its property dependencies and its scope.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use wrapp_injector::{Args, DependencyInfo, DynError, Provide};
///
/// struct Logger;
/// impl Provide for Logger {
///     fn construct(_: &mut Args) -> Result<Self, DynError> {
///         Ok(Logger)
///     }
/// }
///
/// struct Invoicer {
///     logger: Arc<Logger>,
/// }
/// impl Provide for Invoicer {
///     fn dependencies() -> Vec<DependencyInfo> {
///         vec![DependencyInfo::of::<Logger>()]
///     }
///
///     fn construct(args: &mut Args) -> Result<Self, DynError> {
///         Ok(Invoicer { logger: args.resolve()? })
///     }
/// }
/// ```
pub trait Provide: Injectable + Sized {
    /// Returns the constructor dependencies in argument order
    fn dependencies() -> Vec<DependencyInfo> {
        Vec::new()
    }

    /// Constructs the instance from its resolved dependencies
    fn construct(args: &mut Args) -> Result<Self, DynError>;

    fn scope() -> ScopeOptions {
        ScopeOptions::default()
    }

    /// Returns the dependencies injected after construction
    fn properties() -> Vec<PropertyInfo> {
        Vec::new()
    }

    /// Applies the resolved property dependencies
    fn inject_properties(&self, properties: &mut Properties) -> Result<(), InjectError> {
        let _ = properties;
        Ok(())
    }

    /// Returns the enhancers attached to this class
    fn enhancers() -> Vec<EnhancerDeclaration> {
        Vec::new()
    }
}

type ConstructFn = fn(&mut Args) -> Result<Instance, DynError>;
type InjectPropertiesFn = fn(&Instance, &mut Properties) -> Result<(), InjectError>;

/// Type erased [Provide] metadata of a class
#[derive(Clone)]
pub struct ClassDescriptor {
    pub info: TypeInfo,
    dependencies: fn() -> Vec<DependencyInfo>,
    properties: fn() -> Vec<PropertyInfo>,
    scope: fn() -> ScopeOptions,
    enhancers: fn() -> Vec<EnhancerDeclaration>,
    construct: Option<ConstructFn>,
    inject_properties: Option<InjectPropertiesFn>,
}

impl Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClassDescriptor")
            .field(&self.info.type_name)
            .finish()
    }
}

impl ClassDescriptor {
    pub fn of<T: Provide>() -> Self {
        ClassDescriptor {
            info: TypeInfo::of::<T>(),
            dependencies: T::dependencies,
            properties: T::properties,
            scope: T::scope,
            enhancers: T::enhancers,
            construct: Some(construct_erased::<T>),
            inject_properties: Some(inject_properties_erased::<T>),
        }
    }

    /// A type which is only used as a token and cannot be constructed
    pub fn abstract_of<T: 'static + ?Sized>() -> Self {
        ClassDescriptor {
            info: TypeInfo::of::<T>(),
            dependencies: Vec::new,
            properties: Vec::new,
            scope: ScopeOptions::default,
            enhancers: Vec::new,
            construct: None,
            inject_properties: None,
        }
    }

    /// A dependency free class built with its Default implementation
    pub(crate) fn of_default<T: Injectable + Default>() -> Self {
        ClassDescriptor {
            info: TypeInfo::of::<T>(),
            dependencies: Vec::new,
            properties: Vec::new,
            scope: ScopeOptions::default,
            enhancers: Vec::new,
            construct: Some(construct_default::<T>),
            inject_properties: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.info.short_name()
    }

    pub fn is_constructible(&self) -> bool {
        self.construct.is_some()
    }

    pub fn dependencies(&self) -> Vec<DependencyInfo> {
        (self.dependencies)()
    }

    pub fn properties(&self) -> Vec<PropertyInfo> {
        (self.properties)()
    }

    pub fn scope(&self) -> ScopeOptions {
        (self.scope)()
    }

    pub fn enhancers(&self) -> Vec<EnhancerDeclaration> {
        (self.enhancers)()
    }

    pub(crate) fn construct(&self, args: &mut Args) -> Option<Result<Instance, DynError>> {
        self.construct.map(|construct| construct(args))
    }

    pub(crate) fn inject_properties(
        &self,
        instance: &Instance,
        properties: &mut Properties,
    ) -> Result<(), InjectError> {
        match self.inject_properties {
            Some(inject) => inject(instance, properties),
            None => Ok(()),
        }
    }
}

fn construct_erased<T: Provide>(args: &mut Args) -> Result<Instance, DynError> {
    T::construct(args).map(Instance::new)
}

fn construct_default<T: Injectable + Default>(_: &mut Args) -> Result<Instance, DynError> {
    Ok(Instance::new(T::default()))
}

fn inject_properties_erased<T: Provide>(
    instance: &Instance,
    properties: &mut Properties,
) -> Result<(), InjectError> {
    let typed = instance
        .downcast::<T>()
        .map_err(|actual_type| RequireError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })?;
    typed.inject_properties(properties)
}

/// Future produced by a factory provider
pub type FactoryFuture = BoxFuture<'static, Result<Instance, DynError>>;
/// Type erased factory function
pub type FactoryFn = Arc<dyn Fn(Args) -> FactoryFuture + Send + Sync>;

#[derive(Clone)]
pub struct ValueProvider {
    pub(crate) value: Instance,
    pub(crate) fingerprint: String,
}

#[derive(Clone)]
pub struct FactoryProvider {
    pub(crate) factory: FactoryFn,
    pub(crate) inject: Vec<DependencyInfo>,
    /// Type of the factory closure, identifies the factory in module fingerprints
    pub(crate) factory_type: TypeInfo,
}

/// The shape of a provider registration
#[derive(Clone)]
pub enum Provider {
    Class(ClassDescriptor),
    Value(ValueProvider),
    Factory(FactoryProvider),
    /// Alias of another token
    Existing(TokenRef),
}

/// A provider registered on a module
#[derive(Clone)]
pub struct ProviderDeclaration {
    pub provide: Token,
    pub provider: Provider,
    /// Overrides the scope declared by the class
    pub scope: Option<Scope>,
    pub durable: Option<bool>,
    pub multi: bool,
}

impl Debug for ProviderDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDeclaration")
            .field("provide", &self.provide)
            .field("kind", &self.kind_name())
            .field("multi", &self.multi)
            .finish()
    }
}

impl ProviderDeclaration {
    fn new(provide: Token, provider: Provider) -> Self {
        ProviderDeclaration {
            provide,
            provider,
            scope: None,
            durable: None,
            multi: false,
        }
    }

    /// A class provided under its own type
    pub fn class<T: Provide>() -> Self {
        Self::new(Token::of::<T>(), Provider::Class(ClassDescriptor::of::<T>()))
    }

    /// A class provided under another token
    pub fn use_class<T: Provide>(provide: impl Into<Token>) -> Self {
        Self::new(provide.into(), Provider::Class(ClassDescriptor::of::<T>()))
    }

    /// An existing value
    pub fn value<T: Injectable + Debug>(provide: impl Into<Token>, value: T) -> Self {
        let fingerprint = format!("{}:{:?}", type_name::<T>(), value);
        Self::new(
            provide.into(),
            Provider::Value(ValueProvider {
                value: Instance::new(value),
                fingerprint,
            }),
        )
    }

    /// A factory function, its dependencies are resolved from `inject` and passed in order
    pub fn factory<F, Fut, T, E>(provide: impl Into<Token>, inject: Vec<DependencyInfo>, factory: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Injectable,
        E: Into<DynError>,
    {
        let erased: FactoryFn = Arc::new(move |args| {
            factory(args)
                .map(|result| result.map(Instance::new).map_err(Into::into))
                .boxed()
        });

        Self::new(
            provide.into(),
            Provider::Factory(FactoryProvider {
                factory: erased,
                inject,
                factory_type: TypeInfo::of::<F>(),
            }),
        )
    }

    /// An alias which resolves to the instance of another token
    pub fn existing(provide: impl Into<Token>, target: impl Into<TokenRef>) -> Self {
        Self::new(provide.into(), Provider::Existing(target.into()))
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn durable(mut self) -> Self {
        self.durable = Some(true);
        self
    }

    /// Contributes one element to a sequence shared by all multi registrations of the token
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn token(&self) -> &Token {
        &self.provide
    }

    fn kind_name(&self) -> &'static str {
        match &self.provider {
            Provider::Class(_) => "class",
            Provider::Value(_) => "value",
            Provider::Factory(_) => "factory",
            Provider::Existing(_) => "existing",
        }
    }

    /// Stable description of the registration, used by module fingerprints
    pub(crate) fn fingerprint(&self) -> String {
        let detail = match &self.provider {
            Provider::Class(class) => format!("{:?}", class.info.type_id),
            Provider::Value(value) => value.fingerprint.clone(),
            Provider::Factory(factory) => {
                let inject = factory
                    .inject
                    .iter()
                    .map(|dependency| dependency.token.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{:?}[{inject}]", factory.factory_type.type_id)
            }
            Provider::Existing(target) => target.to_string(),
        };
        format!(
            "{}:{}:{detail}:{:?}:{:?}:{}",
            self.provide.fingerprint(),
            self.kind_name(),
            self.scope,
            self.durable,
            self.multi
        )
    }
}

impl From<ClassDescriptor> for ProviderDeclaration {
    fn from(class: ClassDescriptor) -> Self {
        Self::new(Token::Type(class.info), Provider::Class(class))
    }
}

/// A property slot filled by the injector after construction
pub struct Property<T>(OnceLock<T>);

impl<T> Property<T> {
    pub const fn new() -> Self {
        Property(OnceLock::new())
    }

    /// Sets the value, later calls are ignored
    pub fn set(&self, value: T) {
        let _ = self.0.set(value);
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

impl<T> Default for Property<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Property").field(&self.0.get()).finish()
    }
}
