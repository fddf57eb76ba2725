use std::{
    any::type_name,
    fmt::Debug,
    ops::Deref,
    sync::{Arc, OnceLock},
};

use crate::{
    errors::{InjectError, RequireError},
    provider::DependencyInfo,
    resolver::{Argument, Args, Resolver},
    types::Injectable,
    wrapper::Prototype,
};

/// Lazily resolved dependency
///
/// Breaks dependency cycles: the consumer is constructed with a placeholder which
/// is filled once the dependency itself has been constructed.
/// Should only be accessed after the resolution has completed.
///
/// ### Panics
///
/// If dereferenced before the dependency was resolved
///
/// Note:
///
/// No panics should happen unless:
/// - It is accessed inside a constructor
/// - It is accessed after the resolution has already failed
///
pub struct Lazy<T: Injectable> {
    prototype: Prototype,
    cached: OnceLock<Arc<T>>,
}
impl<T: Injectable + Debug> Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_get() {
            Some(Ok(instance)) => f.debug_tuple("Lazy").field(instance).finish(),
            _ => f.debug_tuple("Lazy").field(&"<unresolved>").finish(),
        }
    }
}
impl<T: Injectable> Deref for Lazy<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}
impl<T: Injectable> Resolver for Lazy<T> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError>
    where
        Self: Sized,
    {
        let (index, argument) = args.next_argument()?;
        let prototype = match argument {
            Argument::Deferred(prototype) => prototype,
            Argument::Instance(instance) => Prototype::resolved(instance),
            Argument::Missing | Argument::Unavailable => return Err(args.unavailable(index)),
        };
        Ok(Lazy::new(prototype))
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>().lazy()
    }
}
impl<T: Injectable> Lazy<T> {
    fn new(prototype: Prototype) -> Self {
        Lazy {
            prototype,
            cached: OnceLock::new(),
        }
    }

    /// Accesses the Lazy Dependency
    ///
    /// # Panics
    /// - When accessed before the dependency was resolved
    pub fn get(&self) -> &Arc<T> {
        match self.try_get() {
            Some(Ok(instance)) => instance,
            Some(Err(error)) => panic!("Lazy dependency has an unexpected type: {error}"),
            None => panic!("Lazy dependency accessed before it was resolved"),
        }
    }

    /// Try to access the lazy dependency
    ///
    /// Returns None while the dependency is still being resolved.
    pub fn try_get(&self) -> Option<Result<&Arc<T>, RequireError>> {
        if let Some(cached) = self.cached.get() {
            return Some(Ok(cached));
        }

        let instance = self.prototype.get()?;
        match instance.downcast::<T>() {
            Ok(typed) => Some(Ok(self.cached.get_or_init(|| typed))),
            Err(actual_type) => Some(Err(RequireError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.prototype.get().is_some()
    }
}

/// Lazily resolved optional dependency
pub struct LazyOption<T: Injectable> {
    lazy: Option<Lazy<T>>,
}
impl<T: Injectable + Debug> Debug for LazyOption<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.lazy {
            Some(lazy) => f.debug_tuple("LazyOption").field(lazy).finish(),
            None => f.debug_tuple("LazyOption").field(&"None").finish(),
        }
    }
}
impl<T: Injectable> Resolver for LazyOption<T> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError>
    where
        Self: Sized,
    {
        if let Some(Argument::Missing) = args.peek_argument() {
            args.next_argument()?;
            return Ok(LazyOption { lazy: None });
        }
        Ok(LazyOption {
            lazy: Some(Lazy::<T>::resolve(args)?),
        })
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>().lazy().optional()
    }
}
impl<T: Injectable> LazyOption<T> {
    /// Accesses the Lazy Dependency - returning an error on access
    pub fn try_get(&self) -> Option<Result<&Arc<T>, RequireError>> {
        self.lazy.as_ref().and_then(Lazy::try_get)
    }

    /// Accesses the Lazy Dependency
    ///
    /// # Panics
    /// - If the dependency is registered but was not resolved yet
    pub fn get(&self) -> Option<&Arc<T>> {
        self.lazy.as_ref().map(Lazy::get)
    }
}
