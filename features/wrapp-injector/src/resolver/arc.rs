use std::{any::type_name, sync::Arc};

use crate::{
    errors::{InjectError, RequireError},
    provider::DependencyInfo,
    resolver::{Argument, Args, Resolver},
    types::{Injectable, Instance},
};

fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, InjectError> {
    instance.downcast::<T>().map_err(|actual_type| {
        RequireError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        }
        .into()
    })
}

impl<T: Injectable> Resolver for Arc<T> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError> {
        let (index, argument) = args.next_argument()?;
        match argument {
            Argument::Instance(instance) => downcast(&instance),
            Argument::Missing | Argument::Unavailable => Err(args.unavailable(index)),
            // Resolved lazies may be read like regular arguments
            Argument::Deferred(prototype) => match prototype.get() {
                Some(instance) => downcast(instance),
                None => Err(args.is_lazy(index)),
            },
        }
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError>
    where
        Self: Sized,
    {
        // Only a missing registration resolves to None, everything else is an error of the inner resolver
        if let Some(Argument::Missing) = args.peek_argument() {
            args.next_argument()?;
            return Ok(None);
        }
        Resolvable::resolve(args).map(Some)
    }

    fn dependency_info() -> DependencyInfo {
        Resolvable::dependency_info().optional()
    }
}

/// All elements of a multi provider registered under the type T
impl<T: Injectable> Resolver for Vec<Arc<T>> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError> {
        let (index, argument) = args.next_argument()?;
        let instance = match argument {
            Argument::Instance(instance) => instance,
            Argument::Missing => return Ok(Vec::new()),
            Argument::Unavailable => return Err(args.unavailable(index)),
            Argument::Deferred(_) => return Err(args.is_lazy(index)),
        };

        let list = instance.as_list().ok_or_else(|| InjectError::NotAList {
            consumer: args.consumer().to_string(),
            index,
        })?;
        list.downcast_all::<T>().map_err(|actual_type| {
            RequireError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            }
            .into()
        })
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }
}
