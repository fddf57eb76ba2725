use std::collections::{HashMap, VecDeque};

use crate::{
    errors::InjectError,
    provider::DependencyInfo,
    types::Instance,
    wrapper::Prototype,
};

pub mod arc;
pub mod lazy;

/// Allows custom behaviour on injection
///
/// A resolver consumes the next argument handed to a constructor or factory
/// and turns it into the type the constructor wants.
pub trait Resolver {
    fn resolve(args: &mut Args) -> Result<Self, InjectError>
    where
        Self: Sized;

    fn dependency_info() -> DependencyInfo;
}

/// A resolved dependency slot
#[derive(Clone, Debug)]
pub(crate) enum Argument {
    Instance(Instance),
    /// An optional dependency which is not registered
    Missing,
    /// Registered, but has no instance in the resolving context
    Unavailable,
    /// A lazy dependency, filled once its target is resolved
    Deferred(Prototype),
}

/// Resolved constructor arguments, consumed in declaration order
#[derive(Debug)]
pub struct Args {
    consumer: String,
    arguments: VecDeque<Argument>,
    next_index: usize,
    count: usize,
}

impl Args {
    pub(crate) fn new(consumer: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Args {
            consumer: consumer.into(),
            count: arguments.len(),
            arguments: arguments.into(),
            next_index: 0,
        }
    }

    /// Resolves the next argument
    pub fn resolve<R: Resolver>(&mut self) -> Result<R, InjectError> {
        R::resolve(self)
    }

    /// Takes the next argument without converting it
    ///
    /// Returns None for a missing optional dependency.
    pub fn instance(&mut self) -> Result<Option<Instance>, InjectError> {
        let (index, argument) = self.next_argument()?;
        match argument {
            Argument::Instance(instance) => Ok(Some(instance)),
            Argument::Missing => Ok(None),
            Argument::Unavailable => Err(self.unavailable(index)),
            Argument::Deferred(prototype) => match prototype.get() {
                Some(instance) => Ok(Some(instance.clone())),
                None => Err(InjectError::ArgumentIsLazy {
                    consumer: self.consumer.clone(),
                    index,
                }),
            },
        }
    }

    /// Name of the component being constructed
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Number of arguments not consumed yet
    pub fn remaining(&self) -> usize {
        self.arguments.len()
    }

    pub(crate) fn next_argument(&mut self) -> Result<(usize, Argument), InjectError> {
        let index = self.next_index;
        let argument = self
            .arguments
            .pop_front()
            .ok_or_else(|| InjectError::ArgumentMissing {
                consumer: self.consumer.clone(),
                index,
                count: self.count,
            })?;
        self.next_index += 1;
        Ok((index, argument))
    }

    pub(crate) fn peek_argument(&self) -> Option<&Argument> {
        self.arguments.front()
    }

    pub(crate) fn unavailable(&self, index: usize) -> InjectError {
        InjectError::ArgumentUnavailable {
            consumer: self.consumer.clone(),
            index,
        }
    }

    pub(crate) fn is_lazy(&self, index: usize) -> InjectError {
        InjectError::ArgumentIsLazy {
            consumer: self.consumer.clone(),
            index,
        }
    }
}

/// Resolved property dependencies, addressed by key
#[derive(Debug)]
pub struct Properties {
    consumer: String,
    values: HashMap<&'static str, Argument>,
}

impl Properties {
    pub(crate) fn new(consumer: impl Into<String>, values: HashMap<&'static str, Argument>) -> Self {
        Properties {
            consumer: consumer.into(),
            values,
        }
    }

    /// Resolves the property with the given key
    pub fn resolve<R: Resolver>(&mut self, key: &str) -> Result<R, InjectError> {
        let argument = self
            .values
            .remove(key)
            .ok_or_else(|| InjectError::PropertyMissing {
                consumer: self.consumer.clone(),
                key: key.to_string(),
            })?;
        Args::new(format!("{}.{key}", self.consumer), vec![argument]).resolve()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
