use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

/// All errors must be Send + Sync so they can cross await points
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A resolved component instance
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}

impl Instance {
    pub fn new<ExistingInstance: Injectable>(instance: ExistingInstance) -> Self {
        Instance {
            info: TypeInfo::of::<ExistingInstance>(),
            instance: Arc::new(instance),
        }
    }

    /// Wraps an instance which is already shared
    pub fn from_arc<ExistingInstance: Injectable>(instance: Arc<ExistingInstance>) -> Self {
        Instance {
            info: TypeInfo::of::<ExistingInstance>(),
            instance,
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    /// Returns true if both handles point at the same object
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// Returns the elements if this instance was produced by a multi provider
    pub fn as_list(&self) -> Option<&InstanceList> {
        self.instance.downcast_ref::<InstanceList>()
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

/// Ordered instances aggregated by a multi provider
#[derive(Clone, Debug, Default)]
pub struct InstanceList(Vec<Instance>);

impl InstanceList {
    pub(crate) fn new(instances: Vec<Instance>) -> Self {
        Self(instances)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.0.iter()
    }

    /// Downcasts every element, failing on the first one of another type
    pub fn downcast_all<T: Injectable>(&self) -> Result<Vec<Arc<T>>, &'static str> {
        self.0.iter().map(Instance::downcast::<T>).collect()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Type name without its module path, generics are kept as is
    pub fn short_name(&self) -> &'static str {
        let base = match self.type_name.find('<') {
            Some(generics) => &self.type_name[..generics],
            None => self.type_name,
        };
        match base.rfind("::") {
            Some(separator) => &self.type_name[separator + 2..],
            None => self.type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Logger;

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(TypeInfo::of::<Logger>().short_name(), "Logger");
        assert_eq!(TypeInfo::of::<Vec<String>>().short_name(), "Vec<alloc::string::String>");
        assert_eq!(TypeInfo::of::<u32>().short_name(), "u32");
    }

    #[test]
    fn downcast_reports_actual_type() {
        let instance = Instance::new(42_u32);
        assert_eq!(*instance.downcast::<u32>().unwrap(), 42);
        assert_eq!(instance.downcast::<String>().unwrap_err(), "u32");
    }

    #[test]
    fn clones_share_identity() {
        let instance = Instance::new(String::from("shared"));
        let other = Instance::new(String::from("shared"));
        assert!(instance.ptr_eq(&instance.clone()));
        assert!(!instance.ptr_eq(&other));
    }
}
