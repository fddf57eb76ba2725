use std::{any::type_name, ops::Deref, sync::Arc};

use wrapp_injector::{Args, DependencyInfo, InjectError, RequireError, Resolver};

use crate::provider::ConfigProvider;

/// A wrapper type to allow for config injections
///
/// This provides a simple way to retrieve configs from the config registry,
/// and inject them into a constructor as a dependency.
/// The registry is provided by [crate::ConfigModule::for_root].
///
/// # Example
/// ```rust
/// use wrapp_config::Config;
/// use wrapp_injector::{Args, DependencyInfo, DynError, Provide, Resolver};
///
/// pub struct MailerConfig {
///     enabled: bool,
/// }
///
/// pub struct Mailer {
///     config: Config<MailerConfig>,
/// }
///
/// impl Provide for Mailer {
///     fn dependencies() -> Vec<DependencyInfo> {
///         vec![Config::<MailerConfig>::dependency_info()]
///     }
///
///     fn construct(args: &mut Args) -> Result<Self, DynError> {
///         Ok(Mailer { config: args.resolve()? })
///     }
/// }
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Resolver for Config<T> {
    fn resolve(args: &mut Args) -> Result<Self, InjectError>
    where
        Self: Sized,
    {
        let config_name = type_name::<T>();
        let config_provider = args.resolve::<Arc<ConfigProvider>>()?;

        let config: Arc<T> = config_provider
            .get_config()
            .map_err(|e| InjectError::Other(Box::new(e)))?
            .ok_or_else(|| {
                InjectError::RequireError(RequireError::UnknownElement(config_name.to_string()))
            })?;

        Ok(Config { inner: config })
    }

    /// Configs are read from the registry
    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<ConfigProvider>()
    }
}
