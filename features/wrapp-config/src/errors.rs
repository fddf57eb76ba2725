/// Errors of the config registry
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The required Config is not known
    #[error("The config '{0}' is not registered")]
    ConfigMissing(&'static str),
    /// The Config is already registered
    #[error("The config '{0}' is already registered")]
    ConfigAlreadyRegistered(&'static str),
}
