//! Normalizes module declarations into a canonical type, token and metadata triple.

use std::fmt::{Debug, Display};

use sha2::{Digest, Sha256};

use crate::{
    provider::{ClassDescriptor, ProviderDeclaration},
    token::{ForwardRef, Token},
    types::{Injectable, TypeInfo},
};

/// A module type with its declared metadata
///
/// # Example
/// ```rust
/// use wrapp_injector::{ModuleDefinition, ModuleMetadata, ProviderDeclaration};
///
/// #[derive(Default)]
/// struct Logger;
/// # impl wrapp_injector::Provide for Logger {
/// #     fn construct(_: &mut wrapp_injector::Args) -> Result<Self, wrapp_injector::DynError> { Ok(Logger) }
/// # }
///
/// #[derive(Default)]
/// struct CoreModule;
/// impl ModuleDefinition for CoreModule {
///     fn metadata() -> ModuleMetadata {
///         ModuleMetadata::new()
///             .provider(ProviderDeclaration::class::<Logger>())
///             .export(wrapp_injector::Token::of::<Logger>())
///     }
/// }
/// ```
pub trait ModuleDefinition: Injectable + Default {
    fn metadata() -> ModuleMetadata;

    /// Exports of global modules are visible to every module
    fn global() -> bool {
        false
    }

    /// Single scoped modules are instantiated once per import path
    fn single_scoped() -> bool {
        false
    }
}

/// Type erased [ModuleDefinition]
#[derive(Clone)]
pub struct ModuleType {
    pub info: TypeInfo,
    metadata: fn() -> ModuleMetadata,
    global: fn() -> bool,
    single_scoped: fn() -> bool,
    class: ClassDescriptor,
}

impl Debug for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModuleType").field(&self.info.type_name).finish()
    }
}

impl ModuleType {
    pub fn of<M: ModuleDefinition>() -> Self {
        ModuleType {
            info: TypeInfo::of::<M>(),
            metadata: M::metadata,
            global: M::global,
            single_scoped: M::single_scoped,
            class: ClassDescriptor::of_default::<M>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.info.short_name()
    }

    pub fn metadata(&self) -> ModuleMetadata {
        (self.metadata)()
    }

    pub fn is_global(&self) -> bool {
        (self.global)()
    }

    pub fn is_single_scoped(&self) -> bool {
        (self.single_scoped)()
    }

    /// The token the module type is provided and exported under
    pub fn token(&self) -> Token {
        Token::Type(self.info)
    }

    pub(crate) fn class(&self) -> &ClassDescriptor {
        &self.class
    }
}

/// Something a module exports
#[derive(Clone, Debug)]
pub enum ExportDeclaration {
    Token(Token),
    /// Re-exports an imported module
    Module(ModuleDeclaration),
}

impl ExportDeclaration {
    /// The token checked against providers and imported modules
    pub(crate) fn token(&self) -> Option<Token> {
        match self {
            ExportDeclaration::Token(token) => Some(token.clone()),
            ExportDeclaration::Module(module) => module.module_type().map(|module| module.token()),
        }
    }
}

impl From<Token> for ExportDeclaration {
    fn from(token: Token) -> Self {
        ExportDeclaration::Token(token)
    }
}

impl From<&'static str> for ExportDeclaration {
    fn from(name: &'static str) -> Self {
        ExportDeclaration::Token(name.into())
    }
}

impl From<ModuleDeclaration> for ExportDeclaration {
    fn from(module: ModuleDeclaration) -> Self {
        ExportDeclaration::Module(module)
    }
}

/// Imports, providers, controllers and exports of a module
#[derive(Clone, Debug, Default)]
pub struct ModuleMetadata {
    pub imports: Vec<ModuleDeclaration>,
    pub providers: Vec<ProviderDeclaration>,
    pub controllers: Vec<ClassDescriptor>,
    pub exports: Vec<ExportDeclaration>,
}

impl ModuleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(mut self, module: impl Into<ModuleDeclaration>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<ProviderDeclaration>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn controller(mut self, controller: ClassDescriptor) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn export(mut self, export: impl Into<ExportDeclaration>) -> Self {
        self.exports.push(export.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.providers.is_empty()
            && self.controllers.is_empty()
            && self.exports.is_empty()
    }

    /// Appends the other metadata, keeping declaration order
    pub(crate) fn merge(mut self, other: ModuleMetadata) -> Self {
        self.imports.extend(other.imports);
        self.providers.extend(other.providers);
        self.controllers.extend(other.controllers);
        self.exports.extend(other.exports);
        self
    }
}

/// A module configured at runtime, e.g. by a `for_root` function
#[derive(Clone, Debug)]
pub struct DynamicModule {
    pub module: ModuleType,
    pub metadata: ModuleMetadata,
    pub global: bool,
}

impl DynamicModule {
    pub fn new<M: ModuleDefinition>() -> Self {
        DynamicModule {
            module: ModuleType::of::<M>(),
            metadata: ModuleMetadata::new(),
            global: false,
        }
    }

    pub fn import(mut self, module: impl Into<ModuleDeclaration>) -> Self {
        self.metadata.imports.push(module.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<ProviderDeclaration>) -> Self {
        self.metadata.providers.push(provider.into());
        self
    }

    pub fn controller(mut self, controller: ClassDescriptor) -> Self {
        self.metadata.controllers.push(controller);
        self
    }

    pub fn export(mut self, export: impl Into<ExportDeclaration>) -> Self {
        self.metadata.exports.push(export.into());
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

/// A module declaration as written in an import list
#[derive(Clone, Debug)]
pub enum ModuleDeclaration {
    Static(ModuleType),
    Dynamic(Box<DynamicModule>),
    /// Resolved when the module graph is scanned, used for modules importing each other
    Forward(ForwardRef<ModuleDeclaration>),
}

impl ModuleDeclaration {
    pub fn of<M: ModuleDefinition>() -> Self {
        ModuleDeclaration::Static(ModuleType::of::<M>())
    }

    pub fn forward(resolve: impl Fn() -> ModuleDeclaration + Send + Sync + 'static) -> Self {
        ModuleDeclaration::Forward(crate::token::forward_ref(resolve))
    }

    /// Resolves forward references, None if one resolves to nothing
    pub fn resolve(&self) -> Option<ModuleDeclaration> {
        match self {
            ModuleDeclaration::Forward(forward) => forward.resolve()?.resolve(),
            declaration => Some(declaration.clone()),
        }
    }

    pub fn module_type(&self) -> Option<ModuleType> {
        match self.resolve()? {
            ModuleDeclaration::Static(module) => Some(module),
            ModuleDeclaration::Dynamic(dynamic) => Some(dynamic.module),
            ModuleDeclaration::Forward(_) => None,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, ModuleDeclaration::Forward(_))
    }
}

impl From<DynamicModule> for ModuleDeclaration {
    fn from(module: DynamicModule) -> Self {
        ModuleDeclaration::Dynamic(Box::new(module))
    }
}

impl From<ModuleType> for ModuleDeclaration {
    fn from(module: ModuleType) -> Self {
        ModuleDeclaration::Static(module)
    }
}

/// Deterministic identity of a compiled module
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleToken(String);

impl ModuleToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModuleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of [ModuleCompiler::compile]
#[derive(Clone, Debug)]
pub struct CompiledModule {
    pub module_type: ModuleType,
    pub token: ModuleToken,
    pub dynamic_metadata: Option<ModuleMetadata>,
    /// Set for dynamic modules declared global
    pub global: bool,
}

impl CompiledModule {
    /// Static metadata of the type followed by the dynamic metadata
    pub fn metadata(&self) -> ModuleMetadata {
        let metadata = self.module_type.metadata();
        match &self.dynamic_metadata {
            Some(dynamic) => metadata.merge(dynamic.clone()),
            None => metadata,
        }
    }

    pub fn is_global(&self) -> bool {
        self.global || self.module_type.is_global()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleCompiler;

impl ModuleCompiler {
    pub fn new() -> Self {
        ModuleCompiler
    }

    /// Compiles a declaration, returning None if a forward reference resolves to nothing
    ///
    /// `scope` is the chain of module types the declaration was imported through.
    pub fn compile(&self, declaration: &ModuleDeclaration, scope: &[TypeInfo]) -> Option<CompiledModule> {
        let (module_type, dynamic_metadata, global) = match declaration.resolve()? {
            ModuleDeclaration::Static(module_type) => (module_type, None, false),
            ModuleDeclaration::Dynamic(dynamic) => {
                let DynamicModule {
                    module,
                    metadata,
                    global,
                } = *dynamic;
                (module, Some(metadata), global)
            }
            ModuleDeclaration::Forward(_) => return None,
        };

        let token = self.token(&module_type, dynamic_metadata.as_ref(), global, scope);
        Some(CompiledModule {
            module_type,
            token,
            dynamic_metadata,
            global,
        })
    }

    fn token(
        &self,
        module_type: &ModuleType,
        dynamic_metadata: Option<&ModuleMetadata>,
        global: bool,
        scope: &[TypeInfo],
    ) -> ModuleToken {
        let mut hasher = Sha256::new();
        hasher.update(module_type.token().fingerprint());
        if let Some(metadata) = dynamic_metadata {
            hasher.update(b"|dynamic|");
            hasher.update(self.metadata_fingerprint(metadata, global));
        }
        if module_type.is_single_scoped() {
            hasher.update(b"|scope|");
            for ancestor in scope {
                hasher.update(Token::Type(*ancestor).fingerprint());
                hasher.update(b">");
            }
        }
        ModuleToken(hex::encode(hasher.finalize()))
    }

    fn metadata_fingerprint(&self, metadata: &ModuleMetadata, global: bool) -> String {
        let imports = metadata
            .imports
            .iter()
            .map(|import| self.import_fingerprint(import))
            .collect::<Vec<_>>();
        let providers = metadata
            .providers
            .iter()
            .map(ProviderDeclaration::fingerprint)
            .collect::<Vec<_>>();
        let controllers = metadata
            .controllers
            .iter()
            .map(|controller| Token::Type(controller.info).fingerprint())
            .collect::<Vec<_>>();
        let exports = metadata
            .exports
            .iter()
            .map(|export| match export.token() {
                Some(token) => token.fingerprint(),
                None => "<unresolved>".to_string(),
            })
            .collect::<Vec<_>>();

        format!(
            "imports[{}]providers[{}]controllers[{}]exports[{}]global[{global}]",
            imports.join(";"),
            providers.join(";"),
            controllers.join(";"),
            exports.join(";")
        )
    }

    fn import_fingerprint(&self, import: &ModuleDeclaration) -> String {
        match import {
            // Forward references are not followed, they may point back at the module itself
            ModuleDeclaration::Forward(_) => match import.module_type() {
                Some(module_type) => format!("forward:{}", module_type.token().fingerprint()),
                None => "forward:<unresolved>".to_string(),
            },
            declaration => match self.compile(declaration, &[]) {
                Some(compiled) => compiled.token.to_string(),
                None => "<unresolved>".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        provider::ProviderDeclaration,
        resolver::Args,
        types::DynError,
        Provide,
    };

    #[derive(Default)]
    struct ConfigModule;
    impl ModuleDefinition for ConfigModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    #[derive(Default)]
    struct FeatureModule;
    impl ModuleDefinition for FeatureModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }

        fn single_scoped() -> bool {
            true
        }
    }

    struct Settings;
    impl Provide for Settings {
        fn construct(_: &mut Args) -> Result<Self, DynError> {
            Ok(Settings)
        }
    }

    fn for_root(path: &'static str) -> ModuleDeclaration {
        DynamicModule::new::<ConfigModule>()
            .provider(ProviderDeclaration::value("PATH", path))
            .export("PATH")
            .into()
    }

    #[test]
    fn tokens_are_deterministic() {
        let compiler = ModuleCompiler::new();
        let first = compiler.compile(&for_root("app.toml"), &[]).unwrap();
        let second = compiler.compile(&for_root("app.toml"), &[]).unwrap();
        assert_eq!(first.token, second.token);
        assert_eq!(first.token.as_str().len(), 64);
    }

    #[test]
    fn dynamic_metadata_changes_the_token() {
        let compiler = ModuleCompiler::new();
        let first = compiler.compile(&for_root("app.toml"), &[]).unwrap();
        let other = compiler.compile(&for_root("test.toml"), &[]).unwrap();
        let plain = compiler
            .compile(&ModuleDeclaration::of::<ConfigModule>(), &[])
            .unwrap();
        assert_ne!(first.token, other.token);
        assert_ne!(first.token, plain.token);
        assert!(plain.dynamic_metadata.is_none());
    }

    #[test]
    fn scope_only_matters_for_single_scoped_modules() {
        let compiler = ModuleCompiler::new();
        let parent = [TypeInfo::of::<Settings>()];

        let config = ModuleDeclaration::of::<ConfigModule>();
        assert_eq!(
            compiler.compile(&config, &[]).unwrap().token,
            compiler.compile(&config, &parent).unwrap().token
        );

        let feature = ModuleDeclaration::of::<FeatureModule>();
        assert_ne!(
            compiler.compile(&feature, &[]).unwrap().token,
            compiler.compile(&feature, &parent).unwrap().token
        );
    }

    #[test]
    fn broken_forward_references_compile_to_nothing() {
        let compiler = ModuleCompiler::new();
        let broken = ModuleDeclaration::Forward(ForwardRef::new(|| None));
        assert!(compiler.compile(&broken, &[]).is_none());

        let forward = ModuleDeclaration::forward(ModuleDeclaration::of::<ConfigModule>);
        assert_eq!(
            compiler.compile(&forward, &[]).unwrap().token,
            compiler
                .compile(&ModuleDeclaration::of::<ConfigModule>(), &[])
                .unwrap()
                .token
        );
    }
}
