use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
};

use tracing::debug;
use uuid::Uuid;

use crate::{
    compiler::{ModuleToken, ModuleType},
    container::ModulesContainer,
    errors::ScanError,
    module_ref::ModuleRef,
    provider::{ClassDescriptor, EnhancerSubtype, ProviderDeclaration},
    token::Token,
    types::{Instance, TypeInfo},
    wrapper::InstanceWrapper,
};

pub type ModuleId = Uuid;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Wrappers by token, in registration order
#[derive(Default)]
pub(crate) struct Collection {
    entries: Vec<Arc<InstanceWrapper>>,
    index: HashMap<Token, usize>,
}

impl Collection {
    /// Inserts the wrapper, replacing an existing one with the same token in place
    fn insert(&mut self, wrapper: Arc<InstanceWrapper>) -> Arc<InstanceWrapper> {
        match self.index.get(&wrapper.token) {
            Some(position) => self.entries[*position] = wrapper.clone(),
            None => {
                self.index.insert(wrapper.token.clone(), self.entries.len());
                self.entries.push(wrapper.clone());
            }
        }
        wrapper
    }

    pub(crate) fn get(&self, token: &Token) -> Option<&Arc<InstanceWrapper>> {
        self.index.get(token).map(|position| &self.entries[*position])
    }

    pub(crate) fn contains(&self, token: &Token) -> bool {
        self.index.contains_key(token)
    }

    pub(crate) fn values(&self) -> Vec<Arc<InstanceWrapper>> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A node of the module graph
pub struct Module {
    id: ModuleId,
    token: ModuleToken,
    module_type: ModuleType,
    /// Module types this module was first imported through
    scope: Vec<TypeInfo>,
    this: Weak<Module>,
    distance: AtomicUsize,
    global: AtomicBool,
    providers: RwLock<Collection>,
    injectables: RwLock<Collection>,
    controllers: RwLock<Collection>,
    imports: RwLock<Vec<Weak<Module>>>,
    exports: RwLock<HashSet<Token>>,
    /// Element tokens of each multi provider
    multi: RwLock<HashMap<Token, Vec<Token>>>,
}

impl Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name())
            .field("id", &self.id)
            .field("providers", &read(&self.providers).len())
            .field("global", &self.is_global())
            .finish()
    }
}

impl Module {
    /// Creates the module seeded with its own type and its [ModuleRef]
    pub(crate) fn new(
        token: ModuleToken,
        module_type: ModuleType,
        scope: Vec<TypeInfo>,
        container: Weak<ModulesContainer>,
    ) -> Arc<Module> {
        let module = Arc::new_cyclic(|this| Module {
            id: Uuid::new_v4(),
            token,
            module_type,
            scope,
            this: this.clone(),
            distance: AtomicUsize::new(0),
            global: AtomicBool::new(false),
            providers: RwLock::new(Collection::default()),
            injectables: RwLock::new(Collection::default()),
            controllers: RwLock::new(Collection::default()),
            imports: RwLock::new(Vec::new()),
            exports: RwLock::new(HashSet::new()),
            multi: RwLock::new(HashMap::new()),
        });

        let own_type = InstanceWrapper::from_class(
            module.module_type.token(),
            module.module_type.class(),
            None,
            &module,
        );
        let module_ref = InstanceWrapper::from_value(
            Token::of::<ModuleRef>(),
            Instance::new(ModuleRef::new(container, module.this.clone())),
            &module,
        );
        {
            let mut providers = write(&module.providers);
            providers.insert(Arc::new(own_type));
            providers.insert(Arc::new(module_ref));
        }
        module
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn token(&self) -> &ModuleToken {
        &self.token
    }

    pub fn name(&self) -> &'static str {
        self.module_type.name()
    }

    pub fn module_type(&self) -> &ModuleType {
        &self.module_type
    }

    pub fn type_info(&self) -> TypeInfo {
        self.module_type.info
    }

    /// The scope its imports are compiled with
    pub(crate) fn import_scope(&self) -> Vec<TypeInfo> {
        let mut scope = self.scope.clone();
        scope.push(self.module_type.info);
        scope
    }

    pub(crate) fn weak(&self) -> Weak<Module> {
        self.this.clone()
    }

    pub fn distance(&self) -> usize {
        self.distance.load(Ordering::Relaxed)
    }

    pub(crate) fn set_distance(&self, distance: usize) {
        self.distance.store(distance, Ordering::Relaxed);
    }

    pub fn is_global(&self) -> bool {
        self.global.load(Ordering::Relaxed)
    }

    pub(crate) fn set_global(&self) {
        self.global.store(true, Ordering::Relaxed);
    }

    /// Registers a provider declaration
    pub(crate) fn add_provider(
        &self,
        declaration: &ProviderDeclaration,
    ) -> Result<Arc<InstanceWrapper>, ScanError> {
        self.validate_class(declaration)?;

        let token = declaration.provide.clone();
        let mut multi = write(&self.multi);
        let is_registered_multi = multi.contains_key(&token);
        let is_registered = read(&self.providers).contains(&token);

        if declaration.multi != is_registered_multi && (is_registered_multi || is_registered) {
            return Err(ScanError::MixedMultiProvider {
                token: token.name(),
                module: self.name().to_string(),
            });
        }

        if !declaration.multi {
            let wrapper = InstanceWrapper::from_provider(declaration, self);
            debug!("Registered provider {} in {}", wrapper.name, self.name());
            return Ok(write(&self.providers).insert(Arc::new(wrapper)));
        }

        let elements = multi.entry(token.clone()).or_default();
        let element_token = Token::Element {
            of: Arc::new(token.clone()),
            index: elements.len(),
        };
        elements.push(element_token.clone());

        let mut element = declaration.clone();
        element.provide = element_token;
        element.multi = false;
        let element = InstanceWrapper::from_provider(&element, self);
        // The aggregate is rebuilt so its inject list covers every element
        let aggregate = InstanceWrapper::multi(token, &elements[..], self);
        debug!(
            "Registered multi provider {} [{}] in {}",
            aggregate.name,
            elements.len(),
            self.name()
        );

        let mut providers = write(&self.providers);
        providers.insert(Arc::new(element));
        Ok(providers.insert(Arc::new(aggregate)))
    }

    fn validate_class(&self, declaration: &ProviderDeclaration) -> Result<(), ScanError> {
        if let crate::provider::Provider::Class(class) = &declaration.provider {
            if !class.is_constructible() {
                return Err(ScanError::InvalidClass {
                    name: class.name().to_string(),
                    module: self.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Registers a class enhancer, shared if the class is already registered
    pub(crate) fn add_injectable(
        &self,
        class: &ClassDescriptor,
        subtype: EnhancerSubtype,
        enhanced: Option<&Arc<InstanceWrapper>>,
    ) -> Result<Arc<InstanceWrapper>, ScanError> {
        if !class.is_constructible() {
            return Err(ScanError::InvalidClass {
                name: class.name().to_string(),
                module: self.name().to_string(),
            });
        }

        let token = Token::Type(class.info);
        let existing = read(&self.injectables).get(&token).cloned();
        let wrapper = match existing {
            Some(wrapper) => wrapper,
            None => {
                let wrapper = InstanceWrapper::from_class(token, class, Some(subtype), self);
                debug!("Registered {:?} {} in {}", subtype, wrapper.name, self.name());
                write(&self.injectables).insert(Arc::new(wrapper))
            }
        };

        if let Some(enhanced) = enhanced {
            enhanced.add_enhancer(&wrapper);
        }
        Ok(wrapper)
    }

    /// Registers a provider of a global enhancer token as injectable under a generated token
    pub(crate) fn add_global_enhancer(
        &self,
        declaration: &ProviderDeclaration,
        subtype: EnhancerSubtype,
    ) -> Result<Arc<InstanceWrapper>, ScanError> {
        self.validate_class(declaration)?;

        let mut declaration = declaration.clone();
        declaration.provide = Token::named(format!(
            "{} (UUID: {})",
            subtype.global_token(),
            Uuid::new_v4()
        ));
        let mut wrapper = InstanceWrapper::from_provider(&declaration, self);
        wrapper.subtype = Some(subtype);
        debug!("Registered global {:?} {} in {}", subtype, wrapper.name, self.name());
        Ok(write(&self.injectables).insert(Arc::new(wrapper)))
    }

    pub(crate) fn add_controller(&self, class: &ClassDescriptor) -> Result<Arc<InstanceWrapper>, ScanError> {
        if !class.is_constructible() {
            return Err(ScanError::InvalidClass {
                name: class.name().to_string(),
                module: self.name().to_string(),
            });
        }
        let wrapper = InstanceWrapper::from_class(Token::Type(class.info), class, None, self);
        debug!("Registered controller {} in {}", wrapper.name, self.name());
        Ok(write(&self.controllers).insert(Arc::new(wrapper)))
    }

    pub(crate) fn add_import(&self, module: &Arc<Module>) {
        let mut imports = write(&self.imports);
        if imports
            .iter()
            .filter_map(Weak::upgrade)
            .any(|import| import.id == module.id)
        {
            return;
        }
        imports.push(Arc::downgrade(module));
    }

    /// Adds an export, which has to be a provider or the type of an imported module
    pub(crate) fn add_export(&self, token: Token) -> Result<(), ScanError> {
        let is_provider = read(&self.providers).contains(&token);
        let is_imported_module = || self.imports().iter().any(|import| import.module_type.token() == token);
        if !is_provider && !is_imported_module() {
            return Err(ScanError::UnknownExport {
                token: token.name(),
                module: self.name().to_string(),
            });
        }
        write(&self.exports).insert(token);
        Ok(())
    }

    pub fn exports(&self, token: &Token) -> bool {
        read(&self.exports).contains(token)
    }

    /// Imported modules in declaration order
    pub fn imports(&self) -> Vec<Arc<Module>> {
        read(&self.imports).iter().filter_map(Weak::upgrade).collect()
    }

    pub fn provider(&self, token: &Token) -> Option<Arc<InstanceWrapper>> {
        read(&self.providers).get(token).cloned()
    }

    pub fn has_provider(&self, token: &Token) -> bool {
        read(&self.providers).contains(token)
    }

    pub fn providers(&self) -> Vec<Arc<InstanceWrapper>> {
        read(&self.providers).values()
    }

    pub fn injectables(&self) -> Vec<Arc<InstanceWrapper>> {
        read(&self.injectables).values()
    }

    pub fn controllers(&self) -> Vec<Arc<InstanceWrapper>> {
        read(&self.controllers).values()
    }

    /// Finds a wrapper of any collection by its token
    pub(crate) fn find(&self, token: &Token) -> Option<Arc<InstanceWrapper>> {
        self.provider(token)
            .or_else(|| read(&self.injectables).get(token).cloned())
            .or_else(|| read(&self.controllers).get(token).cloned())
    }

    /// Whether the wrapper is still registered in one of the collections
    pub(crate) fn hosts(&self, wrapper: &InstanceWrapper) -> bool {
        self.find(&wrapper.token)
            .is_some_and(|registered| registered.id == wrapper.id)
    }

    /// All wrappers, providers first
    pub fn wrappers(&self) -> Vec<Arc<InstanceWrapper>> {
        let mut wrappers = self.providers();
        wrappers.extend(self.injectables());
        wrappers.extend(self.controllers());
        wrappers
    }
}
