use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use wrapp_injector::{
    ApplicationContext, Args, ContextId, DependencyInfo, DynError, LazyModuleLoader,
    ModuleDeclaration, ModuleDefinition, ModuleMetadata, ModuleRef, Provide, ProviderDeclaration,
    RequireError, Scope, ScopeOptions, Token, REQUEST,
};

#[derive(Debug)]
struct Logger;
impl Provide for Logger {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Logger)
    }
}

#[derive(Default)]
struct CoreModule;
impl ModuleDefinition for CoreModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Logger>())
            .provider(ProviderDeclaration::value("INTERNAL", 42_u32))
            .export(Token::of::<Logger>())
    }

    fn global() -> bool {
        true
    }
}

/// Holds the reference of its own module
struct Registry {
    module_ref: Arc<ModuleRef>,
}
impl Provide for Registry {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<ModuleRef>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Registry {
            module_ref: args.resolve()?,
        })
    }
}

struct Session;
impl Provide for Session {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Session)
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

/// Never registered, only created through a module reference
struct Report {
    logger: Arc<Logger>,
}
impl Provide for Report {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Logger>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Report {
            logger: args.resolve()?,
        })
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::transient()
    }
}

#[derive(Default)]
struct FeatureModule;
impl ModuleDefinition for FeatureModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Registry>())
            .provider(ProviderDeclaration::class::<Session>())
    }
}

#[derive(Default)]
struct AppModule;
impl ModuleDefinition for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import(ModuleDeclaration::of::<CoreModule>())
            .import(ModuleDeclaration::of::<FeatureModule>())
    }
}

async fn build() -> ApplicationContext {
    ApplicationContext::builder(ModuleDeclaration::of::<AppModule>())
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn injected_module_refs_see_their_module_scope() {
    let app = build().await;
    let module_ref = app.require::<Registry>().unwrap().module_ref.clone();
    assert_eq!(module_ref.module().unwrap().name(), "FeatureModule");

    let logger = module_ref.get::<Logger>(Token::of::<Logger>()).unwrap();
    assert!(Arc::ptr_eq(&logger, &app.require::<Logger>().unwrap()));
    assert!(matches!(
        module_ref.get::<u32>("INTERNAL"),
        Err(RequireError::UnknownElement(_))
    ));

    assert!(matches!(
        module_ref.get::<Session>(Token::of::<Session>()),
        Err(RequireError::InvalidScope(_))
    ));
    let context_id = ContextId::new();
    let session = module_ref
        .resolve::<Session>(Token::of::<Session>(), Some(context_id.clone()))
        .await
        .unwrap();
    let same = module_ref
        .resolve::<Session>(Token::of::<Session>(), Some(context_id))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&session, &same));

    assert_eq!(
        module_ref.introspect(Token::of::<Session>()).unwrap().scope,
        Scope::Request
    );
    assert_eq!(
        module_ref.introspect(Token::of::<Logger>()).unwrap().scope,
        Scope::Singleton
    );
}

#[tokio::test]
async fn request_payloads_are_registered_through_module_refs() {
    let app = build().await;
    let module_ref = app.require::<Registry>().unwrap().module_ref.clone();
    let context_id = ContextId::new();
    module_ref
        .register_request_by_context_id(String::from("acme"), &context_id)
        .unwrap();

    let request = module_ref
        .resolve::<String>(REQUEST, Some(context_id))
        .await
        .unwrap();
    assert_eq!(request.as_str(), "acme");
}

#[tokio::test]
async fn created_instances_are_never_cached() {
    let app = build().await;
    let module_ref = app.select(ModuleDeclaration::of::<FeatureModule>()).unwrap();

    let first = module_ref.create::<Report>().await.unwrap();
    let second = module_ref.create::<Report>().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.logger, &app.require::<Logger>().unwrap()));
    assert!(matches!(
        module_ref.get::<Report>(Token::of::<Report>()),
        Err(RequireError::UnknownElement(_))
    ));
}

#[tokio::test]
async fn selected_modules_expose_their_own_providers() {
    let app = build().await;
    let core = app.select(ModuleDeclaration::of::<CoreModule>()).unwrap();
    assert_eq!(*core.get::<u32>("INTERNAL").unwrap(), 42);

    let feature = app.select(ModuleDeclaration::of::<FeatureModule>()).unwrap();
    assert!(feature.get::<u32>("INTERNAL").is_err());

    #[derive(Default)]
    struct UnknownModule;
    impl ModuleDefinition for UnknownModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }
    assert!(matches!(
        app.select(ModuleDeclaration::of::<UnknownModule>()),
        Err(RequireError::UnknownElement(_))
    ));
}

// Lazy loading

static REPORTERS_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

struct Reporter {
    logger: Arc<Logger>,
}
impl Provide for Reporter {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Logger>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        REPORTERS_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Reporter {
            logger: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct ReportsModule;
impl ModuleDefinition for ReportsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(ProviderDeclaration::class::<Reporter>())
    }
}

#[tokio::test]
async fn lazily_loaded_modules_are_loaded_once() {
    let app = build().await;
    let loader = app.lazy_loader();

    let first = loader
        .load(|| async { ModuleDeclaration::of::<ReportsModule>() })
        .await
        .unwrap();
    let second = loader
        .load(|| async { ModuleDeclaration::of::<ReportsModule>() })
        .await
        .unwrap();

    assert_eq!(first.module().unwrap().id(), second.module().unwrap().id());
    assert_eq!(REPORTERS_CONSTRUCTED.load(Ordering::SeqCst), 1);

    let reporter = first.get::<Reporter>(Token::of::<Reporter>()).unwrap();
    assert!(Arc::ptr_eq(&reporter.logger, &app.require::<Logger>().unwrap()));
    assert!(Arc::ptr_eq(&reporter, &app.require::<Reporter>().unwrap()));
}

/// Loads the archive module on demand
struct ArchiveGateway {
    loader: Arc<LazyModuleLoader>,
}
impl Provide for ArchiveGateway {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<LazyModuleLoader>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(ArchiveGateway {
            loader: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct ArchiveModule;
impl ModuleDefinition for ArchiveModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(ProviderDeclaration::value("RETENTION_DAYS", 30_u32))
    }
}

#[derive(Default)]
struct GatewayModule;
impl ModuleDefinition for GatewayModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import(ModuleDeclaration::of::<CoreModule>())
            .provider(ProviderDeclaration::class::<ArchiveGateway>())
    }
}

#[tokio::test]
async fn the_lazy_loader_is_injectable() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<GatewayModule>())
        .build()
        .await
        .unwrap();
    let gateway = app.require::<ArchiveGateway>().unwrap();

    let archive = gateway
        .loader
        .load(|| async { ModuleDeclaration::of::<ArchiveModule>() })
        .await
        .unwrap();
    assert_eq!(archive.module().unwrap().name(), "ArchiveModule");
    assert_eq!(*archive.get::<u32>("RETENTION_DAYS").unwrap(), 30);
}
