use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::future::join_all;
use wrapp_injector::{
    ApplicationContext, Args, ContextId, ContextIdFactory, ContextIdResolver, ContextIdStrategy,
    DependencyInfo, DynError, HostComponentInfo, Lazy, ModuleDeclaration, ModuleDefinition,
    ModuleMetadata, Provide, ProviderDeclaration, RequestNotRegistered, RequireError,
    ResolveError, Scope, ScopeOptions, Token, REQUEST,
};

// At most one instantiation per context

static SLOW_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

struct Slow;

#[derive(Default)]
struct SlowModule;
impl ModuleDefinition for SlowModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(
            ProviderDeclaration::factory("SLOW", Vec::new(), |_: Args| async {
                SLOW_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, DynError>(Slow)
            })
            .scope(Scope::Request),
        )
    }
}

#[tokio::test]
async fn concurrent_resolutions_share_one_instance() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<SlowModule>())
        .build()
        .await
        .unwrap();
    let context_id = ContextId::new();

    let instances =
        join_all((0..10).map(|_| app.resolve::<Slow>("SLOW", Some(context_id.clone())))).await;
    let instances = instances.into_iter().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(SLOW_CONSTRUCTED.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
}

struct Clock;
struct Report;

/// Waits for its clock, the report is injected lazily
struct ReportView {
    report: Lazy<Report>,
}
impl Provide for ReportView {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![
            DependencyInfo::token("CLOCK"),
            DependencyInfo::token("REPORT").lazy(),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        let _: Arc<Clock> = args.resolve()?;
        Ok(ReportView {
            report: args.resolve()?,
        })
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

#[derive(Default)]
struct ReportModule;
impl ModuleDefinition for ReportModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(
                ProviderDeclaration::factory("CLOCK", Vec::new(), |_: Args| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, DynError>(Clock)
                })
                .scope(Scope::Request),
            )
            .provider(
                ProviderDeclaration::factory("REPORT", Vec::new(), |_: Args| async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, DynError>(Report)
                })
                .scope(Scope::Request),
            )
            .provider(ProviderDeclaration::class::<ReportView>())
    }
}

#[tokio::test]
async fn waiting_resolutions_receive_filled_lazy_dependencies() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<ReportModule>())
        .build()
        .await
        .unwrap();
    let context_id = ContextId::new();

    let resolve = || app.resolve::<ReportView>(Token::of::<ReportView>(), Some(context_id.clone()));
    let (first, second) = tokio::join!(resolve(), resolve());
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.report.is_resolved());
    assert!(second.report.is_resolved());

    let late = resolve().await.unwrap();
    assert!(Arc::ptr_eq(late.report.get(), first.report.get()));
}

// Static and request caching

struct Repository;
impl Provide for Repository {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Repository)
    }
}

struct RequestHandler {
    repository: Arc<Repository>,
}
impl Provide for RequestHandler {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Repository>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(RequestHandler {
            repository: args.resolve()?,
        })
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

/// Singleton by declaration, request scoped through its handler
struct HandlerFacade {
    handler: Arc<RequestHandler>,
}
impl Provide for HandlerFacade {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<RequestHandler>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(HandlerFacade {
            handler: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct RequestModule;
impl ModuleDefinition for RequestModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Repository>())
            .provider(ProviderDeclaration::class::<RequestHandler>())
            .provider(ProviderDeclaration::class::<HandlerFacade>())
    }
}

#[tokio::test]
async fn request_scoped_components_are_cached_per_context() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<RequestModule>())
        .build()
        .await
        .unwrap();
    let first_context = ContextId::new();
    let second_context = ContextId::new();

    let first = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(first_context.clone()))
        .await
        .unwrap();
    let first_again = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(first_context.clone()))
        .await
        .unwrap();
    let second = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(second_context))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &first_again));
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.repository, &second.repository));
    assert!(Arc::ptr_eq(&first.repository, &app.require::<Repository>().unwrap()));

    let facade = app
        .resolve::<HandlerFacade>(Token::of::<HandlerFacade>(), Some(first_context.clone()))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&facade.handler, &first));

    app.release_context(&first_context);
    let released = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(first_context))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &released));
}

#[tokio::test]
async fn request_scope_propagates_to_consumers() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<RequestModule>())
        .build()
        .await
        .unwrap();

    assert!(matches!(
        app.require::<RequestHandler>(),
        Err(RequireError::InvalidScope(_))
    ));
    assert!(matches!(
        app.require::<HandlerFacade>(),
        Err(RequireError::InvalidScope(_))
    ));
    assert!(app.require::<Repository>().is_ok());
}

// Transient fan-out

struct Helper;
impl Provide for Helper {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Helper)
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::transient()
    }
}

struct ConsumerA {
    helper: Arc<Helper>,
}
impl Provide for ConsumerA {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Helper>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(ConsumerA {
            helper: args.resolve()?,
        })
    }
}

struct ConsumerB {
    helper: Arc<Helper>,
    again: Arc<Helper>,
}
impl Provide for ConsumerB {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Helper>(), DependencyInfo::of::<Helper>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(ConsumerB {
            helper: args.resolve()?,
            again: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct TransientModule;
impl ModuleDefinition for TransientModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Helper>())
            .provider(ProviderDeclaration::class::<ConsumerA>())
            .provider(ProviderDeclaration::class::<ConsumerB>())
    }
}

#[tokio::test]
async fn transient_components_are_created_per_consumer() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<TransientModule>())
        .build()
        .await
        .unwrap();

    let a = app.require::<ConsumerA>().unwrap();
    let b = app.require::<ConsumerB>().unwrap();
    assert!(!Arc::ptr_eq(&a.helper, &b.helper));
    assert!(Arc::ptr_eq(&b.helper, &b.again));

    assert!(matches!(app.require::<Helper>(), Err(RequireError::InvalidScope(_))));
    let first = app.resolve::<Helper>(Token::of::<Helper>(), None).await.unwrap();
    let second = app.resolve::<Helper>(Token::of::<Helper>(), None).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

// Durable contexts

static TENANT_CACHES: AtomicUsize = AtomicUsize::new(0);

struct TenantCache;
impl Provide for TenantCache {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        TENANT_CACHES.fetch_add(1, Ordering::SeqCst);
        Ok(TenantCache)
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request().durable()
    }
}

#[derive(Default)]
struct TenantModule;
impl ModuleDefinition for TenantModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<TenantCache>())
            .provider(ProviderDeclaration::class::<RequestHandler>())
            .provider(ProviderDeclaration::class::<Repository>())
    }
}

#[derive(Default)]
struct TenantStrategy {
    tenants: Mutex<HashMap<&'static str, ContextId>>,
}

impl ContextIdStrategy<&'static str> for TenantStrategy {
    fn attach(&self, context_id: &ContextId, tenant: &&'static str) -> Option<ContextIdResolver> {
        let tenant_context = self
            .tenants
            .lock()
            .unwrap()
            .entry(*tenant)
            .or_default()
            .clone();
        let request_context = context_id.clone();
        Some(Arc::new(move |info: &HostComponentInfo| {
            if info.is_tree_durable {
                tenant_context.clone()
            } else {
                request_context.clone()
            }
        }))
    }
}

#[tokio::test]
async fn durable_components_are_shared_per_tenant() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<TenantModule>())
        .build()
        .await
        .unwrap();
    let strategy = TenantStrategy::default();

    let first = ContextIdFactory::create_for(&strategy, &"acme");
    let second = ContextIdFactory::create_for(&strategy, &"acme");
    let other = ContextIdFactory::create_for(&strategy, &"globex");

    let resolve = |context_id: ContextId| {
        app.resolve::<TenantCache>(Token::of::<TenantCache>(), Some(context_id))
    };
    let first_cache = resolve(first.clone()).await.unwrap();
    let second_cache = resolve(second.clone()).await.unwrap();
    let other_cache = resolve(other).await.unwrap();

    assert!(Arc::ptr_eq(&first_cache, &second_cache));
    assert!(!Arc::ptr_eq(&first_cache, &other_cache));
    assert_eq!(TENANT_CACHES.load(Ordering::SeqCst), 2);

    let first_handler = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(first))
        .await
        .unwrap();
    let second_handler = app
        .resolve::<RequestHandler>(Token::of::<RequestHandler>(), Some(second))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first_handler, &second_handler));
}

// Request payload

#[derive(Debug)]
struct TenantName {
    name: Arc<String>,
}
impl Provide for TenantName {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::token(REQUEST)]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(TenantName {
            name: args.resolve()?,
        })
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

#[derive(Default)]
struct PayloadModule;
impl ModuleDefinition for PayloadModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(ProviderDeclaration::class::<TenantName>())
    }
}

#[tokio::test]
async fn request_payloads_are_injected() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<PayloadModule>())
        .build()
        .await
        .unwrap();
    let context_id = ContextId::new();
    app.register_request_by_context_id(String::from("acme"), &context_id)
        .unwrap();

    let tenant = app
        .resolve::<TenantName>(Token::of::<TenantName>(), Some(context_id))
        .await
        .unwrap();
    assert_eq!(tenant.name.as_str(), "acme");

    let error = app
        .resolve::<TenantName>(Token::of::<TenantName>(), Some(ContextId::new()))
        .await
        .unwrap_err();
    let RequireError::Resolve(ResolveError::Provider(cause)) = error else {
        panic!("expected the REQUEST factory to fail, got {error:?}");
    };
    assert!(cause.downcast_ref::<RequestNotRegistered>().is_some());
}
