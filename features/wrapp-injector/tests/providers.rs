use std::sync::Arc;

use thiserror::Error;
use wrapp_injector::{
    forward_ref, ApplicationContext, Args, ClassDescriptor, ContextId, DependencyInfo, DynError,
    EnhancerDeclaration, EnhancerSubtype, InitError, InjectError, Lazy, ModuleDeclaration,
    ModuleDefinition, ModuleMetadata, Properties, Property, PropertyInfo, Provide,
    ProviderDeclaration, RequireError, ResolveError, ScanError, ScopeOptions, Token, APP_GUARD,
};

#[derive(Debug)]
struct Logger;
impl Provide for Logger {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Logger)
    }
}

// Multi providers

struct PluginHost {
    plugins: Vec<Arc<&'static str>>,
}
impl Provide for PluginHost {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::token("PLUGINS")]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(PluginHost {
            plugins: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct PluginModule;
impl ModuleDefinition for PluginModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::value("PLUGINS", "P1").multi())
            .provider(ProviderDeclaration::value("PLUGINS", "P2").multi())
            .provider(ProviderDeclaration::value("PLUGINS", "P3").multi())
            .provider(ProviderDeclaration::class::<PluginHost>())
    }
}

#[tokio::test]
async fn multi_providers_keep_registration_order() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<PluginModule>())
        .build()
        .await
        .unwrap();

    let host = app.require::<PluginHost>().unwrap();
    let names = host.plugins.iter().map(|plugin| **plugin).collect::<Vec<_>>();
    assert_eq!(names, vec!["P1", "P2", "P3"]);
}

#[derive(Default)]
struct MixedPluginModule;
impl ModuleDefinition for MixedPluginModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::value("PLUGINS", "P1").multi())
            .provider(ProviderDeclaration::value("PLUGINS", "P2"))
    }
}

#[tokio::test]
async fn multi_and_single_registrations_do_not_mix() {
    let error = ApplicationContext::builder(ModuleDeclaration::of::<MixedPluginModule>())
        .build()
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        InitError::Scan(ScanError::MixedMultiProvider { .. })
    ));
}

// Factories

#[derive(Debug, Error)]
#[error("database offline")]
struct Offline;

struct Connection {
    logger: Arc<Logger>,
    url: Arc<String>,
}

#[derive(Default)]
struct DatabaseModule;
impl ModuleDefinition for DatabaseModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Logger>())
            .provider(ProviderDeclaration::value("URL", String::from("postgres://localhost")))
            .provider(ProviderDeclaration::factory(
                "CONNECTION",
                vec![DependencyInfo::of::<Logger>(), DependencyInfo::token("URL")],
                |mut args: Args| async move {
                    Ok::<_, DynError>(Connection {
                        logger: args.resolve()?,
                        url: args.resolve()?,
                    })
                },
            ))
    }
}

#[tokio::test]
async fn factories_receive_their_dependencies_in_order() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<DatabaseModule>())
        .build()
        .await
        .unwrap();

    let connection = app.get::<Connection>("CONNECTION").unwrap();
    assert_eq!(connection.url.as_str(), "postgres://localhost");
    assert!(Arc::ptr_eq(&connection.logger, &app.require::<Logger>().unwrap()));
}

#[derive(Default)]
struct OfflineModule;
impl ModuleDefinition for OfflineModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(ProviderDeclaration::factory(
            "CONNECTION",
            Vec::new(),
            |_: Args| async { Err::<Connection, _>(Offline) },
        ))
    }
}

#[tokio::test]
async fn factory_errors_are_kept_as_is() {
    let error = ApplicationContext::builder(ModuleDeclaration::of::<OfflineModule>())
        .build()
        .await
        .unwrap_err();

    let InitError::Resolve(ResolveError::Provider(cause)) = &error else {
        panic!("expected a provider error, got {error:?}");
    };
    assert!(cause.downcast_ref::<Offline>().is_some());
    assert_eq!(error.to_string(), "database offline");
}

// Properties, aliases and optional dependencies

#[derive(Debug)]
struct Mailer;

struct Notifier {
    logger: Property<Arc<Logger>>,
    mailer: Option<Arc<Mailer>>,
}
impl Provide for Notifier {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Mailer>().optional()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Notifier {
            logger: Property::new(),
            mailer: args.resolve()?,
        })
    }

    fn properties() -> Vec<PropertyInfo> {
        vec![PropertyInfo::new("logger", DependencyInfo::of::<Logger>())]
    }

    fn inject_properties(&self, properties: &mut Properties) -> Result<(), InjectError> {
        self.logger.set(properties.resolve("logger")?);
        Ok(())
    }
}

#[derive(Default)]
struct NotifierModule;
impl ModuleDefinition for NotifierModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Logger>())
            .provider(ProviderDeclaration::existing("LOG", Token::of::<Logger>()))
            .provider(ProviderDeclaration::class::<Notifier>())
    }
}

#[tokio::test]
async fn properties_aliases_and_optionals_are_resolved() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<NotifierModule>())
        .build()
        .await
        .unwrap();

    let logger = app.require::<Logger>().unwrap();
    let notifier = app.require::<Notifier>().unwrap();
    assert!(Arc::ptr_eq(notifier.logger.get().unwrap(), &logger));
    assert!(notifier.mailer.is_none());
    assert!(Arc::ptr_eq(&app.get::<Logger>("LOG").unwrap(), &logger));
}

// Cycles

struct Orders {
    payments: Lazy<Payments>,
}
impl Provide for Orders {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Payments>().lazy()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Orders {
            payments: args.resolve()?,
        })
    }
}

struct Payments {
    orders: Arc<Orders>,
}
impl Provide for Payments {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Orders>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Payments {
            orders: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct ShopModule;
impl ModuleDefinition for ShopModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Payments>())
            .provider(ProviderDeclaration::class::<Orders>())
    }
}

#[tokio::test]
async fn lazy_edges_break_cycles() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<ShopModule>())
        .build()
        .await
        .unwrap();

    let orders = app.require::<Orders>().unwrap();
    let payments = app.require::<Payments>().unwrap();
    assert!(orders.payments.is_resolved());
    assert!(Arc::ptr_eq(orders.payments.get(), &payments));
    assert!(Arc::ptr_eq(&payments.orders, &orders));
}

struct Customers {
    invoices: Lazy<Invoices>,
}
impl Provide for Customers {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::forward(Token::of::<Invoices>)]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Customers {
            invoices: args.resolve()?,
        })
    }
}

struct Invoices {
    customers: Arc<Customers>,
}
impl Provide for Invoices {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Customers>()]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(Invoices {
            customers: args.resolve()?,
        })
    }
}

#[derive(Default)]
struct LedgerModule;
impl ModuleDefinition for LedgerModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Customers>())
            .provider(ProviderDeclaration::class::<Invoices>())
    }
}

#[tokio::test]
async fn forward_references_break_cycles() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<LedgerModule>())
        .build()
        .await
        .unwrap();

    let customers = app.require::<Customers>().unwrap();
    let invoices = app.require::<Invoices>().unwrap();
    assert!(Arc::ptr_eq(customers.invoices.get(), &invoices));
    assert!(Arc::ptr_eq(&invoices.customers, &customers));
}

#[derive(Default)]
struct ForwardAliasModule;
impl ModuleDefinition for ForwardAliasModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::existing("LOG", forward_ref(Token::of::<Logger>)))
            .provider(ProviderDeclaration::class::<Logger>())
    }
}

#[tokio::test]
async fn aliases_may_point_at_forward_references() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<ForwardAliasModule>())
        .build()
        .await
        .unwrap();

    let logger = app.require::<Logger>().unwrap();
    assert!(Arc::ptr_eq(&app.get::<Logger>("LOG").unwrap(), &logger));
}

struct Left;
impl Provide for Left {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Right>()]
    }

    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Left)
    }
}

struct Right;
impl Provide for Right {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Left>()]
    }

    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Right)
    }
}

#[derive(Default)]
struct CycleModule;
impl ModuleDefinition for CycleModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Left>())
            .provider(ProviderDeclaration::class::<Right>())
    }
}

#[tokio::test]
async fn eager_cycles_are_rejected_before_instantiation() {
    let error = ApplicationContext::builder(ModuleDeclaration::of::<CycleModule>())
        .build()
        .await
        .unwrap_err();

    let InitError::Resolve(ResolveError::DependencyGraph(graph)) = error else {
        panic!("expected a dependency graph error, got {error:?}");
    };
    assert_eq!(graph.errors.len(), 1);
}

// Enhancers

struct AuthGuard;
impl Provide for AuthGuard {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(AuthGuard)
    }
}

struct TimingInterceptor;
impl Provide for TimingInterceptor {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(TimingInterceptor)
    }
}

struct TenantGuard;
impl Provide for TenantGuard {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(TenantGuard)
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

struct InvoiceController;
impl Provide for InvoiceController {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(InvoiceController)
    }

    fn enhancers() -> Vec<EnhancerDeclaration> {
        vec![
            EnhancerDeclaration::new::<AuthGuard>(EnhancerSubtype::Guard),
            EnhancerDeclaration::new::<TimingInterceptor>(EnhancerSubtype::Interceptor),
        ]
    }
}

#[derive(Default)]
struct ControllerModule;
impl ModuleDefinition for ControllerModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().controller(ClassDescriptor::of::<InvoiceController>())
    }
}

#[tokio::test]
async fn class_enhancers_are_instantiated_with_their_controller() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<ControllerModule>())
        .build()
        .await
        .unwrap();

    assert!(app.require::<InvoiceController>().is_ok());
    assert!(app.require::<AuthGuard>().is_ok());
    assert!(app.require::<TimingInterceptor>().is_ok());
}

#[derive(Default)]
struct GuardedModule;
impl ModuleDefinition for GuardedModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::use_class::<TenantGuard>(APP_GUARD))
            .controller(ClassDescriptor::of::<InvoiceController>())
    }
}

#[tokio::test]
async fn request_scoped_global_enhancers_scope_every_controller() {
    let app = ApplicationContext::builder(ModuleDeclaration::of::<GuardedModule>())
        .build()
        .await
        .unwrap();

    assert_eq!(app.container().global_enhancers().len(), 1);
    assert!(matches!(
        app.require::<InvoiceController>(),
        Err(RequireError::InvalidScope(_))
    ));
    assert!(app
        .resolve::<InvoiceController>(Token::of::<InvoiceController>(), Some(ContextId::new()))
        .await
        .is_ok());
}

// Exports

#[derive(Default)]
struct LeakyModule;
impl ModuleDefinition for LeakyModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Logger>())
            .export(Token::of::<Mailer>())
    }
}

#[tokio::test]
async fn unknown_exports_are_rejected() {
    let error = ApplicationContext::builder(ModuleDeclaration::of::<LeakyModule>())
        .build()
        .await
        .unwrap_err();

    let InitError::Scan(ScanError::UnknownExport { token, module }) = error else {
        panic!("expected an unknown export, got {error:?}");
    };
    assert!(token.contains("Mailer"));
    assert_eq!(module, "LeakyModule");
}
