use std::sync::Arc;

use futures::executor::block_on;
use tracing_subscriber::EnvFilter;
use wrapp_injector::{
    ApplicationContext, Args, ContextId, DependencyInfo, DynError, ModuleDeclaration,
    ModuleDefinition, ModuleMetadata, Provide, ProviderDeclaration, Scope, ScopeOptions, Token,
    REQUEST,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = block_on(ApplicationContext::builder(ModuleDeclaration::of::<AppModule>()).build())
        .expect("application failed to start");
    println!("{:?}", app);
    println!("{}", app.graph());

    let invoices = app.require::<InvoiceService>().expect("invoice service is static");
    println!("{}", invoices.describe());

    let context_id = ContextId::new();
    app.register_request_by_context_id(String::from("tenant-a"), &context_id)
        .expect("core module is registered");
    let handler = block_on(app.resolve::<InvoiceHandler>(
        Token::of::<InvoiceHandler>(),
        Some(context_id),
    ))
    .expect("handler resolves per request");
    println!("{}", handler.handle());
}

#[derive(Debug)]
struct Logger;
impl Provide for Logger {
    fn construct(_: &mut Args) -> Result<Self, DynError> {
        Ok(Logger)
    }
}

#[derive(Debug)]
struct InvoiceService {
    logger: Arc<Logger>,
    currency: Arc<&'static str>,
}
impl InvoiceService {
    fn describe(&self) -> String {
        format!("InvoiceService({:?}, {})", self.logger, self.currency)
    }
}
impl Provide for InvoiceService {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Logger>(), DependencyInfo::token("CURRENCY")]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(InvoiceService {
            logger: args.resolve()?,
            currency: args.resolve()?,
        })
    }
}

struct InvoiceHandler {
    service: Arc<InvoiceService>,
    tenant: Arc<String>,
}
impl InvoiceHandler {
    fn handle(&self) -> String {
        format!("{} handled for {}", self.service.describe(), self.tenant)
    }
}
impl Provide for InvoiceHandler {
    fn dependencies() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<InvoiceService>(), DependencyInfo::token(REQUEST)]
    }

    fn construct(args: &mut Args) -> Result<Self, DynError> {
        Ok(InvoiceHandler {
            service: args.resolve()?,
            tenant: args.resolve()?,
        })
    }

    fn scope() -> ScopeOptions {
        ScopeOptions::request()
    }
}

#[derive(Default)]
struct CoreModule;
impl ModuleDefinition for CoreModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<Logger>())
            .export(Token::of::<Logger>())
    }

    fn global() -> bool {
        true
    }
}

#[derive(Default)]
struct BillingModule;
impl ModuleDefinition for BillingModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(ProviderDeclaration::class::<InvoiceService>())
            .provider(ProviderDeclaration::value("CURRENCY", "EUR"))
            .provider(ProviderDeclaration::class::<InvoiceHandler>().scope(Scope::Request))
            .export(Token::of::<InvoiceService>())
    }
}

#[derive(Default)]
struct AppModule;
impl ModuleDefinition for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import(ModuleDeclaration::of::<CoreModule>())
            .import(ModuleDeclaration::of::<BillingModule>())
    }
}
