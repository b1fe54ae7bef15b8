//! 应用上下文的集成测试

use di_abstractions::{ApplicationContext, ApplicationContextExt, TeardownReport};
use di_impl::{ApplicationContextBuilder, ApplicationContextImpl, StaticScanner};
use infrastructure_common::{
    current_request_id, declare, view_of, BoxError, ClassId, ClassMetadata, Component,
    ComponentClass, ComponentDefinition, ComponentDefinitionPostProcessor,
    ComponentPostProcessor, ComponentReadyListener, ComponentRef, ConfigurationError,
    ConstructorArgs, ContainerConfig, ContainerError, ContainerResult, ContainerState,
    FailurePhase, Injected, InjectionError, LazyComponent, LookupError, MetadataStore,
    PropertyResolver, ScopeError, Token,
};
use infrastructure_common::request_scope;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

macro_rules! plain_component {
    ($($name:ident),* $(,)?) => {
        $(
            struct $name;

            impl Component for $name {
                fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
                    Ok(Self)
                }
            }
        )*
    };
}

/// 测试用配置属性
struct TestProperties(HashMap<String, String>);

impl TestProperties {
    fn of(entries: &[(&str, &str)]) -> Arc<dyn PropertyResolver> {
        Arc::new(Self(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }
}

impl PropertyResolver for TestProperties {
    fn resolve_value(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn name(&self) -> &str {
        "test"
    }
}

fn builder(store: &Arc<MetadataStore>, classes: Vec<Arc<dyn ComponentClass>>) -> ApplicationContextBuilder {
    let scanner = classes
        .into_iter()
        .fold(StaticScanner::new("test"), StaticScanner::with_class);
    ApplicationContextImpl::builder()
        .with_metadata_store(Arc::clone(store))
        .add_scanner(scanner)
}

fn push(events: &Mutex<Vec<String>>, event: &str) {
    events.lock().unwrap().push(event.to_string());
}

fn snapshot(events: &Mutex<Vec<String>>) -> Vec<String> {
    events.lock().unwrap().clone()
}

fn token_of(value: Injected) -> Result<Token, BoxError> {
    match value {
        Injected::One(component) => Ok(component.token().clone()),
        _ => Err("需要单个组件".into()),
    }
}

#[tokio::test]
async fn test_three_level_hierarchy_merge() {
    plain_component!(BaseService, MiddleService, MainRepo, AuditRepo);

    #[derive(Default)]
    struct LeafService {
        repo: Mutex<Option<Token>>,
        name: Mutex<Option<String>>,
        region: Mutex<Option<String>>,
    }

    impl Component for LeafService {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, field: &str, value: Injected) -> Result<(), BoxError> {
            match field {
                "repo" => *self.repo.lock().unwrap() = Some(token_of(value)?),
                "name" => *self.name.lock().unwrap() = Some(value.into_value()?),
                "region" => *self.region.lock().unwrap() = Some(value.into_value()?),
                other => return Err(format!("未知字段: {other}").into()),
            }
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    declare::<BaseService>(&store)
        .inject("repo", "mainRepo")
        .value("name", "app.name")
        .finish()
        .unwrap();
    declare::<MiddleService>(&store)
        .extends::<BaseService>()
        .value("region", "app.region")
        .finish()
        .unwrap();
    let leaf = declare::<LeafService>(&store)
        .named("leaf")
        .extends::<MiddleService>()
        .inject("repo", "auditRepo")
        .finish()
        .unwrap();
    let main = declare::<MainRepo>(&store).named("mainRepo").finish().unwrap();
    let audit = declare::<AuditRepo>(&store).named("auditRepo").finish().unwrap();

    // 父类只提供元数据, 本身不是组件
    assert!(ClassMetadata::collect(&store, ClassId::of::<MiddleService>()).is_err());

    let context = builder(&store, vec![leaf, main, audit])
        .with_properties(TestProperties::of(&[("app.name", "demo"), ("app.region", "eu")]))
        .build();
    context.start().await.unwrap();

    let leaf = context.get_as::<LeafService>(&Token::new("leaf")).unwrap();
    assert_eq!(leaf.repo.lock().unwrap().clone(), Some(Token::new("auditRepo")));
    assert_eq!(leaf.name.lock().unwrap().as_deref(), Some("demo"));
    assert_eq!(leaf.region.lock().unwrap().as_deref(), Some("eu"));
}

#[tokio::test]
async fn test_duplicate_token_fails_start() {
    plain_component!(First, Second);

    let store = Arc::new(MetadataStore::new());
    let first = declare::<First>(&store).named("dup").finish().unwrap();
    let second = declare::<Second>(&store).named("dup").finish().unwrap();

    let context = builder(&store, vec![first, second]).build();
    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Configuration {
            source: ConfigurationError::DuplicateToken { ref token }
        } if token.as_str() == "dup"
    ));
    assert_eq!(context.state(), ContainerState::Destroyed);
}

#[tokio::test]
async fn test_constructor_dependency_initialized_first() {
    static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct Provider;

    impl Component for Provider {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            push(&EVENTS, "provider:construct");
            Ok(Self)
        }

        fn invoke(&self, method: &str) -> Result<(), BoxError> {
            push(&EVENTS, &format!("provider:{method}"));
            Ok(())
        }
    }

    struct Consumer {
        provider: Arc<Provider>,
    }

    impl Component for Consumer {
        fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            push(&EVENTS, "consumer:construct");
            Ok(Self {
                provider: args.component::<Provider>()?,
            })
        }
    }

    let store = Arc::new(MetadataStore::new());
    let consumer = declare::<Consumer>(&store)
        .named("consumer")
        .constructor_arg("provider")
        .finish()
        .unwrap();
    let provider = declare::<Provider>(&store)
        .named("provider")
        .post_construct("init")
        .finish()
        .unwrap();

    let context = builder(&store, vec![consumer, provider]).build();
    context.start().await.unwrap();

    assert_eq!(
        snapshot(&EVENTS),
        vec!["provider:construct", "provider:init", "consumer:construct"]
    );
    assert_eq!(
        context.instantiation_order(),
        vec![Token::new("provider"), Token::new("consumer")]
    );

    let consumer = context.get_as::<Consumer>(&Token::new("consumer")).unwrap();
    let provider = context.get_as::<Provider>(&Token::new("provider")).unwrap();
    assert!(Arc::ptr_eq(&consumer.provider, &provider));
}

#[tokio::test]
async fn test_constructor_cycle_fails_with_path() {
    plain_component!(CycleA, CycleB);

    let store = Arc::new(MetadataStore::new());
    let a = declare::<CycleA>(&store)
        .named("cycleA")
        .constructor_arg("cycleB")
        .finish()
        .unwrap();
    let b = declare::<CycleB>(&store)
        .named("cycleB")
        .constructor_arg("cycleA")
        .finish()
        .unwrap();

    let context = builder(&store, vec![b, a]).build();
    let error = context.start().await.unwrap_err();
    assert!(error.is_circular_dependency());
    match error {
        ContainerError::Dependency { source } => {
            let path: Vec<_> = source.cycle_path().iter().map(Token::as_str).collect();
            assert_eq!(path, vec!["cycleA", "cycleB", "cycleA"]);
        }
        other => panic!("期望循环依赖错误, 实际: {other}"),
    }
    assert_eq!(context.state(), ContainerState::Destroyed);
}

#[tokio::test]
async fn test_field_cycle_resolves_to_live_instances() {
    #[derive(Default)]
    struct Left {
        right: Mutex<Option<ComponentRef>>,
    }

    #[derive(Default)]
    struct Right {
        left: Mutex<Option<ComponentRef>>,
    }

    impl Component for Left {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            if let Injected::One(component) = value {
                *self.right.lock().unwrap() = Some(component);
            }
            Ok(())
        }
    }

    impl Component for Right {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            if let Injected::One(component) = value {
                *self.left.lock().unwrap() = Some(component);
            }
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let left = declare::<Left>(&store)
        .named("left")
        .inject("right", "right")
        .finish()
        .unwrap();
    let right = declare::<Right>(&store)
        .named("right")
        .inject("left", "left")
        .finish()
        .unwrap();

    let context = builder(&store, vec![left, right]).build();
    context.start().await.unwrap();

    let left_ref = context.get(&Token::new("left")).unwrap();
    let right_ref = context.get(&Token::new("right")).unwrap();
    let left = left_ref.downcast::<Left>().unwrap();
    let right = right_ref.downcast::<Right>().unwrap();

    assert!(left.right.lock().unwrap().as_ref().unwrap().same_instance(&right_ref));
    assert!(right.left.lock().unwrap().as_ref().unwrap().same_instance(&left_ref));
}

#[tokio::test]
async fn test_field_back_reference_into_constructor_dependency_rejected() {
    static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct Provider;

    impl Component for Provider {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            push(&EVENTS, "provider:construct");
            Ok(Self)
        }

        fn inject(&self, _field: &str, _value: Injected) -> Result<(), BoxError> {
            push(&EVENTS, "provider:inject");
            Ok(())
        }

        fn invoke(&self, method: &str) -> Result<(), BoxError> {
            push(&EVENTS, &format!("provider:{method}"));
            Ok(())
        }
    }

    struct Consumer;

    impl Component for Consumer {
        fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            push(&EVENTS, "consumer:construct");
            args.component::<Provider>()?;
            Ok(Self)
        }
    }

    let store = Arc::new(MetadataStore::new());
    let consumer = declare::<Consumer>(&store)
        .named("consumer")
        .constructor_arg("provider")
        .finish()
        .unwrap();
    let provider = declare::<Provider>(&store)
        .named("provider")
        .inject("back", "consumer")
        .post_construct("init")
        .finish()
        .unwrap();

    let context = builder(&store, vec![consumer, provider]).build();
    let error = context.start().await.unwrap_err();
    assert!(error.is_circular_dependency());
    match error {
        ContainerError::Dependency { source } => {
            let path: Vec<_> = source.cycle_path().iter().map(Token::as_str).collect();
            assert_eq!(path, vec!["provider", "consumer", "provider"]);
        }
        other => panic!("期望循环依赖错误, 实际: {other}"),
    }

    // 消费者从未拿到未初始化完成的提供者
    assert_eq!(snapshot(&EVENTS), vec!["provider:construct"]);
    assert_eq!(context.state(), ContainerState::Destroyed);
}

#[tokio::test]
async fn test_teardown_reverse_order_best_effort() {
    static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    macro_rules! closable {
        ($name:ident, $label:literal, $fails:expr) => {
            struct $name;

            impl Component for $name {
                fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
                    while args.remaining() > 0 {
                        args.next_value()?;
                    }
                    Ok(Self)
                }

                fn invoke(&self, method: &str) -> Result<(), BoxError> {
                    push(&EVENTS, &format!("{}:{}", $label, method));
                    if $fails {
                        return Err("连接关闭失败".into());
                    }
                    Ok(())
                }
            }
        };
    }

    closable!(Alpha, "alpha", false);
    closable!(Beta, "beta", true);
    closable!(Gamma, "gamma", false);

    let store = Arc::new(MetadataStore::new());
    let alpha = declare::<Alpha>(&store)
        .named("alpha")
        .constructor_arg("beta")
        .pre_destroy("close")
        .finish()
        .unwrap();
    let beta = declare::<Beta>(&store)
        .named("beta")
        .constructor_arg("gamma")
        .pre_destroy("close")
        .finish()
        .unwrap();
    let gamma = declare::<Gamma>(&store)
        .named("gamma")
        .pre_destroy("close")
        .finish()
        .unwrap();

    let context = builder(&store, vec![alpha, beta, gamma]).build();
    context.register_shutdown_hook("flush", || {
        push(&EVENTS, "hook:flush");
        Ok(())
    });
    context.start().await.unwrap();

    let report = context.destroy().unwrap();
    assert_eq!(
        report.destroyed,
        vec![Token::new("alpha"), Token::new("beta"), Token::new("gamma")]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, Token::new("beta"));
    assert!(!report.is_clean());
    assert_eq!(
        snapshot(&EVENTS),
        vec!["alpha:close", "beta:close", "gamma:close", "hook:flush"]
    );
    assert_eq!(context.state(), ContainerState::Destroyed);
}

#[tokio::test]
async fn test_profile_pruning() {
    plain_component!(DevRepo, ProdRepo);

    #[derive(Default)]
    struct Aggregator {
        repos: Mutex<Vec<Token>>,
    }

    impl Component for Aggregator {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            if let Injected::Many(components) = value {
                *self.repos.lock().unwrap() =
                    components.iter().map(|c| c.token().clone()).collect();
            }
            Ok(())
        }
    }

    plain_component!(StrictService);

    let store = Arc::new(MetadataStore::new());
    let dev = declare::<DevRepo>(&store)
        .named("devRepo")
        .qualifier("repo")
        .profiles(["dev"])
        .finish()
        .unwrap();
    let prod = declare::<ProdRepo>(&store)
        .named("prodRepo")
        .qualifier("repo")
        .profiles(["prod"])
        .finish()
        .unwrap();
    let aggregator = declare::<Aggregator>(&store)
        .named("aggregator")
        .inject_many("repos", "repo")
        .finish()
        .unwrap();
    let strict = declare::<StrictService>(&store)
        .named("strictService")
        .inject("repo", "devRepo")
        .finish()
        .unwrap();

    // profile 来自配置属性
    let context = builder(&store, vec![dev.clone(), prod.clone(), aggregator])
        .with_properties(TestProperties::of(&[("application.profiles.active", "prod")]))
        .build();
    context.start().await.unwrap();

    let aggregator = context
        .get_as::<Aggregator>(&Token::new("aggregator"))
        .unwrap();
    assert_eq!(*aggregator.repos.lock().unwrap(), vec![Token::new("prodRepo")]);
    assert_eq!(context.stats().unwrap().excluded_components, 1);
    assert!(context.get(&Token::new("devRepo")).is_err());

    let context = builder(&store, vec![dev, prod, strict])
        .with_active_profiles(["prod"])
        .build();
    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Injection {
            source: InjectionError::ProfileExcluded { .. }
        }
    ));
}

#[tokio::test]
async fn test_constructor_component_by_type() {
    plain_component!(Repository);

    struct OrderService {
        repository: Arc<Repository>,
    }

    impl Component for OrderService {
        fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self {
                repository: args.component::<Repository>()?,
            })
        }
    }

    let store = Arc::new(MetadataStore::new());
    let service = declare::<OrderService>(&store)
        .named("orderService")
        .constructor_component::<Repository>()
        .finish()
        .unwrap();
    let repository = declare::<Repository>(&store).component().finish().unwrap();

    let context = builder(&store, vec![service, repository]).build();
    context.start().await.unwrap();

    let service = context
        .get_as::<OrderService>(&Token::new("orderService"))
        .unwrap();
    let repository = context
        .get_as::<Repository>(&Token::new("Repository"))
        .unwrap();
    assert!(Arc::ptr_eq(&service.repository, &repository));
}

#[tokio::test]
async fn test_concurrent_requests_isolated() {
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    struct RequestContext {
        request_id: String,
    }

    impl Component for RequestContext {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self {
                request_id: current_request_id()?.to_string(),
            })
        }

        fn invoke(&self, _method: &str) -> Result<(), BoxError> {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let class = declare::<RequestContext>(&store)
        .named("requestContext")
        .request_scoped()
        .pre_destroy("close")
        .finish()
        .unwrap();

    let context = builder(&store, vec![class]).build();
    context.start().await.unwrap();
    let token = Token::new("requestContext");

    let handle = |id: &'static str| {
        let context = context.clone();
        let token = token.clone();
        async move {
            context
                .with_request(id, async {
                    let first = context.get_as::<RequestContext>(&token)?;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let second = context.get_as::<RequestContext>(&token)?;
                    Ok::<_, ContainerError>((first, second))
                })
                .await
        }
    };

    let (a, b) = tokio::join!(handle("r-1"), handle("r-2"));
    let (a_first, a_second) = a.unwrap();
    let (b_first, b_second) = b.unwrap();

    assert_eq!(a_first.request_id, "r-1");
    assert_eq!(b_first.request_id, "r-2");
    assert!(Arc::ptr_eq(&a_first, &a_second));
    assert!(Arc::ptr_eq(&b_first, &b_second));
    assert!(!Arc::ptr_eq(&a_first, &b_first));
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 2);

    let error = context.get(&token).unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Scope {
            source: ScopeError::NoActiveRequest
        }
    ));
}

#[tokio::test]
async fn test_request_components_destroyed_by_bare_scope() {
    static CLOSED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct Session {
        request_id: String,
    }

    impl Component for Session {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self {
                request_id: current_request_id()?.to_string(),
            })
        }

        fn invoke(&self, method: &str) -> Result<(), BoxError> {
            push(&CLOSED, method);
            Ok(())
        }
    }

    struct Audit {
        session: Arc<Session>,
    }

    impl Component for Audit {
        fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self {
                session: args.component::<Session>()?,
            })
        }

        fn invoke(&self, method: &str) -> Result<(), BoxError> {
            push(&CLOSED, method);
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let session = declare::<Session>(&store)
        .named("session")
        .request_scoped()
        .pre_destroy("session")
        .finish()
        .unwrap();
    let audit = declare::<Audit>(&store)
        .named("audit")
        .request_scoped()
        .constructor_arg("session")
        .pre_destroy("audit")
        .finish()
        .unwrap();

    let context = builder(&store, vec![session, audit]).build();
    context.start().await.unwrap();

    let audit = request_scope::with_request("bare", async {
        context.get_as::<Audit>(&Token::new("audit"))
    })
    .await
    .unwrap();
    assert_eq!(audit.session.request_id, "bare");
    assert_eq!(snapshot(&CLOSED), vec!["audit", "session"]);

    request_scope::with_request_sync("bare-sync", || {
        context.get_as::<Session>(&Token::new("session")).unwrap();
    });
    assert_eq!(snapshot(&CLOSED), vec!["audit", "session", "session"]);
}

#[tokio::test]
async fn test_singleton_cannot_hold_request_component() {
    plain_component!(RequestState, Holder);

    let store = Arc::new(MetadataStore::new());
    let state = declare::<RequestState>(&store)
        .named("requestState")
        .request_scoped()
        .finish()
        .unwrap();
    let holder = declare::<Holder>(&store)
        .named("holder")
        .inject("state", "requestState")
        .finish()
        .unwrap();

    let context = builder(&store, vec![state, holder]).build();
    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Injection {
            source: InjectionError::ScopeMismatch { .. }
        }
    ));
}

#[tokio::test]
async fn test_lazy_dependency_resolved_per_request() {
    #[derive(Debug)]
    struct RequestUser {
        request_id: String,
    }

    impl Component for RequestUser {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self {
                request_id: current_request_id()?.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct SessionReader {
        user: Mutex<Option<LazyComponent>>,
    }

    impl SessionReader {
        fn current(&self) -> ContainerResult<Arc<RequestUser>> {
            let lazy = self.user.lock().unwrap().clone();
            lazy.expect("延迟句柄未注入").get::<RequestUser>()
        }
    }

    impl Component for SessionReader {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            *self.user.lock().unwrap() = Some(value.into_lazy()?);
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let user = declare::<RequestUser>(&store)
        .named("requestUser")
        .request_scoped()
        .finish()
        .unwrap();
    let reader = declare::<SessionReader>(&store)
        .named("sessionReader")
        .dynamic("user", "requestUser")
        .finish()
        .unwrap();

    let context = builder(&store, vec![user, reader]).build();
    context.start().await.unwrap();
    let reader = context
        .get_as::<SessionReader>(&Token::new("sessionReader"))
        .unwrap();

    let id = context
        .with_request("lazy-1", async { reader.current().map(|u| u.request_id.clone()) })
        .await
        .unwrap();
    assert_eq!(id, "lazy-1");
    assert!(reader.current().is_err());

    context.destroy().unwrap();
    assert!(matches!(
        reader.current().unwrap_err(),
        ContainerError::Lookup {
            source: LookupError::NotReady { .. }
        }
    ));
}

#[tokio::test]
async fn test_value_injection() {
    #[derive(Default)]
    struct ServerSettings {
        port: Mutex<u16>,
    }

    impl Component for ServerSettings {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            *self.port.lock().unwrap() = value.parse_value::<u16>()?;
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let class = declare::<ServerSettings>(&store)
        .named("serverSettings")
        .value("port", "server.port")
        .finish()
        .unwrap();

    let context = builder(&store, vec![Arc::clone(&class)])
        .with_properties(TestProperties::of(&[("server.port", " 8080 ")]))
        .build();
    context.start().await.unwrap();
    let settings = context
        .get_as::<ServerSettings>(&Token::new("serverSettings"))
        .unwrap();
    assert_eq!(*settings.port.lock().unwrap(), 8080);

    let context = builder(&store, vec![class]).build();
    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Injection {
            source: InjectionError::MissingProperty { ref key, .. }
        } if key == "server.port"
    ));
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

#[tokio::test]
async fn test_post_processor_component_replaces_instance() {
    struct PlainGreeter;

    impl Greeter for PlainGreeter {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Component for PlainGreeter {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self)
        }

        fn view(self: Arc<Self>, interface: TypeId) -> Option<infrastructure_common::Instance> {
            (interface == TypeId::of::<dyn Greeter>()).then(|| view_of::<dyn Greeter>(self))
        }
    }

    struct LoudGreeter(Arc<dyn Greeter>);

    impl Greeter for LoudGreeter {
        fn greet(&self) -> String {
            self.0.greet().to_uppercase()
        }
    }

    struct Amplifier;

    impl ComponentPostProcessor for Amplifier {
        fn post_process_after_init(
            &self,
            definition: &ComponentDefinition,
            component: ComponentRef,
        ) -> Result<ComponentRef, BoxError> {
            if definition.token.as_str() != "greeter" {
                return Ok(component);
            }
            let inner = component.view::<dyn Greeter>().ok_or("缺少 Greeter 接口")?;
            let loud: Arc<dyn Greeter> = Arc::new(LoudGreeter(inner));
            Ok(component.replace_instance(view_of(loud)))
        }
    }

    impl Component for Amplifier {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self)
        }

        fn view(self: Arc<Self>, interface: TypeId) -> Option<infrastructure_common::Instance> {
            (interface == TypeId::of::<dyn ComponentPostProcessor>())
                .then(|| view_of::<dyn ComponentPostProcessor>(self))
        }
    }

    let store = Arc::new(MetadataStore::new());
    let greeter = declare::<PlainGreeter>(&store).named("greeter").finish().unwrap();
    // 标识排在后面, 但后处理器仍然先创建
    let amplifier = declare::<Amplifier>(&store)
        .named("zAmplifier")
        .post_processor()
        .finish()
        .unwrap();

    let context = builder(&store, vec![greeter, amplifier]).build();
    context.start().await.unwrap();

    assert_eq!(
        context.instantiation_order(),
        vec![Token::new("zAmplifier"), Token::new("greeter")]
    );
    let greeter = context.get_view::<dyn Greeter>(&Token::new("greeter")).unwrap();
    assert_eq!(greeter.greet(), "HELLO");
    assert!(context.get(&Token::new("greeter")).unwrap().is_replaced());
}

#[tokio::test]
async fn test_post_processor_without_view_rejected() {
    plain_component!(BrokenProcessor);

    let store = Arc::new(MetadataStore::new());
    let class = declare::<BrokenProcessor>(&store)
        .named("broken")
        .post_processor()
        .finish()
        .unwrap();

    let context = builder(&store, vec![class]).build();
    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Configuration {
            source: ConfigurationError::MissingView { .. }
        }
    ));
}

#[tokio::test]
async fn test_definition_post_processor_rewrites_keys() {
    #[derive(Default)]
    struct Welcome {
        greeting: Mutex<String>,
    }

    impl Component for Welcome {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self::default())
        }

        fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
            *self.greeting.lock().unwrap() = value.into_value()?;
            Ok(())
        }
    }

    struct OverrideKeys;

    impl ComponentDefinitionPostProcessor for OverrideKeys {
        fn post_process_definition(&self, definition: &mut ComponentDefinition) -> Result<(), BoxError> {
            for key in definition.value_properties.values_mut() {
                key.push_str(".override");
            }
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let class = declare::<Welcome>(&store)
        .named("welcome")
        .value("greeting", "app.greeting")
        .finish()
        .unwrap();

    let context = builder(&store, vec![class])
        .with_properties(TestProperties::of(&[
            ("app.greeting", "hi"),
            ("app.greeting.override", "hey"),
        ]))
        .add_definition_post_processor(Arc::new(OverrideKeys))
        .build();
    context.start().await.unwrap();

    let welcome = context.get_as::<Welcome>(&Token::new("welcome")).unwrap();
    assert_eq!(*welcome.greeting.lock().unwrap(), "hey");
}

#[tokio::test]
async fn test_ready_listener_failure_tears_down() {
    static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct First;

    impl Component for First {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self)
        }

        fn invoke(&self, method: &str) -> Result<(), BoxError> {
            push(&EVENTS, &format!("first:{method}"));
            Ok(())
        }
    }

    plain_component!(Second);

    struct Rejecting {
        seen: AtomicUsize,
    }

    impl ComponentReadyListener for Rejecting {
        fn on_component_ready(
            &self,
            definition: &ComponentDefinition,
            _component: &ComponentRef,
        ) -> Result<(), BoxError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if definition.token.as_str() == "second" {
                return Err("拒绝注册".into());
            }
            Ok(())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let first = declare::<First>(&store)
        .named("first")
        .pre_destroy("close")
        .finish()
        .unwrap();
    let second = declare::<Second>(&store)
        .named("second")
        .constructor_arg("first")
        .finish()
        .unwrap();

    let listener = Arc::new(Rejecting {
        seen: AtomicUsize::new(0),
    });
    let context = builder(&store, vec![first, second])
        .add_listener(listener.clone())
        .build();
    context.register_shutdown_hook("notify", || {
        push(&EVENTS, "hook:notify");
        Ok(())
    });

    let error = context.start().await.unwrap_err();
    assert!(matches!(
        error,
        ContainerError::ComponentFailure {
            ref token,
            phase: FailurePhase::ReadyNotification,
            ..
        } if token.as_str() == "second"
    ));
    assert_eq!(listener.seen.load(Ordering::SeqCst), 2);
    assert_eq!(snapshot(&EVENTS), vec!["first:close", "hook:notify"]);
    assert_eq!(context.state(), ContainerState::Destroyed);
}

#[tokio::test]
async fn test_state_transitions() {
    plain_component!(Clock);

    let store = Arc::new(MetadataStore::new());
    let class = declare::<Clock>(&store).named("clock").finish().unwrap();
    let context = builder(&store, vec![class]).build();
    let token = Token::new("clock");

    assert_eq!(context.state(), ContainerState::Created);
    assert!(matches!(
        context.get(&token).unwrap_err(),
        ContainerError::Lookup {
            source: LookupError::NotReady {
                state: ContainerState::Created
            }
        }
    ));

    context.start().await.unwrap();
    assert!(context.is_ready());
    assert!(context.get(&token).is_ok());
    assert!(matches!(
        context.start().await.unwrap_err(),
        ContainerError::Configuration {
            source: ConfigurationError::InvalidState { .. }
        }
    ));
    assert!(context.is_ready());

    assert!(context.destroy().unwrap().is_clean());
    assert_eq!(context.destroy().unwrap(), TeardownReport::default());
    assert!(matches!(
        context.get(&token).unwrap_err(),
        ContainerError::Lookup {
            source: LookupError::NotReady {
                state: ContainerState::Destroyed
            }
        }
    ));
}

#[tokio::test]
async fn test_alias_lookup() {
    plain_component!(MysqlStorage, RedisStorage);

    let store = Arc::new(MetadataStore::new());
    let mysql = declare::<MysqlStorage>(&store)
        .named("mysql")
        .qualifier("storage")
        .finish()
        .unwrap();
    let redis = declare::<RedisStorage>(&store)
        .named("redis")
        .qualifier("storage")
        .finish()
        .unwrap();

    let context = builder(&store, vec![redis, mysql]).build();
    context.start().await.unwrap();
    let storage = Token::new("storage");

    match context.get(&storage).unwrap_err() {
        ContainerError::Lookup {
            source: LookupError::Ambiguous { candidates, .. },
        } => assert_eq!(candidates, vec![Token::new("mysql"), Token::new("redis")]),
        other => panic!("期望歧义错误, 实际: {other}"),
    }

    let all: Vec<_> = context
        .get_all(&storage)
        .unwrap()
        .iter()
        .map(|c| c.token().clone())
        .collect();
    assert_eq!(all, vec![Token::new("mysql"), Token::new("redis")]);
    assert!(matches!(
        context.get(&Token::new("missing")).unwrap_err(),
        ContainerError::Lookup {
            source: LookupError::UnknownToken { .. }
        }
    ));
}

#[tokio::test]
async fn test_released_shutdown_hook_not_run() {
    let store = Arc::new(MetadataStore::new());
    let context = builder(&store, Vec::new()).build();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&runs);
    let released = context.register_shutdown_hook("released", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let counter = Arc::clone(&runs);
    let _kept = context.register_shutdown_hook("kept", move || {
        counter.fetch_add(10, Ordering::SeqCst);
        Ok(())
    });

    assert!(released.release());
    context.start().await.unwrap();
    context.destroy().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_listener_failure_tolerated_when_configured() {
    plain_component!(Quiet);

    struct AlwaysFails;

    impl ComponentReadyListener for AlwaysFails {
        fn on_component_ready(
            &self,
            _definition: &ComponentDefinition,
            _component: &ComponentRef,
        ) -> Result<(), BoxError> {
            Err("监听器不可用".into())
        }
    }

    let store = Arc::new(MetadataStore::new());
    let class = declare::<Quiet>(&store).named("quiet").finish().unwrap();
    let context = builder(&store, vec![class])
        .with_config(ContainerConfig::new().with_listener_failures_fatal(false))
        .add_listener(Arc::new(AlwaysFails))
        .build();

    context.start().await.unwrap();
    assert!(context.get(&Token::new("quiet")).is_ok());
}
