//! 应用组合层集成测试

use async_trait::async_trait;
use config_impl::MapPropertySource;
use infrastructure_common::{
    current_request_id, declare, view_of, BoxError, Component, ComponentClass, ConstructorArgs,
    ContainerError, ContainerState, FailurePhase, InfrastructureError, Injected, Instance,
    LazyComponent, MetadataStore,
};
use infrastructure_composition::{
    Application, Controller, Interceptor, Request, Response, RouteDefinition, REQUEST_ID_HEADER,
};
use serde_json::{json, Value};
use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

static TRACES_CLOSED: AtomicUsize = AtomicUsize::new(0);

struct RequestTrace {
    request_id: String,
}

impl Component for RequestTrace {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self {
            request_id: current_request_id()?.to_string(),
        })
    }

    fn invoke(&self, method: &str) -> Result<(), BoxError> {
        match method {
            "close" => {
                TRACES_CLOSED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            other => Err(format!("未知方法: {}", other).into()),
        }
    }
}

#[derive(Default)]
struct OrderController {
    shop: Mutex<String>,
    trace: Mutex<Option<LazyComponent>>,
}

impl OrderController {
    fn trace(&self) -> Result<Arc<RequestTrace>, BoxError> {
        let lazy = self.trace.lock().unwrap().clone().ok_or("延迟句柄未注入")?;
        Ok(lazy.get::<RequestTrace>()?)
    }
}

impl Component for OrderController {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self::default())
    }

    fn inject(&self, field: &str, value: Injected) -> Result<(), BoxError> {
        match field {
            "shop" => *self.shop.lock().unwrap() = value.into_value()?,
            "trace" => *self.trace.lock().unwrap() = Some(value.into_lazy()?),
            other => return Err(format!("未知字段: {}", other).into()),
        }
        Ok(())
    }

    fn view(self: Arc<Self>, interface: TypeId) -> Option<Instance> {
        (interface == TypeId::of::<dyn Controller>()).then(|| view_of::<dyn Controller>(self))
    }
}

#[async_trait]
impl Controller for OrderController {
    fn routes(&self) -> Vec<RouteDefinition> {
        vec![
            RouteDefinition::get("/orders/:id", "find"),
            RouteDefinition::post("/orders", "create"),
        ]
    }

    async fn handle(&self, handler: &str, request: &Request) -> Result<Value, BoxError> {
        let trace = self.trace()?;
        match handler {
            "find" => Ok(json!({
                "id": request.param("id"),
                "shop": self.shop.lock().unwrap().clone(),
                "request": trace.request_id,
            })),
            "create" => {
                let item = request.body.get("item").ok_or("缺少 item 字段")?;
                Ok(json!({ "created": item }))
            }
            other => Err(format!("未知处理函数: {}", other).into()),
        }
    }
}

struct BlockingInterceptor;

impl Component for BlockingInterceptor {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn view(self: Arc<Self>, interface: TypeId) -> Option<Instance> {
        (interface == TypeId::of::<dyn Interceptor>()).then(|| view_of::<dyn Interceptor>(self))
    }
}

#[async_trait]
impl Interceptor for BlockingInterceptor {
    async fn pre_handle(&self, request: &Request) -> Result<(), BoxError> {
        match request.header("x-blocked") {
            Some(reason) => Err(format!("请求被拒绝: {}", reason).into()),
            None => Ok(()),
        }
    }
}

fn declare_classes(store: &MetadataStore) -> Vec<Arc<dyn ComponentClass>> {
    vec![
        declare::<RequestTrace>(store)
            .named("requestTrace")
            .request_scoped()
            .pre_destroy("close")
            .finish()
            .unwrap(),
        declare::<OrderController>(store)
            .named("orderController")
            .controller()
            .value("shop", "shop.name")
            .dynamic("trace", "requestTrace")
            .finish()
            .unwrap(),
        declare::<BlockingInterceptor>(store)
            .named("blockingInterceptor")
            .interceptor()
            .finish()
            .unwrap(),
    ]
}

fn application() -> Application {
    let store = Arc::new(MetadataStore::new());
    declare_classes(&store)
        .into_iter()
        .fold(Application::builder(), |builder, class| builder.with_class(class))
        .with_metadata_store(store)
        .add_property_source(MapPropertySource::new("test").with("shop.name", "demo-shop"))
        .build()
}

fn error_message(response: &Response) -> &str {
    response.body["error"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_dispatch_inside_request_scope() {
    let app = application();
    app.start().await.unwrap();
    assert_eq!(app.state(), ContainerState::Ready);
    assert_eq!(app.dispatcher().routes().len(), 2);
    assert_eq!(app.dispatcher().interceptor_count(), 1);

    let closed_before = TRACES_CLOSED.load(Ordering::SeqCst);
    let response = app
        .dispatch(Request::get("/orders/42").with_header(REQUEST_ID_HEADER, "req-1"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.request_id, "req-1");
    assert_eq!(
        response.body,
        json!({ "id": "42", "shop": "demo-shop", "request": "req-1" })
    );
    assert!(TRACES_CLOSED.load(Ordering::SeqCst) > closed_before);
}

#[tokio::test]
async fn test_status_mapping() {
    let app = application();
    app.start().await.unwrap();

    let missing = app.dispatch(Request::get("/customers")).await;
    assert_eq!(missing.status, 404);
    assert!(error_message(&missing).contains("/customers"));
    assert!(!missing.request_id.is_empty());

    let blocked = app
        .dispatch(Request::get("/orders/1").with_header("X-Blocked", "maintenance"))
        .await;
    assert_eq!(blocked.status, 403);
    assert!(error_message(&blocked).contains("maintenance"));

    let failed = app.dispatch(Request::post("/orders", json!({}))).await;
    assert_eq!(failed.status, 500);
    assert!(error_message(&failed).contains("item"));

    let created = app
        .dispatch(Request::post("/orders", json!({ "item": "book" })))
        .await;
    assert_eq!(created.status, 200);
    assert_eq!(created.body, json!({ "created": "book" }));

    let metrics = app.metrics();
    assert_eq!(metrics.requests_dispatched, 4);
    assert_eq!(metrics.requests_failed, 3);
    assert!(metrics.start_time.is_some());
}

#[tokio::test]
async fn test_stop_destroys_container() {
    let app = application();
    app.start().await.unwrap();
    assert_eq!(app.property("shop.name"), Some("demo-shop".to_string()));

    let report = app.stop().unwrap();
    assert!(report.is_clean());
    assert_eq!(app.state(), ContainerState::Destroyed);
    assert!(app.metrics().stop_time.is_some());

    let response = app.dispatch(Request::get("/orders/7")).await;
    assert_eq!(response.status, 500);
}

#[tokio::test]
async fn test_handle_runs_in_fresh_request() {
    let app = application();
    app.start().await.unwrap();

    let first = app.handle(async { current_request_id().map(|id| id.to_string()) }).await;
    let second = app.handle(async { current_request_id().map(|id| id.to_string()) }).await;
    assert_ne!(first.unwrap(), second.unwrap());
    assert!(current_request_id().is_err());
}

#[tokio::test]
async fn test_controller_without_view_fails_start() {
    struct Headless;

    impl Component for Headless {
        fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
            Ok(Self)
        }
    }

    let store = Arc::new(MetadataStore::new());
    let class = declare::<Headless>(&store)
        .named("headless")
        .controller()
        .finish()
        .unwrap();
    let app = Application::builder()
        .with_metadata_store(store)
        .with_class(class)
        .build();

    let error = app.start().await.unwrap_err();
    assert!(matches!(
        error,
        InfrastructureError::ContainerError {
            source: ContainerError::ComponentFailure {
                phase: FailurePhase::ReadyNotification,
                ..
            }
        }
    ));
    assert_eq!(app.state(), ContainerState::Destroyed);
}
