//! 示例组件

use async_trait::async_trait;
use infrastructure_common::{
    current_request_id, declare, view_of, BoxError, Component, ComponentClass,
    ComponentDefinition, ComponentPostProcessor, ComponentRef, ConstructorArgs, ContainerResult,
    Injected, Instance, LazyComponent, MetadataStore, RequestLocal,
};
use infrastructure_composition::{Controller, Interceptor, Request, RouteDefinition};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// 问候语模板仓库
pub trait GreetingRepository: Send + Sync {
    fn template(&self) -> String;
}

/// 开发环境使用的问候语
pub struct InMemoryGreetings;

impl Component for InMemoryGreetings {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn view(self: Arc<Self>, interface: TypeId) -> Option<Instance> {
        (interface == TypeId::of::<dyn GreetingRepository>())
            .then(|| view_of::<dyn GreetingRepository>(self))
    }
}

impl GreetingRepository for InMemoryGreetings {
    fn template(&self) -> String {
        "你好, {name}! (dev)".to_string()
    }
}

/// 生产环境使用的问候语
pub struct FormalGreetings;

impl Component for FormalGreetings {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn view(self: Arc<Self>, interface: TypeId) -> Option<Instance> {
        (interface == TypeId::of::<dyn GreetingRepository>())
            .then(|| view_of::<dyn GreetingRepository>(self))
    }
}

impl GreetingRepository for FormalGreetings {
    fn template(&self) -> String {
        "您好, {name}。".to_string()
    }
}

/// 问候服务
pub struct GreetingService {
    repository: Arc<dyn GreetingRepository>,
    app_name: Mutex<String>,
}

impl GreetingService {
    pub fn greet(&self, name: &str) -> String {
        format!(
            "[{}] {}",
            self.app_name.lock(),
            self.repository.template().replace("{name}", name)
        )
    }
}

impl Component for GreetingService {
    fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self {
            repository: args.view::<dyn GreetingRepository>()?,
            app_name: Mutex::new(String::new()),
        })
    }

    fn inject(&self, _field: &str, value: Injected) -> Result<(), BoxError> {
        *self.app_name.lock() = value.into_value()?;
        Ok(())
    }

    fn invoke(&self, method: &str) -> Result<(), BoxError> {
        match method {
            "ready" => {
                info!("问候服务就绪: {}", self.app_name.lock());
                Ok(())
            }
            _ => Err(format!("未知方法: {}", method).into()),
        }
    }
}

/// 请求审计, 每个请求一个实例
pub struct RequestAudit {
    request_id: String,
    started: Instant,
}

impl Component for RequestAudit {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self {
            request_id: current_request_id()?.to_string(),
            started: Instant::now(),
        })
    }

    fn invoke(&self, method: &str) -> Result<(), BoxError> {
        match method {
            "finish" => {
                info!(
                    "请求 {} 结束, 耗时 {:?}",
                    self.request_id,
                    self.started.elapsed()
                );
                Ok(())
            }
            _ => Err(format!("未知方法: {}", method).into()),
        }
    }
}

/// 问候控制器
#[derive(Default)]
pub struct HelloController {
    service: Mutex<Option<Arc<GreetingService>>>,
    audit: Mutex<Option<LazyComponent>>,
    visits: Mutex<Option<RequestLocal>>,
}

impl HelloController {
    fn service(&self) -> Result<Arc<GreetingService>, BoxError> {
        Ok(self.service.lock().clone().ok_or("问候服务未注入")?)
    }

    fn audit(&self) -> Result<Arc<RequestAudit>, BoxError> {
        let lazy = self.audit.lock().clone().ok_or("审计句柄未注入")?;
        Ok(lazy.get::<RequestAudit>()?)
    }

    /// 当前请求内的访问次数
    fn count_visit(&self) -> Result<u32, BoxError> {
        let visits = self.visits.lock().clone().ok_or("请求局部字段未注入")?;
        let count = visits.get::<u32>()?.map_or(1, |n| *n + 1);
        visits.set(count)?;
        Ok(count)
    }
}

impl Component for HelloController {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, BoxError> {
        Ok(Self::default())
    }

    fn inject(&self, field: &str, value: Injected) -> Result<(), BoxError> {
        match field {
            "service" => *self.service.lock() = Some(value.into_component()?),
            "audit" => *self.audit.lock() = Some(value.into_lazy()?),
            "visits" => *self.visits.lock() = Some(value.into_request_local()?),
            _ => return Err(format!("未知字段: {}", field).into()),
        }
        Ok(())
    }

    fn view(self: Arc<Self>, interface: TypeId) -> Option<Instance> {
        (interface == TypeId::of::<dyn Controller>()).then(|| view_of::<dyn Controller>(self))
    }
}

#[async_trait]
impl Controller for HelloController {
    fn routes(&self) -> Vec<RouteDefinition> {
        vec![
            RouteDefinition::get("/hello/:name", "hello"),
            RouteDefinition::get("/clock", "clock"),
        ]
    }

    async fn handle(&self, handler: &str, request: &Request) -> Result<Value, BoxError> {
        let audit = self.audit()?;
        let visits = self.count_visit()?;
        match handler {
            "hello" => {
                let name = request.param("name").unwrap_or("world");
                Ok(json!({
                    "message": self.service()?.greet(name),
                    "request": audit.request_id,
                    "visits": visits,
                }))
            }
            "clock" => Ok(json!({
                "now": chrono::Utc::now().to_rfc3339(),
                "request": audit.request_id,
            })),
            _ => Err(format!("未知处理函数: {}", handler).into()),
        }
    }
}

/// 拒绝携带 `x-blocked` 头的请求
pub struct BlockingInterceptor;

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

/// 记录组件创建的后处理器
pub struct CreationLogger;

impl ComponentPostProcessor for CreationLogger {
    fn post_process_after_init(
        &self,
        definition: &ComponentDefinition,
        component: ComponentRef,
    ) -> Result<ComponentRef, BoxError> {
        debug!("组件已初始化: {} ({:?})", component.token(), definition.lifetime);
        Ok(component)
    }
}

/// 声明所有示例组件
pub fn declare_components(store: &MetadataStore) -> ContainerResult<Vec<Arc<dyn ComponentClass>>> {
    Ok(vec![
        declare::<InMemoryGreetings>(store)
            .named("inMemoryGreetings")
            .qualifier("greetingRepository")
            .profiles(["dev"])
            .finish()?,
        declare::<FormalGreetings>(store)
            .named("formalGreetings")
            .qualifier("greetingRepository")
            .profiles(["prod"])
            .finish()?,
        declare::<GreetingService>(store)
            .named("greetingService")
            .constructor_arg("greetingRepository")
            .value("appName", "app.name")
            .post_construct("ready")
            .finish()?,
        declare::<RequestAudit>(store)
            .named("requestAudit")
            .request_scoped()
            .pre_destroy("finish")
            .finish()?,
        declare::<HelloController>(store)
            .named("helloController")
            .controller()
            .autowired::<GreetingService>("service")
            .dynamic("audit", "requestAudit")
            .request_local("visits")
            .finish()?,
    ])
}

/// 拦截器通过 inventory 登记, 由 [`InventoryScanner`](di_impl::InventoryScanner) 发现
fn declare_interceptor(store: &MetadataStore) -> ContainerResult<Arc<dyn ComponentClass>> {
    declare::<BlockingInterceptor>(store)
        .named("blockingInterceptor")
        .interceptor()
        .finish()
}

di_impl::inventory::submit! {
    di_impl::ComponentDeclaration::new("blockingInterceptor", declare_interceptor)
}
