//! 请求分发
//!
//! [`Dispatcher`] 作为就绪监听器登记控制器和拦截器, 并在请求作用域内执行处理函数。
//! 状态码映射:
//!
//! | 情况 | 状态码 |
//! |---|---|
//! | 处理成功 | 200 |
//! | 拦截器拒绝 | 403 |
//! | 没有匹配的路由 | 404 |
//! | 处理函数出错 | 500 |

use async_trait::async_trait;
use di_impl::ApplicationContextImpl;
use infrastructure_common::{
    BoxError, ComponentDefinition, ComponentReadyListener, ComponentRef, RequestId, Token,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 携带请求标识的请求头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// 路由定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub method: RequestMethod,
    /// 路径, `:name` 段匹配任意值并作为路径参数
    pub path: String,
    /// 处理函数名
    pub handler: String,
}

impl RouteDefinition {
    pub fn new(method: RequestMethod, path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            handler: handler.into(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(RequestMethod::Get, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(RequestMethod::Post, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(RequestMethod::Put, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new(RequestMethod::Delete, path, handler)
    }

    /// 匹配请求路径, 成功时返回路径参数
    fn matches(&self, method: RequestMethod, path: &str) -> Option<BTreeMap<String, String>> {
        if self.method != method {
            return None;
        }
        let pattern: Vec<&str> = segments(&self.path).collect();
        let actual: Vec<&str> = segments(path).collect();
        if pattern.len() != actual.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (expected, value) in pattern.iter().zip(actual) {
            match expected.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), value.to_string());
                }
                None if *expected == value => {}
                None => return None,
            }
        }
        Some(params)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: RequestMethod,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 路径参数, 分发时填充
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl Request {
    pub fn new(method: RequestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: Value::Null,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(RequestMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(RequestMethod::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// 添加请求头, 名称不区分大小写
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// 请求标识, 未携带时生成随机 UUID
    fn request_id(&self) -> RequestId {
        self.header(REQUEST_ID_HEADER)
            .map_or_else(RequestId::random, RequestId::from)
    }
}

/// 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub request_id: String,
}

impl Response {
    fn new(status: u16, body: Value, request_id: &RequestId) -> Self {
        Self {
            status,
            body,
            request_id: request_id.to_string(),
        }
    }

    fn error(status: u16, message: impl fmt::Display, request_id: &RequestId) -> Self {
        Self::new(status, json!({ "error": message.to_string() }), request_id)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 控制器
#[async_trait]
pub trait Controller: Send + Sync {
    /// 控制器提供的路由
    fn routes(&self) -> Vec<RouteDefinition>;

    /// 处理请求
    async fn handle(&self, handler: &str, request: &Request) -> Result<Value, BoxError>;
}

/// 拦截器
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// 处理前调用, 返回错误则拒绝请求
    async fn pre_handle(&self, request: &Request) -> Result<(), BoxError>;
}

struct RouteEntry {
    route: RouteDefinition,
    controller: Token,
    target: Arc<dyn Controller>,
}

/// 请求分发器
#[derive(Default)]
pub struct Dispatcher {
    routes: RwLock<Vec<RouteEntry>>,
    interceptors: RwLock<Vec<(Token, Arc<dyn Interceptor>)>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.read().len())
            .field("interceptors", &self.interceptors.read().len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记控制器, 重复的路由返回错误
    pub fn register_controller(&self, token: Token, controller: Arc<dyn Controller>) -> Result<(), BoxError> {
        let mut routes = self.routes.write();
        for route in controller.routes() {
            if let Some(existing) = routes
                .iter()
                .find(|e| e.route.method == route.method && e.route.path == route.path)
            {
                return Err(format!(
                    "路由 {} {} 已由 {} 注册",
                    route.method, route.path, existing.controller
                )
                .into());
            }
            info!("注册路由: {} {} -> {}.{}", route.method, route.path, token, route.handler);
            routes.push(RouteEntry {
                route,
                controller: token.clone(),
                target: Arc::clone(&controller),
            });
        }
        Ok(())
    }

    /// 登记拦截器, 按登记顺序执行
    pub fn register_interceptor(&self, token: Token, interceptor: Arc<dyn Interceptor>) {
        info!("注册拦截器: {}", token);
        self.interceptors.write().push((token, interceptor));
    }

    /// 已登记的路由
    pub fn routes(&self) -> Vec<(RouteDefinition, Token)> {
        self.routes
            .read()
            .iter()
            .map(|e| (e.route.clone(), e.controller.clone()))
            .collect()
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.read().len()
    }

    fn find_route(&self, request: &Request) -> Option<(RouteDefinition, Arc<dyn Controller>, BTreeMap<String, String>)> {
        self.routes.read().iter().find_map(|entry| {
            entry
                .route
                .matches(request.method, &request.path)
                .map(|params| (entry.route.clone(), Arc::clone(&entry.target), params))
        })
    }

    /// 分发请求
    ///
    /// 匹配到路由后在新的请求作用域内依次执行拦截器和处理函数,
    /// 请求结束时请求作用域组件被销毁。
    pub async fn dispatch(&self, context: &ApplicationContextImpl, mut request: Request) -> Response {
        let request_id = request.request_id();
        let Some((route, controller, params)) = self.find_route(&request) else {
            debug!("没有匹配的路由: {} {}", request.method, request.path);
            return Response::error(
                404,
                format!("没有匹配的路由: {} {}", request.method, request.path),
                &request_id,
            );
        };
        request.params = params;
        let interceptors: Vec<Arc<dyn Interceptor>> = self
            .interceptors
            .read()
            .iter()
            .map(|(_, i)| Arc::clone(i))
            .collect();

        let id = request_id.clone();
        context
            .with_request(request_id.clone(), async move {
                for interceptor in &interceptors {
                    if let Err(e) = interceptor.pre_handle(&request).await {
                        debug!("请求 {} 被拦截: {}", id, e);
                        return Response::error(403, e, &id);
                    }
                }
                match controller.handle(&route.handler, &request).await {
                    Ok(body) => Response::new(200, body, &id),
                    Err(e) => {
                        warn!("处理函数 {} 失败: {}", route.handler, e);
                        Response::error(500, e, &id)
                    }
                }
            })
            .await
    }
}

impl ComponentReadyListener for Dispatcher {
    fn on_component_ready(
        &self,
        definition: &ComponentDefinition,
        component: &ComponentRef,
    ) -> Result<(), BoxError> {
        if definition.flags.controller {
            let controller = component
                .view::<dyn Controller>()
                .ok_or_else(|| format!("组件 {} 标记为控制器, 但没有提供 Controller 视图", definition.token))?;
            self.register_controller(definition.token.clone(), controller)?;
        }
        if definition.flags.interceptor {
            let interceptor = component
                .view::<dyn Interceptor>()
                .ok_or_else(|| format!("组件 {} 标记为拦截器, 但没有提供 Interceptor 视图", definition.token))?;
            self.register_interceptor(definition.token.clone(), interceptor);
        }
        Ok(())
    }
}
