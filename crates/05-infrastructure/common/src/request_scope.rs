//! 请求作用域
//!
//! 每个请求对应一个 [`RequestStore`], 通过 tokio 任务局部变量沿异步调用链传播。
//! 并发请求各自持有独立的存储。作用域结束时 (正常完成或被取消) 按创建的逆序
//! 执行请求作用域组件的 pre-destroy, 然后释放存储。

use crate::component::{ComponentRef, InstanceSlot};
use crate::definition::ComponentDefinition;
use crate::errors::{ScopeError, ScopeResult};
use crate::metadata::Token;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

tokio::task_local! {
    static CURRENT_REQUEST: Arc<RequestStore>;
}

/// 请求标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// 使用随机 UUID 生成标识
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 请求内创建的组件
pub type CreatedComponent = (Arc<ComponentDefinition>, ComponentRef);

/// 请求存储
pub struct RequestStore {
    id: RequestId,
    started_at: DateTime<Utc>,
    values: DashMap<Token, Arc<dyn Any + Send + Sync>>,
    components: DashMap<Token, InstanceSlot>,
    created: Mutex<Vec<CreatedComponent>>,
    creation: ReentrantMutex<()>,
}

impl fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStore")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("values", &self.values.len())
            .field("components", &self.components.len())
            .finish()
    }
}

impl RequestStore {
    /// 创建新的请求存储
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            values: DashMap::new(),
            components: DashMap::new(),
            created: Mutex::new(Vec::new()),
            creation: ReentrantMutex::new(()),
        }
    }

    /// 请求标识
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// 请求开始时间
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 写入值
    pub fn set_value<T: Any + Send + Sync>(&self, token: &Token, value: T) {
        self.values.insert(token.clone(), Arc::new(value));
    }

    /// 读取值
    pub fn get_value<T: Any + Send + Sync>(&self, token: &Token) -> ScopeResult<Option<Arc<T>>> {
        let Some(value) = self.values.get(token).map(|v| Arc::clone(v.value())) else {
            return Ok(None);
        };
        value
            .downcast::<T>()
            .map(Some)
            .map_err(|_| ScopeError::ValueTypeMismatch {
                token: token.clone(),
            })
    }

    /// 删除值
    pub fn remove_value(&self, token: &Token) -> bool {
        self.values.remove(token).is_some()
    }

    /// 值的数量
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// 组件创建锁
    ///
    /// 同一请求内并发的任务串行创建请求作用域组件, 同一线程内可重入。
    pub fn creation_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.creation.lock()
    }

    /// 请求作用域组件的槽位
    pub fn component_slot(&self, token: &Token) -> Option<InstanceSlot> {
        self.components.get(token).map(|slot| slot.value().clone())
    }

    /// 组件构造完成, 初始化尚未结束
    pub fn reserve_component(&self, token: &Token, component: ComponentRef) {
        self.components
            .insert(token.clone(), InstanceSlot::InProgress(component));
    }

    /// 组件初始化完成
    pub fn complete_component(&self, definition: Arc<ComponentDefinition>, component: ComponentRef) {
        self.components.insert(
            definition.token.clone(),
            InstanceSlot::Ready(component.clone()),
        );
        self.created.lock().push((definition, component));
    }

    /// 已创建的组件数量
    pub fn component_count(&self) -> usize {
        self.created.lock().len()
    }

    /// 取出已创建的组件, 按创建完成顺序排列
    pub fn take_created(&self) -> Vec<CreatedComponent> {
        self.components.clear();
        std::mem::take(&mut *self.created.lock())
    }

    /// 结束请求, 逆序执行请求作用域组件的 pre-destroy
    ///
    /// 单个组件失败不影响其余组件, 返回失败的组件及错误信息。重复调用无副作用。
    pub fn finish(&self) -> Vec<(Token, String)> {
        let created = self.take_created();
        let mut failures = Vec::new();
        for (definition, component) in created.iter().rev() {
            let Some(method) = &definition.lifecycle.pre_destroy else {
                continue;
            };
            if let Err(e) = definition.class.invoke(component.target(), method) {
                warn!("请求 {} 的组件 {} pre-destroy 执行失败: {}", self.id, definition.token, e);
                failures.push((definition.token.clone(), e.to_string()));
            }
        }
        if !created.is_empty() {
            debug!(
                "请求 {} 结束, 销毁 {} 个组件, 失败 {} 个",
                self.id,
                created.len(),
                failures.len()
            );
        }
        failures
    }
}

/// 作用域结束时结束请求
struct RequestEnd(Arc<RequestStore>);

impl Drop for RequestEnd {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// 在新的请求作用域中执行异步任务
pub async fn with_request<F: Future>(id: impl Into<RequestId>, body: F) -> F::Output {
    let store = Arc::new(RequestStore::new(id.into()));
    scope_with(store, body).await
}

/// 在给定的请求存储中执行异步任务
pub async fn scope_with<F: Future>(store: Arc<RequestStore>, body: F) -> F::Output {
    debug!("进入请求作用域: {}", store.id());
    let _end = RequestEnd(Arc::clone(&store));
    CURRENT_REQUEST.scope(store, body).await
}

/// 在新的请求作用域中执行同步代码
pub fn with_request_sync<R>(id: impl Into<RequestId>, f: impl FnOnce() -> R) -> R {
    let store = Arc::new(RequestStore::new(id.into()));
    let _end = RequestEnd(Arc::clone(&store));
    CURRENT_REQUEST.sync_scope(store, f)
}

/// 当前请求存储
pub fn current_request() -> ScopeResult<Arc<RequestStore>> {
    CURRENT_REQUEST
        .try_with(Arc::clone)
        .map_err(|_| ScopeError::NoActiveRequest)
}

/// 当前是否处于请求作用域内
pub fn is_request_active() -> bool {
    CURRENT_REQUEST.try_with(|_| ()).is_ok()
}

/// 当前请求标识
pub fn current_request_id() -> ScopeResult<RequestId> {
    current_request().map(|store| store.id().clone())
}

/// 写入当前请求的值
pub fn set_request_value<T: Any + Send + Sync>(token: &Token, value: T) -> ScopeResult<()> {
    current_request()?.set_value(token, value);
    Ok(())
}

/// 读取当前请求的值
pub fn get_request_value<T: Any + Send + Sync>(token: &Token) -> ScopeResult<Option<Arc<T>>> {
    current_request()?.get_value(token)
}

/// 派生子任务并继承当前请求作用域
pub fn spawn_in_request<F>(future: F) -> ScopeResult<tokio::task::JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let store = current_request()?;
    Ok(tokio::spawn(CURRENT_REQUEST.scope(store, future)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_value_visible_across_await() {
        let token = Token::new("user");
        let value = with_request("r-1", async {
            set_request_value(&token, "alice".to_string()).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            get_request_value::<String>(&token).unwrap()
        })
        .await;
        assert_eq!(value.as_deref().map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_isolated() {
        let token = Token::new("user");

        let first = with_request("a", async {
            set_request_value(&token, "a".to_string()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            get_request_value::<String>(&token).unwrap()
        });
        let second = with_request("b", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            set_request_value(&token, "b".to_string()).unwrap();
            get_request_value::<String>(&token).unwrap()
        });

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap().as_str(), "a");
        assert_eq!(b.unwrap().as_str(), "b");
        assert!(!is_request_active());
    }

    #[tokio::test]
    async fn test_outside_request() {
        let token = Token::new("user");
        assert_eq!(
            set_request_value(&token, 1_u32),
            Err(ScopeError::NoActiveRequest)
        );
        assert_eq!(
            get_request_value::<u32>(&token).unwrap_err(),
            ScopeError::NoActiveRequest
        );
        assert!(spawn_in_request(async {}).is_err());
    }

    #[tokio::test]
    async fn test_spawned_task_inherits_scope() {
        let id = with_request("parent", async {
            let handle = spawn_in_request(async { current_request_id().unwrap() }).unwrap();
            handle.await.unwrap()
        })
        .await;
        assert_eq!(id, RequestId::from("parent"));
    }

    #[test]
    fn test_type_mismatch() {
        let token = Token::new("count");
        with_request_sync("sync", || {
            set_request_value(&token, 3_u32).unwrap();
            assert_eq!(
                get_request_value::<String>(&token).unwrap_err(),
                ScopeError::ValueTypeMismatch {
                    token: token.clone()
                }
            );
            assert_eq!(*get_request_value::<u32>(&token).unwrap().unwrap(), 3);
        });
    }
}
