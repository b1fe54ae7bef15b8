//! 应用上下文抽象接口
//!
//! 容器就绪之后对外提供的查询能力

use infrastructure_common::{
    ComponentRef, ContainerResult, ContainerState, LookupError, Token,
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;

/// 应用上下文 trait
pub trait ApplicationContext: Send + Sync {
    /// 按标识获取组件
    ///
    /// 主标识优先, 否则要求别名唯一。请求作用域组件只能在请求内获取。
    fn get(&self, token: &Token) -> ContainerResult<ComponentRef>;

    /// 获取标识或别名匹配的全部组件
    fn get_all(&self, token: &Token) -> ContainerResult<Vec<ComponentRef>>;

    /// 容器是否就绪
    fn is_ready(&self) -> bool {
        self.state() == ContainerState::Ready
    }

    /// 当前状态
    fn state(&self) -> ContainerState;
}

/// 类型化查询
pub trait ApplicationContextExt: ApplicationContext {
    /// 按具体类型获取组件
    fn get_as<T: Any + Send + Sync>(&self, token: &Token) -> ContainerResult<Arc<T>> {
        let component = self.get(token)?;
        component.downcast::<T>().ok_or_else(|| {
            LookupError::TypeMismatch {
                token: token.clone(),
                expected: std::any::type_name::<T>().to_string(),
            }
            .into()
        })
    }

    /// 按接口获取组件
    fn get_view<V: ?Sized + Send + Sync + 'static>(&self, token: &Token) -> ContainerResult<Arc<V>> {
        let component = self.get(token)?;
        component.view::<V>().ok_or_else(|| {
            LookupError::TypeMismatch {
                token: token.clone(),
                expected: std::any::type_name::<V>().to_string(),
            }
            .into()
        })
    }

    /// 按接口获取全部组件, 没有该接口的组件被跳过
    fn get_all_views<V: ?Sized + Send + Sync + 'static>(&self, token: &Token) -> ContainerResult<Vec<Arc<V>>> {
        Ok(self
            .get_all(token)?
            .iter()
            .filter_map(ComponentRef::view::<V>)
            .collect())
    }
}

impl<C: ApplicationContext + ?Sized> ApplicationContextExt for C {}

/// 容器统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerStats {
    /// 已注册组件数量
    pub registered_components: usize,
    /// 因 profile 排除的组件数量
    pub excluded_components: usize,
    /// 活跃单例数量
    pub active_singletons: usize,
    /// 请求作用域组件数量
    pub request_scoped_components: usize,
    /// 启动耗时（毫秒）
    pub startup_time_ms: u64,
}

/// 销毁报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// 已执行销毁的组件, 按执行顺序
    pub destroyed: Vec<Token>,
    /// pre-destroy 失败的组件及错误信息
    pub failures: Vec<(Token, String)>,
    /// 执行失败的关闭钩子
    pub failed_hooks: Vec<String>,
}

impl TeardownReport {
    /// 是否全部成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.failed_hooks.is_empty()
    }
}
