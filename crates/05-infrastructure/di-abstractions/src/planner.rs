//! 实例化规划抽象接口

use crate::registry::ComponentRegistry;
use infrastructure_common::{ComponentDefinition, ContainerResult, Token};
use std::sync::Arc;

/// 实例化计划
#[derive(Debug, Clone, Default)]
pub struct InstantiationPlan {
    /// 单例组件, 依赖在前
    pub singletons: Vec<Arc<ComponentDefinition>>,
    /// 请求作用域组件, 按需创建, 不参与启动时的实例化
    pub request_scoped: Vec<Arc<ComponentDefinition>>,
}

impl InstantiationPlan {
    /// 单例组件数量
    pub fn len(&self) -> usize {
        self.singletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.singletons.is_empty()
    }

    /// 单例组件在计划中的位置
    pub fn position(&self, token: &Token) -> Option<usize> {
        self.singletons
            .iter()
            .position(|definition| definition.token == *token)
    }

    /// 单例组件标识, 按计划顺序
    pub fn tokens(&self) -> Vec<Token> {
        self.singletons
            .iter()
            .map(|definition| definition.token.clone())
            .collect()
    }
}

/// 实例化规划器 trait
///
/// 校验所有依赖都能解析, 并按构造依赖给出实例化顺序。
pub trait ResolutionPlanner: Send + Sync {
    /// 生成实例化计划
    fn plan(&self, registry: &dyn ComponentRegistry) -> ContainerResult<InstantiationPlan>;

    /// 规划器名称
    fn name(&self) -> &str;
}
