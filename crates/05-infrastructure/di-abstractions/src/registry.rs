//! 组件注册表抽象接口

use infrastructure_common::{
    ComponentDefinition, ConfigurationResult, InjectionResult, Lifetime, Token,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// 组件注册表 trait
///
/// 标识到组件定义的映射, 标识唯一。扫描阶段写入, 规划之后只读。
pub trait ComponentRegistry: Send + Sync {
    /// 注册组件定义, 标识重复时失败
    fn register(&mut self, definition: ComponentDefinition) -> ConfigurationResult<()>;

    /// 按主标识获取定义
    fn get(&self, token: &Token) -> Option<Arc<ComponentDefinition>>;

    /// 是否存在该主标识
    fn contains(&self, token: &Token) -> bool {
        self.get(token).is_some()
    }

    /// 全部定义, 按标识排序
    fn all_entries(&self) -> Vec<Arc<ComponentDefinition>>;

    /// 主标识或别名匹配的全部定义, 按标识排序
    fn candidates(&self, token: &Token) -> Vec<Arc<ComponentDefinition>>;

    /// 解析单个依赖
    ///
    /// 主标识优先; 没有主标识时要求别名恰好匹配一个定义。
    fn resolve_one(&self, owner: &Token, token: &Token) -> InjectionResult<Arc<ComponentDefinition>>;

    /// 按激活的 profile 裁剪, 返回被移除的定义
    fn retain_active(&mut self, active_profiles: &BTreeSet<String>) -> Vec<Arc<ComponentDefinition>>;

    /// 标识是否因 profile 被排除
    fn is_excluded(&self, token: &Token) -> bool;

    /// 定义数量
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 指定生命周期的定义数量
    fn count_by_lifetime(&self, lifetime: Lifetime) -> usize {
        self.all_entries()
            .iter()
            .filter(|definition| definition.lifetime == lifetime)
            .count()
    }
}
