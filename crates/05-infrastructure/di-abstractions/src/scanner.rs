//! 组件扫描器抽象接口
//!
//! 扫描器负责发现组件类, 并从元数据存储中收集它们合并后的元数据。

use async_trait::async_trait;
use infrastructure_common::{
    ClassMetadata, ComponentClass, ConfigurationResult, ContainerResult, MetadataStore,
};
use std::fmt;
use std::sync::Arc;

/// 发现的组件类
#[derive(Clone)]
pub struct DiscoveredClass {
    pub class: Arc<dyn ComponentClass>,
    pub metadata: ClassMetadata,
}

impl fmt::Debug for DiscoveredClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredClass")
            .field("class", &self.metadata.class)
            .field("token", &self.metadata.token())
            .finish()
    }
}

impl DiscoveredClass {
    /// 从元数据存储收集
    pub fn collect(store: &MetadataStore, class: Arc<dyn ComponentClass>) -> ConfigurationResult<Self> {
        let metadata = ClassMetadata::collect(store, class.class_id())?;
        Ok(Self { class, metadata })
    }
}

/// 组件扫描器 trait
#[async_trait]
pub trait ComponentScanner: Send + Sync {
    /// 发现组件类
    ///
    /// 在容器启动时调用一次, 完成之后才进入规划阶段。
    async fn discover_classes(&self, store: &MetadataStore) -> ContainerResult<Vec<DiscoveredClass>>;

    /// 获取扫描器名称
    fn name(&self) -> &str;
}
