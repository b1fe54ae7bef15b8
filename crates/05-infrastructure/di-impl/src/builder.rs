//! 应用上下文构建器

use crate::context::{ApplicationContextImpl, ContextParts};
use crate::planner::DepthFirstPlanner;
use di_abstractions::{ComponentScanner, ResolutionPlanner};
use infrastructure_common::{
    ComponentDefinitionPostProcessor, ComponentPostProcessor, ComponentReadyListener,
    ContainerConfig, MetadataStore, NoProperties, PropertyResolver,
};
use std::sync::Arc;
use tracing::debug;

/// 应用上下文构建器
///
/// 未指定时使用全局元数据存储, 空配置源和深度优先规划器。
pub struct ApplicationContextBuilder {
    config: ContainerConfig,
    store: Option<Arc<MetadataStore>>,
    properties: Option<Arc<dyn PropertyResolver>>,
    scanners: Vec<Box<dyn ComponentScanner>>,
    planner: Option<Box<dyn ResolutionPlanner>>,
    post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
    listeners: Vec<Arc<dyn ComponentReadyListener>>,
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            store: None,
            properties: None,
            scanners: Vec::new(),
            planner: None,
            post_processors: Vec::new(),
            definition_post_processors: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置激活的 profile
    pub fn with_active_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_profiles(profiles);
        self
    }

    /// 使用独立的元数据存储
    pub fn with_metadata_store(mut self, store: Arc<MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 设置配置属性来源
    pub fn with_properties(mut self, properties: Arc<dyn PropertyResolver>) -> Self {
        debug!("使用配置源: {}", properties.name());
        self.properties = Some(properties);
        self
    }

    /// 添加组件扫描器
    pub fn add_scanner<T: ComponentScanner + 'static>(mut self, scanner: T) -> Self {
        debug!("添加组件扫描器: {}", scanner.name());
        self.scanners.push(Box::new(scanner));
        self
    }

    /// 替换实例化规划器
    pub fn with_planner<T: ResolutionPlanner + 'static>(mut self, planner: T) -> Self {
        self.planner = Some(Box::new(planner));
        self
    }

    /// 添加组件后处理器
    pub fn add_post_processor(mut self, processor: Arc<dyn ComponentPostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// 添加定义后处理器
    pub fn add_definition_post_processor(
        mut self,
        processor: Arc<dyn ComponentDefinitionPostProcessor>,
    ) -> Self {
        self.definition_post_processors.push(processor);
        self
    }

    /// 添加组件就绪监听器
    pub fn add_listener(mut self, listener: Arc<dyn ComponentReadyListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 构建应用上下文
    ///
    /// 未显式指定 profile 时从配置属性 `application.profiles.active` 读取。
    pub fn build(self) -> ApplicationContextImpl {
        let properties = self
            .properties
            .unwrap_or_else(|| Arc::new(NoProperties));
        let config = self.config.merge_properties(&*properties);

        ApplicationContextImpl::from_parts(ContextParts {
            config,
            store: self.store.unwrap_or_else(MetadataStore::global),
            properties,
            scanners: self.scanners,
            planner: self
                .planner
                .unwrap_or_else(|| Box::new(DepthFirstPlanner::new())),
            post_processors: self.post_processors,
            definition_post_processors: self.definition_post_processors,
            listeners: self.listeners,
        })
    }
}
