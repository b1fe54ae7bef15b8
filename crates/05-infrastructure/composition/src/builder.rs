//! 应用构建器

use crate::application::Application;
use crate::dispatcher::Dispatcher;
use config_impl::{
    CompositePropertyResolver, EnvironmentPropertySource, ProcessArgumentsSource,
    TomlPropertySource,
};
use di_abstractions::ComponentScanner;
use di_impl::{ApplicationContextBuilder, ApplicationContextImpl, InventoryScanner, StaticScanner};
use infrastructure_common::{
    Component, ComponentClass, ComponentDefinitionPostProcessor, ComponentPostProcessor,
    ComponentReadyListener, ContainerConfig, InfrastructureResult,
    MetadataStore, PropertyResolver,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 应用构建器
///
/// 组合配置源, 组件扫描器和容器选项, 构建 [`Application`]。
pub struct ApplicationBuilder {
    /// 配置源
    properties: CompositePropertyResolver,
    /// 容器构建器
    context: ApplicationContextBuilder,
    /// 显式列出的组件类
    components: StaticScanner,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: LoggingConfig,
}

impl ApplicationBuilder {
    /// 创建新的应用构建器
    pub fn new() -> Self {
        Self {
            properties: CompositePropertyResolver::new(),
            context: ApplicationContextImpl::builder(),
            components: StaticScanner::new("application"),
            logging_enabled: false, // 默认不启用日志初始化
            logging_config: LoggingConfig::default(),
        }
    }

    /// 添加 TOML 配置文件
    pub fn add_config_toml<P: AsRef<Path>>(self, path: P) -> InfrastructureResult<Self> {
        let path = path.as_ref();
        info!("添加 TOML 配置文件: {}", path.display());
        let source = TomlPropertySource::new(path)?;
        Ok(self.add_property_source(source))
    }

    /// 添加 TOML 配置文件, 文件不存在时跳过
    pub fn add_optional_config_toml<P: AsRef<Path>>(self, path: P) -> InfrastructureResult<Self> {
        if path.as_ref().exists() {
            self.add_config_toml(path)
        } else {
            debug!("可选配置文件不存在: {}", path.as_ref().display());
            Ok(self)
        }
    }

    /// 添加环境变量配置源
    pub fn add_config_env_vars<S: Into<String>>(self, prefix: S) -> Self {
        let prefix = prefix.into();
        info!("添加环境变量配置源, 前缀: {}", prefix);
        self.add_property_source(EnvironmentPropertySource::new(prefix))
    }

    /// 添加当前进程参数作为配置源
    pub fn add_process_arguments(self) -> Self {
        self.add_property_source(ProcessArgumentsSource::from_env())
    }

    /// 添加给定参数作为配置源
    pub fn add_arguments<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_property_source(ProcessArgumentsSource::new(args))
    }

    /// 添加自定义配置源
    pub fn add_property_source<T: PropertyResolver + 'static>(self, source: T) -> Self {
        self.properties.add_source(Arc::new(source));
        self
    }

    /// 添加组件类型
    pub fn with_component<T: Component>(mut self) -> Self {
        self.components = self.components.with::<T>();
        self
    }

    /// 添加组件类
    pub fn with_class(mut self, class: Arc<dyn ComponentClass>) -> Self {
        self.components = self.components.with_class(class);
        self
    }

    /// 添加组件扫描器
    pub fn add_component_scanner<T: ComponentScanner + 'static>(mut self, scanner: T) -> Self {
        self.context = self.context.add_scanner(scanner);
        self
    }

    /// 扫描编译期登记的组件
    pub fn scan_inventory(self) -> Self {
        self.add_component_scanner(InventoryScanner::new())
    }

    /// 使用独立的元数据存储
    pub fn with_metadata_store(mut self, store: Arc<MetadataStore>) -> Self {
        self.context = self.context.with_metadata_store(store);
        self
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.context = self.context.with_config(config);
        self
    }

    /// 设置激活的 profile
    pub fn with_active_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = self.context.with_active_profiles(profiles);
        self
    }

    pub fn add_post_processor(mut self, processor: Arc<dyn ComponentPostProcessor>) -> Self {
        self.context = self.context.add_post_processor(processor);
        self
    }

    pub fn add_definition_post_processor(
        mut self,
        processor: Arc<dyn ComponentDefinitionPostProcessor>,
    ) -> Self {
        self.context = self.context.add_definition_post_processor(processor);
        self
    }

    pub fn add_listener(mut self, listener: Arc<dyn ComponentReadyListener>) -> Self {
        self.context = self.context.add_listener(listener);
        self
    }

    /// 自动配置开发环境
    pub fn auto_configure_development(self) -> InfrastructureResult<Self> {
        info!("自动配置开发环境");
        self.with_logging(LoggingConfig::development())
            .add_optional_config_toml("./config.dev.toml")
    }

    /// 自动配置生产环境
    pub fn auto_configure_production(self) -> InfrastructureResult<Self> {
        info!("自动配置生产环境");
        self.with_logging(LoggingConfig::production())
            .add_optional_config_toml("./config.prod.toml")
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = config;
        self.logging_enabled = true;
        self
    }

    /// 构建应用
    pub fn build(self) -> Application {
        // 只有在明确配置了日志时才初始化日志
        if self.logging_enabled {
            self.logging_config.init();
        }
        info!("开始构建应用");

        let properties = Arc::new(self.properties);
        let dispatcher = Arc::new(Dispatcher::new());

        let mut context = self
            .context
            .with_properties(Arc::clone(&properties) as Arc<dyn PropertyResolver>)
            .add_listener(Arc::clone(&dispatcher) as Arc<dyn ComponentReadyListener>);
        if !self.components.is_empty() {
            context = context.add_scanner(self.components);
        }

        info!("应用构建完成, 配置源: {:?}", properties.source_names());
        Application::new(context.build(), dispatcher, properties)
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 初始化全局日志订阅者
    ///
    /// 全局订阅者已存在时保留原有订阅者。
    pub fn init(&self) {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(self.level)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_file)
            .with_line_number(self.show_line_number);

        let result = if self.json_format {
            subscriber.json().try_init()
        } else {
            subscriber.try_init()
        };
        match result {
            Ok(()) => info!("日志系统初始化完成"),
            Err(e) => debug!("日志系统已初始化: {}", e),
        }
    }
}
