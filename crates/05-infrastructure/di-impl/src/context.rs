//! 应用上下文实现
//!
//! 容器状态按 CREATED → SCANNING → PLANNING → INITIALIZING → READY
//! → DESTROYING → DESTROYED 单向推进。启动失败时销毁已创建的组件,
//! 最终停在 DESTROYED。

use crate::builder::ApplicationContextBuilder;
use crate::instantiation::{
    teardown_reverse, Environment, PooledComponent, RequestSource, StartupSource,
};
use crate::registry::ComponentRegistryImpl;
use di_abstractions::{
    ApplicationContext, ComponentRegistry, ComponentScanner, ContainerStats, DiscoveredClass,
    InstantiationPlan, ResolutionPlanner, TeardownReport,
};
use infrastructure_common::{
    request_scope, Cardinality, ClassId, ComponentDefinition, ComponentDefinitionPostProcessor,
    ComponentLookup, ComponentPostProcessor, ComponentReadyListener, ComponentRef,
    ConfigurationError, ContainerConfig, ContainerError, ContainerResult, ContainerState,
    DependencyDescriptor, Injected, InjectionError, Lifetime, LookupError, MetadataStore,
    PropertyResolver, RequestId, ShutdownHookHandle, ShutdownHooks, Token,
};
use infrastructure_common::BoxError;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 容器就绪之后的运行时数据
struct Runtime {
    registry: ComponentRegistryImpl,
    singletons: HashMap<Token, PooledComponent>,
    order: Vec<Token>,
    post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
    stats: ContainerStats,
}

pub(crate) struct ContextParts {
    pub config: ContainerConfig,
    pub store: Arc<MetadataStore>,
    pub properties: Arc<dyn PropertyResolver>,
    pub scanners: Vec<Box<dyn ComponentScanner>>,
    pub planner: Box<dyn ResolutionPlanner>,
    pub post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    pub definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
    pub listeners: Vec<Arc<dyn ComponentReadyListener>>,
}

struct ContextInner {
    config: ContainerConfig,
    store: Arc<MetadataStore>,
    properties: Arc<dyn PropertyResolver>,
    scanners: Mutex<Vec<Box<dyn ComponentScanner>>>,
    planner: Box<dyn ResolutionPlanner>,
    post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
    listeners: Vec<Arc<dyn ComponentReadyListener>>,
    state: AtomicU8,
    runtime: OnceCell<Runtime>,
    shutdown_hooks: Arc<ShutdownHooks>,
    this: Weak<ContextInner>,
}

/// 应用上下文
///
/// 克隆得到的是同一个容器的句柄。
#[derive(Clone)]
pub struct ApplicationContextImpl {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for ApplicationContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContextImpl")
            .field("state", &self.inner.state())
            .field("profiles", &self.inner.config.active_profiles)
            .finish()
    }
}

impl ApplicationContextImpl {
    /// 创建构建器
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    pub(crate) fn from_parts(parts: ContextParts) -> Self {
        let inner = Arc::new_cyclic(|this| ContextInner {
            config: parts.config,
            store: parts.store,
            properties: parts.properties,
            scanners: Mutex::new(parts.scanners),
            planner: parts.planner,
            post_processors: parts.post_processors,
            definition_post_processors: parts.definition_post_processors,
            listeners: parts.listeners,
            state: AtomicU8::new(ContainerState::Created.as_u8()),
            runtime: OnceCell::new(),
            shutdown_hooks: ShutdownHooks::new(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// 启动容器: 扫描, 规划, 实例化全部单例
    ///
    /// 只能调用一次。失败时已创建的组件会被销毁, 容器进入 DESTROYED。
    pub async fn start(&self) -> ContainerResult<()> {
        let inner = &self.inner;
        inner.transition(ContainerState::Created, ContainerState::Scanning)?;
        let started = Instant::now();
        info!(
            "开始启动容器, 激活的 profile: {:?}",
            inner.config.active_profiles
        );

        let discovered = match inner.scan().await {
            Ok(discovered) => discovered,
            Err(e) => return Err(inner.abort(e)),
        };

        match inner.bootstrap(discovered, started) {
            Ok(runtime) => {
                let stats = runtime.stats.clone();
                if inner.runtime.set(runtime).is_err() {
                    return Err(inner.abort(
                        ConfigurationError::InvalidState {
                            expected: ContainerState::Initializing,
                            actual: inner.state(),
                        }
                        .into(),
                    ));
                }
                inner.transition(ContainerState::Initializing, ContainerState::Ready)?;
                info!(
                    "容器启动完成: {} 个单例, {} 个请求作用域组件, 耗时 {}ms",
                    stats.active_singletons, stats.request_scoped_components, stats.startup_time_ms
                );
                Ok(())
            }
            Err(e) => Err(inner.abort(e)),
        }
    }

    /// 销毁容器
    ///
    /// 按实例化的逆序执行 pre-destroy, 然后执行关闭钩子。单个失败只记录在报告中。
    /// 对已销毁的容器重复调用返回空报告。
    pub fn destroy(&self) -> ContainerResult<TeardownReport> {
        self.inner.destroy()
    }

    /// 注册关闭钩子
    pub fn register_shutdown_hook<F>(&self, name: impl Into<String>, callback: F) -> ShutdownHookHandle
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner.shutdown_hooks.register(name, callback)
    }

    /// 在新的请求作用域中执行异步任务
    ///
    /// 请求结束时按创建的逆序销毁请求作用域组件。
    pub async fn with_request<F: Future>(&self, id: impl Into<RequestId>, body: F) -> F::Output {
        request_scope::with_request(id, body).await
    }

    /// 统计信息, 容器未就绪时返回 `None`
    pub fn stats(&self) -> Option<ContainerStats> {
        self.inner.runtime.get().map(|runtime| runtime.stats.clone())
    }

    /// 单例实例化顺序
    pub fn instantiation_order(&self) -> Vec<Token> {
        self.inner
            .runtime
            .get()
            .map(|runtime| runtime.order.clone())
            .unwrap_or_default()
    }

    /// 已注册的组件定义, 按标识排序
    pub fn definitions(&self) -> Vec<Arc<ComponentDefinition>> {
        self.inner
            .runtime
            .get()
            .map(|runtime| runtime.registry.all_entries())
            .unwrap_or_default()
    }

    /// 元数据存储
    pub fn metadata_store(&self) -> &Arc<MetadataStore> {
        &self.inner.store
    }

    /// 配置属性
    pub fn properties(&self) -> &Arc<dyn PropertyResolver> {
        &self.inner.properties
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }
}

impl ApplicationContext for ApplicationContextImpl {
    fn get(&self, token: &Token) -> ContainerResult<ComponentRef> {
        self.inner.get(token)
    }

    fn get_all(&self, token: &Token) -> ContainerResult<Vec<ComponentRef>> {
        self.inner.get_all(token)
    }

    fn state(&self) -> ContainerState {
        self.inner.state()
    }
}

impl ContextInner {
    fn state(&self) -> ContainerState {
        ContainerState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ContainerState::Destroyed)
    }

    fn transition(&self, from: ContainerState, to: ContainerState) -> ContainerResult<()> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| ConfigurationError::InvalidState {
                expected: from,
                actual: ContainerState::from_u8(actual).unwrap_or(ContainerState::Destroyed),
            })?;
        debug!("容器状态: {} -> {}", from, to);
        Ok(())
    }

    fn force_state(&self, state: ContainerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    async fn scan(&self) -> ContainerResult<Vec<DiscoveredClass>> {
        let scanners = std::mem::take(&mut *self.scanners.lock());
        let mut discovered = Vec::new();
        for scanner in &scanners {
            let classes = scanner.discover_classes(&self.store).await?;
            info!("扫描器 {} 发现 {} 个组件类", scanner.name(), classes.len());
            discovered.extend(classes);
        }
        Ok(discovered)
    }

    /// 注册, 规划并实例化
    fn bootstrap(&self, discovered: Vec<DiscoveredClass>, started: Instant) -> ContainerResult<Runtime> {
        let mut registry = self.build_registry(discovered)?;

        self.transition(ContainerState::Scanning, ContainerState::Planning)?;
        let excluded = registry.retain_active(&self.config.active_profiles);
        let plan = self.planner.plan(&registry)?;
        debug!("规划器 {} 完成规划", self.planner.name());

        self.transition(ContainerState::Planning, ContainerState::Initializing)?;
        self.initialize(registry, &plan, excluded.len(), started)
    }

    /// 所有类都已发现之后再解析按类声明的依赖
    fn build_registry(&self, discovered: Vec<DiscoveredClass>) -> ContainerResult<ComponentRegistryImpl> {
        let known: HashMap<ClassId, Token> = discovered
            .iter()
            .map(|d| (d.metadata.class, d.metadata.token()))
            .collect();

        let mut registry = ComponentRegistryImpl::new();
        for discovered in &discovered {
            let definition = ComponentDefinition::from_metadata(
                Arc::clone(&discovered.class),
                &discovered.metadata,
                |class| {
                    known
                        .get(class)
                        .cloned()
                        .or_else(|| self.store.component_token(*class))
                },
            )?;
            registry.register(definition)?;
        }
        info!("注册了 {} 个组件定义", registry.len());
        Ok(registry)
    }

    fn environment<'a>(&'a self, registry: &'a ComponentRegistryImpl) -> Environment<'a> {
        let lookup: Weak<dyn ComponentLookup> = self.this.clone();
        Environment {
            registry,
            properties: &*self.properties,
            lookup,
        }
    }

    fn initialize(
        &self,
        registry: ComponentRegistryImpl,
        plan: &InstantiationPlan,
        excluded: usize,
        started: Instant,
    ) -> ContainerResult<Runtime> {
        let source = StartupSource::new(
            self.environment(&registry),
            &self.listeners,
            self.config.listener_failures_fatal,
            self.post_processors.clone(),
            self.definition_post_processors.clone(),
        );

        if let Err(e) = source.run(plan) {
            let created = source.into_created();
            if self.config.teardown_on_failed_start {
                warn!("启动失败, 销毁已创建的 {} 个组件", created.len());
                teardown_reverse(created.iter());
            }
            return Err(e);
        }

        let output = source.finish();
        let order: Vec<Token> = output
            .created
            .iter()
            .map(|pooled| pooled.definition.token.clone())
            .collect();
        let singletons: HashMap<Token, PooledComponent> = output
            .created
            .into_iter()
            .map(|pooled| (pooled.definition.token.clone(), pooled))
            .collect();

        let stats = ContainerStats {
            registered_components: registry.len(),
            excluded_components: excluded,
            active_singletons: singletons.len(),
            request_scoped_components: registry.count_by_lifetime(Lifetime::Request),
            startup_time_ms: started.elapsed().as_millis() as u64,
        };

        Ok(Runtime {
            registry,
            singletons,
            order,
            post_processors: output.post_processors,
            definition_post_processors: output.definition_post_processors,
            stats,
        })
    }

    /// 启动失败: 执行关闭钩子并进入 DESTROYED
    fn abort(&self, cause: ContainerError) -> ContainerError {
        error!("容器启动失败: {}", cause);
        self.force_state(ContainerState::Destroying);
        let failed = self.shutdown_hooks.run_all();
        if !failed.is_empty() {
            warn!("关闭钩子执行失败: {:?}", failed);
        }
        self.force_state(ContainerState::Destroyed);
        cause
    }

    fn destroy(&self) -> ContainerResult<TeardownReport> {
        match self.state() {
            ContainerState::Destroyed => return Ok(TeardownReport::default()),
            ContainerState::Ready => {}
            actual => {
                return Err(ConfigurationError::InvalidState {
                    expected: ContainerState::Ready,
                    actual,
                }
                .into())
            }
        }
        self.transition(ContainerState::Ready, ContainerState::Destroying)?;
        info!("开始销毁容器");

        let mut report = TeardownReport::default();
        if let Some(runtime) = self.runtime.get() {
            let pooled: Vec<&PooledComponent> = runtime
                .order
                .iter()
                .filter_map(|token| runtime.singletons.get(token))
                .collect();
            report.failures = teardown_reverse(pooled.iter().copied());
            report.destroyed = runtime.order.iter().rev().cloned().collect();
        }
        report.failed_hooks = self.shutdown_hooks.run_all();

        self.force_state(ContainerState::Destroyed);
        if report.is_clean() {
            info!("容器销毁完成, 共 {} 个组件", report.destroyed.len());
        } else {
            warn!(
                "容器销毁完成, {} 个组件销毁失败, {} 个关闭钩子失败",
                report.failures.len(),
                report.failed_hooks.len()
            );
        }
        Ok(report)
    }

    fn ready_runtime(&self) -> ContainerResult<&Runtime> {
        let state = self.state();
        if state != ContainerState::Ready {
            return Err(LookupError::NotReady { state }.into());
        }
        self.runtime
            .get()
            .ok_or_else(|| LookupError::NotReady { state }.into())
    }

    fn get(&self, token: &Token) -> ContainerResult<ComponentRef> {
        let runtime = self.ready_runtime()?;
        let definition = match runtime.registry.resolve_one(token, token) {
            Ok(definition) => definition,
            Err(InjectionError::Ambiguous { candidates, .. }) => {
                return Err(LookupError::Ambiguous {
                    token: token.clone(),
                    candidates,
                }
                .into())
            }
            Err(_) => {
                return Err(LookupError::UnknownToken {
                    token: token.clone(),
                }
                .into())
            }
        };
        self.component_for(runtime, &definition)
    }

    fn get_all(&self, token: &Token) -> ContainerResult<Vec<ComponentRef>> {
        let runtime = self.ready_runtime()?;
        runtime
            .registry
            .candidates(token)
            .iter()
            .map(|definition| self.component_for(runtime, definition))
            .collect()
    }

    fn component_for(&self, runtime: &Runtime, definition: &Arc<ComponentDefinition>) -> ContainerResult<ComponentRef> {
        if definition.is_singleton() {
            return runtime
                .singletons
                .get(&definition.token)
                .map(|pooled| pooled.component.clone())
                .ok_or_else(|| {
                    LookupError::UnknownToken {
                        token: definition.token.clone(),
                    }
                    .into()
                });
        }

        let store = request_scope::current_request()?;
        let source = RequestSource::new(
            self.environment(&runtime.registry),
            &runtime.singletons,
            &runtime.post_processors,
            &runtime.definition_post_processors,
            &store,
        );
        source.get(definition)
    }
}

impl ComponentLookup for ContextInner {
    fn lookup(&self, descriptor: &DependencyDescriptor) -> ContainerResult<Injected> {
        match descriptor.cardinality {
            Cardinality::One => self.get(&descriptor.token).map(Injected::One),
            Cardinality::Many => self.get_all(&descriptor.token).map(Injected::Many),
        }
    }
}
