//! 组件实例化
//!
//! 启动阶段的单例和请求内的请求作用域组件共用同一套实例化流程:
//!
//! 1. 定义后处理器
//! 2. 解析构造参数并构造
//! 3. 占位 (IN_PROGRESS), 允许字段循环依赖拿到未初始化完成的实例
//! 4. 字段注入: 组件, 配置值, 延迟句柄, 请求局部值
//! 5. 初始化前后处理器, 中间调用 post-construct
//! 6. 就绪 (READY)

use crate::registry::ComponentRegistryImpl;
use di_abstractions::{ComponentRegistry, InstantiationPlan};
use infrastructure_common::{
    Cardinality, ComponentDefinition, ComponentDefinitionPostProcessor, ComponentLookup,
    ComponentPostProcessor, ComponentReadyListener, ComponentRef, ConfigurationError,
    ContainerError, ContainerResult, DependencyDescriptor, DependencyError, FailurePhase,
    Injected, InjectionError, InstanceSlot, LazyComponent, Lifetime, LookupError,
    PropertyResolver, RequestLocal, RequestStore, Token,
};
use infrastructure_common::{BoxError, ConstructorArgs};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// 已创建的组件
#[derive(Clone)]
pub(crate) struct PooledComponent {
    pub definition: Arc<ComponentDefinition>,
    pub component: ComponentRef,
}

/// 实例化环境
pub(crate) struct Environment<'a> {
    pub registry: &'a ComponentRegistryImpl,
    pub properties: &'a dyn PropertyResolver,
    pub lookup: Weak<dyn ComponentLookup>,
}

/// 解析链, 检测实例化过程中的构造循环
#[derive(Default)]
struct ResolutionChain {
    tokens: RefCell<Vec<Token>>,
}

impl ResolutionChain {
    fn push(&self, token: &Token) -> Result<(), DependencyError> {
        let mut tokens = self.tokens.borrow_mut();
        if let Some(start) = tokens.iter().position(|t| t == token) {
            let mut path = tokens[start..].to_vec();
            path.push(token.clone());
            return Err(DependencyError::CircularDependency { path });
        }
        tokens.push(token.clone());
        Ok(())
    }

    /// 从 `token` 开始到当前组件, 再回到 `token` 的路径
    fn cycle_through(&self, token: &Token) -> DependencyError {
        let tokens = self.tokens.borrow();
        let start = tokens.iter().position(|t| t == token).unwrap_or(tokens.len());
        let mut path = tokens[start..].to_vec();
        path.push(token.clone());
        DependencyError::CircularDependency { path }
    }

    fn pop(&self) {
        self.tokens.borrow_mut().pop();
    }
}

/// 实例来源
///
/// 决定依赖从哪里取得, 新实例存放到哪里。
trait InstanceSource {
    /// 取得已有实例, 不存在时创建
    fn obtain(&self, target: &Arc<ComponentDefinition>) -> ContainerResult<ComponentRef>;

    /// 构造完成, 初始化尚未结束
    fn reserve(&self, token: &Token, component: &ComponentRef);

    /// 初始化完成
    fn complete(&self, definition: Arc<ComponentDefinition>, component: ComponentRef) -> ContainerResult<()>;

    fn post_processors(&self) -> Vec<Arc<dyn ComponentPostProcessor>>;

    fn definition_post_processors(&self) -> Vec<Arc<dyn ComponentDefinitionPostProcessor>>;

    /// 已构造但尚未完成初始化
    fn in_progress(&self, token: &Token) -> bool;

    fn chain(&self) -> &ResolutionChain;
}

fn failure(token: &Token, phase: FailurePhase) -> impl FnOnce(BoxError) -> ContainerError + '_ {
    move |source| ContainerError::component_failure(token, phase, source)
}

fn check_scope(owner: &ComponentDefinition, target: &ComponentDefinition) -> ContainerResult<()> {
    if owner.lifetime == Lifetime::Singleton && target.lifetime == Lifetime::Request {
        return Err(InjectionError::ScopeMismatch {
            owner: owner.token.clone(),
            token: target.token.clone(),
        }
        .into());
    }
    Ok(())
}

/// 依赖的用途
#[derive(Clone, Copy, PartialEq, Eq)]
enum Wiring {
    /// 构造参数, 必须是初始化完成的实例
    Constructor,
    /// 字段, 允许拿到初始化中的实例
    Field,
}

fn obtain_for(
    source: &dyn InstanceSource,
    owner: &ComponentDefinition,
    target: &Arc<ComponentDefinition>,
    wiring: Wiring,
) -> ContainerResult<ComponentRef> {
    check_scope(owner, target)?;
    if wiring == Wiring::Constructor && source.in_progress(&target.token) {
        // 构造参数绕回了一个正在做字段注入的组件
        return Err(source.chain().cycle_through(&target.token).into());
    }
    source.obtain(target)
}

fn resolve_dependency(
    env: &Environment<'_>,
    source: &dyn InstanceSource,
    owner: &ComponentDefinition,
    descriptor: &DependencyDescriptor,
    wiring: Wiring,
) -> ContainerResult<Injected> {
    match descriptor.cardinality {
        Cardinality::One => {
            let target = env.registry.resolve_one(&owner.token, &descriptor.token)?;
            Ok(Injected::One(obtain_for(source, owner, &target, wiring)?))
        }
        Cardinality::Many => {
            let mut components = Vec::new();
            for target in env.registry.candidates(&descriptor.token) {
                components.push(obtain_for(source, owner, &target, wiring)?);
            }
            Ok(Injected::Many(components))
        }
    }
}

fn inject_fields(
    env: &Environment<'_>,
    source: &dyn InstanceSource,
    definition: &ComponentDefinition,
    component: &ComponentRef,
) -> ContainerResult<()> {
    let token = &definition.token;
    let class = &definition.class;
    let target = component.target();

    for (field, descriptor) in &definition.field_dependencies {
        let value = resolve_dependency(env, source, definition, descriptor, Wiring::Field)?;
        class
            .inject(target, field, value)
            .map_err(failure(token, FailurePhase::FieldInjection))?;
    }

    for (field, key) in &definition.value_properties {
        let value = env
            .properties
            .resolve_value(key)
            .ok_or_else(|| InjectionError::MissingProperty {
                owner: token.clone(),
                field: field.clone(),
                key: key.clone(),
            })?;
        class
            .inject(target, field, Injected::Value(value))
            .map_err(failure(token, FailurePhase::FieldInjection))?;
    }

    for (field, descriptor) in &definition.dynamic_dependencies {
        let lazy = LazyComponent::new(descriptor.clone(), env.lookup.clone());
        class
            .inject(target, field, Injected::Lazy(lazy))
            .map_err(failure(token, FailurePhase::FieldInjection))?;
    }

    for (field, local) in &definition.request_locals {
        let handle = RequestLocal::new(local.clone());
        class
            .inject(target, field, Injected::RequestLocal(handle))
            .map_err(failure(token, FailurePhase::FieldInjection))?;
    }
    Ok(())
}

fn instantiate(
    env: &Environment<'_>,
    source: &dyn InstanceSource,
    definition: &Arc<ComponentDefinition>,
) -> ContainerResult<ComponentRef> {
    let token = definition.token.clone();

    let definition_processors = source.definition_post_processors();
    let definition = if definition_processors.is_empty() {
        Arc::clone(definition)
    } else {
        let mut processed = ComponentDefinition::clone(definition);
        for processor in &definition_processors {
            processor
                .post_process_definition(&mut processed)
                .map_err(failure(&token, FailurePhase::DefinitionPostProcessing))?;
        }
        Arc::new(processed)
    };

    let mut values = Vec::with_capacity(definition.constructor_dependencies.len());
    for descriptor in &definition.constructor_dependencies {
        values.push(resolve_dependency(
            env,
            source,
            &definition,
            descriptor,
            Wiring::Constructor,
        )?);
    }
    let mut args = ConstructorArgs::new(token.clone(), values);
    let target = definition
        .class
        .construct(&mut args)
        .map_err(failure(&token, FailurePhase::Construction))?;
    let mut component = ComponentRef::new(token.clone(), target, Arc::clone(&definition.class));
    source.reserve(&token, &component);

    inject_fields(env, source, &definition, &component)?;

    let processors = source.post_processors();
    for processor in &processors {
        component = processor
            .post_process_before_init(&definition, component)
            .map_err(failure(&token, FailurePhase::BeforeInit))?;
    }

    if let Some(method) = &definition.lifecycle.post_construct {
        definition
            .class
            .invoke(component.target(), method)
            .map_err(failure(&token, FailurePhase::PostConstruct))?;
    }

    for processor in &processors {
        component = processor
            .post_process_after_init(&definition, component)
            .map_err(failure(&token, FailurePhase::AfterInit))?;
    }

    source.complete(definition, component.clone())?;
    Ok(component)
}

/// 执行 pre-destroy 回调
pub(crate) fn run_pre_destroy(pooled: &PooledComponent) -> Result<(), BoxError> {
    match &pooled.definition.lifecycle.pre_destroy {
        Some(method) => pooled
            .definition
            .class
            .invoke(pooled.component.target(), method),
        None => Ok(()),
    }
}

/// 按逆序执行 pre-destroy, 单个失败不影响其余组件
pub(crate) fn teardown_reverse<'a>(
    components: impl DoubleEndedIterator<Item = &'a PooledComponent>,
) -> Vec<(Token, String)> {
    let mut failures = Vec::new();
    for pooled in components.rev() {
        if let Err(e) = run_pre_destroy(pooled) {
            let token = pooled.definition.token.clone();
            warn!("组件 {} 的 pre-destroy 执行失败: {}", token, e);
            failures.push((token, e.to_string()));
        }
    }
    failures
}

/// 启动阶段的产物
pub(crate) struct StartupOutput {
    pub created: Vec<PooledComponent>,
    pub post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    pub definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
}

/// 启动阶段的实例来源: 创建全部单例
pub(crate) struct StartupSource<'a> {
    env: Environment<'a>,
    listeners: &'a [Arc<dyn ComponentReadyListener>],
    listener_failures_fatal: bool,
    slots: RefCell<HashMap<Token, InstanceSlot>>,
    created: RefCell<Vec<PooledComponent>>,
    post_processors: RefCell<Vec<Arc<dyn ComponentPostProcessor>>>,
    definition_post_processors: RefCell<Vec<Arc<dyn ComponentDefinitionPostProcessor>>>,
    chain: ResolutionChain,
}

impl<'a> StartupSource<'a> {
    pub fn new(
        env: Environment<'a>,
        listeners: &'a [Arc<dyn ComponentReadyListener>],
        listener_failures_fatal: bool,
        post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
        definition_post_processors: Vec<Arc<dyn ComponentDefinitionPostProcessor>>,
    ) -> Self {
        Self {
            env,
            listeners,
            listener_failures_fatal,
            slots: RefCell::new(HashMap::new()),
            created: RefCell::new(Vec::new()),
            post_processors: RefCell::new(post_processors),
            definition_post_processors: RefCell::new(definition_post_processors),
            chain: ResolutionChain::default(),
        }
    }

    /// 按计划创建全部单例
    ///
    /// 后处理器组件先于其他组件创建, 以便处理其余组件。
    pub fn run(&self, plan: &InstantiationPlan) -> ContainerResult<()> {
        let (processors, others): (Vec<_>, Vec<_>) = plan.singletons.iter().partition(|d| {
            d.flags.post_processor || d.flags.definition_post_processor
        });
        for definition in processors.into_iter().chain(others) {
            self.obtain(definition)?;
        }
        Ok(())
    }

    /// 已创建的组件, 按创建完成顺序
    pub fn into_created(self) -> Vec<PooledComponent> {
        self.created.into_inner()
    }

    pub fn finish(self) -> StartupOutput {
        StartupOutput {
            created: self.created.into_inner(),
            post_processors: self.post_processors.into_inner(),
            definition_post_processors: self.definition_post_processors.into_inner(),
        }
    }

    fn register_processors(&self, definition: &ComponentDefinition, component: &ComponentRef) -> ContainerResult<()> {
        if definition.flags.post_processor {
            let processor = component
                .view::<dyn ComponentPostProcessor>()
                .ok_or_else(|| ConfigurationError::MissingView {
                    token: definition.token.clone(),
                    role: "ComponentPostProcessor",
                })?;
            debug!("注册组件后处理器: {}", definition.token);
            self.post_processors.borrow_mut().push(processor);
        }
        if definition.flags.definition_post_processor {
            let processor = component
                .view::<dyn ComponentDefinitionPostProcessor>()
                .ok_or_else(|| ConfigurationError::MissingView {
                    token: definition.token.clone(),
                    role: "ComponentDefinitionPostProcessor",
                })?;
            debug!("注册定义后处理器: {}", definition.token);
            self.definition_post_processors.borrow_mut().push(processor);
        }
        Ok(())
    }
}

impl InstanceSource for StartupSource<'_> {
    fn obtain(&self, target: &Arc<ComponentDefinition>) -> ContainerResult<ComponentRef> {
        let existing = self
            .slots
            .borrow()
            .get(&target.token)
            .map(|slot| slot.component().clone());
        if let Some(component) = existing {
            return Ok(component);
        }

        self.chain.push(&target.token)?;
        let result = instantiate(&self.env, self, target);
        self.chain.pop();
        result
    }

    fn reserve(&self, token: &Token, component: &ComponentRef) {
        self.slots
            .borrow_mut()
            .insert(token.clone(), InstanceSlot::InProgress(component.clone()));
    }

    fn complete(&self, definition: Arc<ComponentDefinition>, component: ComponentRef) -> ContainerResult<()> {
        let token = definition.token.clone();
        self.slots
            .borrow_mut()
            .insert(token.clone(), InstanceSlot::Ready(component.clone()));
        self.created.borrow_mut().push(PooledComponent {
            definition: Arc::clone(&definition),
            component: component.clone(),
        });
        self.register_processors(&definition, &component)?;

        for listener in self.listeners {
            if let Err(e) = listener.on_component_ready(&definition, &component) {
                if self.listener_failures_fatal {
                    return Err(ContainerError::component_failure(
                        &token,
                        FailurePhase::ReadyNotification,
                        e,
                    ));
                }
                warn!("组件 {} 的就绪通知失败: {}", token, e);
            }
        }
        debug!("组件就绪: {}", token);
        Ok(())
    }

    fn post_processors(&self) -> Vec<Arc<dyn ComponentPostProcessor>> {
        self.post_processors.borrow().clone()
    }

    fn definition_post_processors(&self) -> Vec<Arc<dyn ComponentDefinitionPostProcessor>> {
        self.definition_post_processors.borrow().clone()
    }

    fn in_progress(&self, token: &Token) -> bool {
        self.slots
            .borrow()
            .get(token)
            .is_some_and(|slot| !slot.is_ready())
    }

    fn chain(&self) -> &ResolutionChain {
        &self.chain
    }
}

/// 请求内的实例来源: 单例取自容器, 请求作用域组件存放在请求存储中
pub(crate) struct RequestSource<'a> {
    env: Environment<'a>,
    singletons: &'a HashMap<Token, PooledComponent>,
    post_processors: &'a [Arc<dyn ComponentPostProcessor>],
    definition_post_processors: &'a [Arc<dyn ComponentDefinitionPostProcessor>],
    store: &'a RequestStore,
    chain: ResolutionChain,
}

impl<'a> RequestSource<'a> {
    pub fn new(
        env: Environment<'a>,
        singletons: &'a HashMap<Token, PooledComponent>,
        post_processors: &'a [Arc<dyn ComponentPostProcessor>],
        definition_post_processors: &'a [Arc<dyn ComponentDefinitionPostProcessor>],
        store: &'a RequestStore,
    ) -> Self {
        Self {
            env,
            singletons,
            post_processors,
            definition_post_processors,
            store,
            chain: ResolutionChain::default(),
        }
    }

    /// 取得请求作用域组件, 首次访问时创建
    pub fn get(&self, target: &Arc<ComponentDefinition>) -> ContainerResult<ComponentRef> {
        let _guard = self.store.creation_guard();
        self.obtain(target)
    }
}

impl InstanceSource for RequestSource<'_> {
    fn obtain(&self, target: &Arc<ComponentDefinition>) -> ContainerResult<ComponentRef> {
        if target.is_singleton() {
            return self
                .singletons
                .get(&target.token)
                .map(|pooled| pooled.component.clone())
                .ok_or_else(|| {
                    LookupError::UnknownToken {
                        token: target.token.clone(),
                    }
                    .into()
                });
        }

        if let Some(slot) = self.store.component_slot(&target.token) {
            return Ok(slot.component().clone());
        }

        self.chain.push(&target.token)?;
        let result = instantiate(&self.env, self, target);
        self.chain.pop();
        result
    }

    fn reserve(&self, token: &Token, component: &ComponentRef) {
        self.store.reserve_component(token, component.clone());
    }

    fn complete(&self, definition: Arc<ComponentDefinition>, component: ComponentRef) -> ContainerResult<()> {
        debug!(
            "请求 {} 创建组件: {}",
            self.store.id(),
            definition.token
        );
        self.store.complete_component(definition, component);
        Ok(())
    }

    fn post_processors(&self) -> Vec<Arc<dyn ComponentPostProcessor>> {
        self.post_processors.to_vec()
    }

    fn definition_post_processors(&self) -> Vec<Arc<dyn ComponentDefinitionPostProcessor>> {
        self.definition_post_processors.to_vec()
    }

    fn in_progress(&self, token: &Token) -> bool {
        self.store
            .component_slot(token)
            .is_some_and(|slot| !slot.is_ready())
    }

    fn chain(&self) -> &ResolutionChain {
        &self.chain
    }
}
