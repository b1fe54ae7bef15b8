//! 元数据声明
//!
//! 每个装饰器函数检查挂载目标, 然后把声明合并进类自身的记录。
//! [`ClassDeclaration`] 在这些函数之上提供链式写法。

use crate::component::{class_of, Component, ComponentClass};
use crate::errors::{ConfigurationError, ContainerError, ContainerResult};
use crate::injection::RequestLocal;
use crate::lifecycle::Lifetime;
use crate::metadata::{
    ClassId, ComponentRecord, ConstructorRecord, DeclaredType, DynamicInjectionRecord,
    InjectionPoint, InjectionRecord, LifecycleRecord, MetadataStore, RequestLocalRecord,
    TargetKind, Token, ValueRecord,
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// 装饰器的挂载目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoratorTarget {
    Class(ClassId),
    Property { class: ClassId, name: String },
    Method { class: ClassId, name: String },
}

impl DecoratorTarget {
    pub fn property(class: ClassId, name: impl Into<String>) -> Self {
        Self::Property {
            class,
            name: name.into(),
        }
    }

    pub fn method(class: ClassId, name: impl Into<String>) -> Self {
        Self::Method {
            class,
            name: name.into(),
        }
    }

    /// 目标类型
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Class(_) => TargetKind::Class,
            Self::Property { .. } => TargetKind::Property,
            Self::Method { .. } => TargetKind::Method,
        }
    }

    /// 目标所在的类
    pub fn class(&self) -> ClassId {
        match self {
            Self::Class(class) | Self::Property { class, .. } | Self::Method { class, .. } => {
                *class
            }
        }
    }

    /// 目标名称, 成员形如 `Class#member`
    pub fn subject_name(&self) -> String {
        match self {
            Self::Class(class) => class.short_name().to_string(),
            Self::Property { class, name } | Self::Method { class, name } => {
                format!("{}#{}", class.short_name(), name)
            }
        }
    }

    fn member(&self) -> &str {
        match self {
            Self::Class(_) => "",
            Self::Property { name, .. } | Self::Method { name, .. } => name,
        }
    }
}

fn ensure_target(
    decorator: &'static str,
    expected: TargetKind,
    target: &DecoratorTarget,
) -> Result<(), ConfigurationError> {
    if target.kind() == expected {
        return Ok(());
    }
    Err(ConfigurationError::WrongTarget {
        decorator,
        expected,
        actual: target.subject_name(),
    })
}

fn ensure_component(
    store: &MetadataStore,
    decorator: &'static str,
    class: ClassId,
) -> Result<(), ConfigurationError> {
    if store.is_component(class) {
        return Ok(());
    }
    Err(ConfigurationError::ComponentRequired {
        decorator,
        class: class.name().to_string(),
    })
}

/// 声明组件, `token` 为空时使用类名
pub fn component(
    store: &MetadataStore,
    target: &DecoratorTarget,
    token: Option<Token>,
) -> ContainerResult<()> {
    ensure_target("component", TargetKind::Class, target)?;
    let class = target.class();
    store.update::<ComponentRecord, _>(class, |record| {
        if token.is_some() {
            record.token = token;
        }
    })?;
    debug!("声明组件: {}", class.name());
    Ok(())
}

/// 声明请求作用域
pub fn request_scoped(store: &MetadataStore, target: &DecoratorTarget) -> ContainerResult<()> {
    ensure_target("request_scoped", TargetKind::Class, target)?;
    ensure_component(store, "request_scoped", target.class())?;
    store.update::<ComponentRecord, _>(target.class(), |record| {
        record.lifetime = Lifetime::Request;
    })?;
    Ok(())
}

/// 声明限定符别名
pub fn qualifier(
    store: &MetadataStore,
    target: &DecoratorTarget,
    alias: Token,
) -> ContainerResult<()> {
    ensure_target("qualifier", TargetKind::Class, target)?;
    ensure_component(store, "qualifier", target.class())?;
    store.update::<ComponentRecord, _>(target.class(), |record| {
        record.aliases.insert(alias);
    })?;
    Ok(())
}

/// 声明 profile, 多次声明累加
pub fn profile<I, S>(store: &MetadataStore, target: &DecoratorTarget, profiles: I) -> ContainerResult<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ensure_target("profile", TargetKind::Class, target)?;
    ensure_component(store, "profile", target.class())?;
    let profiles: Vec<String> = profiles.into_iter().map(Into::into).collect();
    store.update::<ComponentRecord, _>(target.class(), |record| {
        record.profiles.extend(profiles);
    })?;
    Ok(())
}

/// 组件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRole {
    Controller,
    Interceptor,
    PostProcessor,
    DefinitionPostProcessor,
}

impl ComponentRole {
    fn decorator(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Interceptor => "interceptor",
            Self::PostProcessor => "post_processor",
            Self::DefinitionPostProcessor => "definition_post_processor",
        }
    }
}

/// 声明带角色的组件
pub fn role(store: &MetadataStore, target: &DecoratorTarget, role: ComponentRole) -> ContainerResult<()> {
    ensure_target(role.decorator(), TargetKind::Class, target)?;
    store.update::<ComponentRecord, _>(target.class(), |record| match role {
        ComponentRole::Controller => record.flags.controller = true,
        ComponentRole::Interceptor => record.flags.interceptor = true,
        ComponentRole::PostProcessor => record.flags.post_processor = true,
        ComponentRole::DefinitionPostProcessor => record.flags.definition_post_processor = true,
    })?;
    Ok(())
}

/// 声明父类
pub fn extends(store: &MetadataStore, target: &DecoratorTarget, parent: ClassId) -> ContainerResult<()> {
    ensure_target("extends", TargetKind::Class, target)?;
    store.declare_parent(target.class(), parent)?;
    Ok(())
}

/// 声明构造参数依赖, 整体替换之前的声明
pub fn constructor(
    store: &MetadataStore,
    target: &DecoratorTarget,
    parameters: Vec<(Option<Token>, Option<DeclaredType>)>,
) -> ContainerResult<()> {
    ensure_target("constructor", TargetKind::Class, target)?;
    let class = target.class();
    let parameters = parameters
        .into_iter()
        .enumerate()
        .map(|(index, (token, declared))| {
            InjectionPoint::create(token, declared, format!("{}#{}", class.short_name(), index))
        })
        .collect::<Result<Vec<_>, _>>()?;
    store.set(class, ConstructorRecord { parameters })?;
    Ok(())
}

/// 声明字段注入
pub fn inject(
    store: &MetadataStore,
    target: &DecoratorTarget,
    token: Option<Token>,
    declared: Option<DeclaredType>,
) -> ContainerResult<()> {
    ensure_target("inject", TargetKind::Property, target)?;
    let point = InjectionPoint::create(token, declared, target.subject_name())?;
    let field = target.member().to_string();
    store.update::<InjectionRecord, _>(target.class(), |record| {
        record.fields.insert(field, point);
    })?;
    Ok(())
}

/// 按声明类型注入, 不给出显式标识
pub fn autowired(
    store: &MetadataStore,
    target: &DecoratorTarget,
    declared: Option<DeclaredType>,
) -> ContainerResult<()> {
    inject(store, target, None, declared)
}

/// 声明配置值注入
pub fn value(store: &MetadataStore, target: &DecoratorTarget, key: impl Into<String>) -> ContainerResult<()> {
    ensure_target("value", TargetKind::Property, target)?;
    let field = target.member().to_string();
    let key = key.into();
    store.update::<ValueRecord, _>(target.class(), |record| {
        record.fields.insert(field, key);
    })?;
    Ok(())
}

/// 声明延迟注入
pub fn dynamic_inject(
    store: &MetadataStore,
    target: &DecoratorTarget,
    token: Option<Token>,
    declared: Option<DeclaredType>,
) -> ContainerResult<()> {
    ensure_target("dynamic_inject", TargetKind::Property, target)?;
    let point = InjectionPoint::create(token, declared, target.subject_name())?;
    let field = target.member().to_string();
    store.update::<DynamicInjectionRecord, _>(target.class(), |record| {
        record.fields.insert(field, point);
    })?;
    Ok(())
}

/// 声明请求局部字段
pub fn request_local(store: &MetadataStore, target: &DecoratorTarget) -> ContainerResult<()> {
    ensure_target("request_local", TargetKind::Property, target)?;
    let class = target.class();
    let field = target.member().to_string();
    let token = RequestLocal::token_for(&class, &field);
    store.update::<RequestLocalRecord, _>(class, |record| {
        record.fields.insert(field, token);
    })?;
    Ok(())
}

/// 声明 post-construct 方法
pub fn post_construct(store: &MetadataStore, target: &DecoratorTarget) -> ContainerResult<()> {
    ensure_target("post_construct", TargetKind::Method, target)?;
    let method = target.member().to_string();
    store.update::<LifecycleRecord, _>(target.class(), |record| {
        record.post_construct = Some(method);
    })?;
    Ok(())
}

/// 声明 pre-destroy 方法
pub fn pre_destroy(store: &MetadataStore, target: &DecoratorTarget) -> ContainerResult<()> {
    ensure_target("pre_destroy", TargetKind::Method, target)?;
    let method = target.member().to_string();
    store.update::<LifecycleRecord, _>(target.class(), |record| {
        record.pre_destroy = Some(method);
    })?;
    Ok(())
}

/// 开始声明一个组件类
pub fn declare<T: Component>(store: &MetadataStore) -> ClassDeclaration<'_, T> {
    ClassDeclaration {
        store,
        constructor: Vec::new(),
        error: None,
        _marker: PhantomData,
    }
}

/// 链式类声明
///
/// 第一个出错的声明之后的调用都会被跳过, 错误在 [`ClassDeclaration::finish`] 时返回。
pub struct ClassDeclaration<'a, T> {
    store: &'a MetadataStore,
    constructor: Vec<(Option<Token>, Option<DeclaredType>)>,
    error: Option<ContainerError>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Component> ClassDeclaration<'a, T> {
    fn class() -> ClassId {
        ClassId::of::<T>()
    }

    fn apply(mut self, f: impl FnOnce(&MetadataStore) -> ContainerResult<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = f(self.store) {
                self.error = Some(e);
            }
        }
        self
    }

    fn on_class(self, f: impl FnOnce(&MetadataStore, &DecoratorTarget) -> ContainerResult<()>) -> Self {
        let target = DecoratorTarget::Class(Self::class());
        self.apply(|store| f(store, &target))
    }

    fn on_property(
        self,
        field: &str,
        f: impl FnOnce(&MetadataStore, &DecoratorTarget) -> ContainerResult<()>,
    ) -> Self {
        let target = DecoratorTarget::property(Self::class(), field);
        self.apply(|store| f(store, &target))
    }

    fn on_method(
        self,
        method: &str,
        f: impl FnOnce(&MetadataStore, &DecoratorTarget) -> ContainerResult<()>,
    ) -> Self {
        let target = DecoratorTarget::method(Self::class(), method);
        self.apply(|store| f(store, &target))
    }

    /// 声明为组件, 标识为类名
    pub fn component(self) -> Self {
        self.on_class(|store, target| component(store, target, None))
    }

    /// 声明为组件并指定标识
    pub fn named(self, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.on_class(|store, target| component(store, target, Some(token)))
    }

    /// 请求作用域
    pub fn request_scoped(self) -> Self {
        self.on_class(request_scoped)
    }

    /// 限定符别名
    pub fn qualifier(self, alias: impl Into<Token>) -> Self {
        let alias = alias.into();
        self.on_class(|store, target| qualifier(store, target, alias))
    }

    /// profile
    pub fn profiles<I, S>(self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_class(|store, target| profile(store, target, profiles))
    }

    /// 控制器
    pub fn controller(self) -> Self {
        self.on_class(|store, target| role(store, target, ComponentRole::Controller))
    }

    /// 拦截器
    pub fn interceptor(self) -> Self {
        self.on_class(|store, target| role(store, target, ComponentRole::Interceptor))
    }

    /// 组件后处理器
    pub fn post_processor(self) -> Self {
        self.on_class(|store, target| role(store, target, ComponentRole::PostProcessor))
    }

    /// 组件定义后处理器
    pub fn definition_post_processor(self) -> Self {
        self.on_class(|store, target| role(store, target, ComponentRole::DefinitionPostProcessor))
    }

    /// 父类
    pub fn extends<P: 'static>(self) -> Self {
        self.on_class(|store, target| extends(store, target, ClassId::of::<P>()))
    }

    /// 构造参数, 单个组件
    pub fn constructor_arg(mut self, token: impl Into<Token>) -> Self {
        self.constructor.push((Some(token.into()), None));
        self
    }

    /// 构造参数, 组件列表
    pub fn constructor_arg_many(mut self, token: impl Into<Token>) -> Self {
        self.constructor
            .push((Some(token.into()), Some(DeclaredType::untyped_collection())));
        self
    }

    /// 构造参数, 按类型推断标识
    pub fn constructor_component<D: 'static>(mut self) -> Self {
        self.constructor.push((None, Some(DeclaredType::of::<D>())));
        self
    }

    /// 字段注入
    pub fn inject(self, field: &str, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.on_property(field, |store, target| inject(store, target, Some(token), None))
    }

    /// 字段注入, 组件列表
    pub fn inject_many(self, field: &str, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.on_property(field, |store, target| {
            inject(
                store,
                target,
                Some(token),
                Some(DeclaredType::untyped_collection()),
            )
        })
    }

    /// 字段注入, 按类型推断标识
    pub fn autowired<D: 'static>(self, field: &str) -> Self {
        self.on_property(field, |store, target| {
            autowired(store, target, Some(DeclaredType::of::<D>()))
        })
    }

    /// 配置值注入
    pub fn value(self, field: &str, key: impl Into<String>) -> Self {
        let key = key.into();
        self.on_property(field, |store, target| value(store, target, key))
    }

    /// 延迟注入
    pub fn dynamic(self, field: &str, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.on_property(field, |store, target| {
            dynamic_inject(store, target, Some(token), None)
        })
    }

    /// 延迟注入, 组件列表
    pub fn dynamic_many(self, field: &str, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.on_property(field, |store, target| {
            dynamic_inject(
                store,
                target,
                Some(token),
                Some(DeclaredType::untyped_collection()),
            )
        })
    }

    /// 请求局部字段
    pub fn request_local(self, field: &str) -> Self {
        self.on_property(field, request_local)
    }

    /// post-construct 方法
    pub fn post_construct(self, method: &str) -> Self {
        self.on_method(method, post_construct)
    }

    /// pre-destroy 方法
    pub fn pre_destroy(self, method: &str) -> Self {
        self.on_method(method, pre_destroy)
    }

    /// 完成声明, 返回组件类
    pub fn finish(self) -> ContainerResult<Arc<dyn ComponentClass>> {
        let Self {
            store,
            constructor: parameters,
            error,
            ..
        } = self;
        if let Some(error) = error {
            return Err(error);
        }
        if !parameters.is_empty() {
            constructor(store, &DecoratorTarget::Class(Self::class()), parameters)?;
        }
        Ok(class_of::<T>())
    }
}
