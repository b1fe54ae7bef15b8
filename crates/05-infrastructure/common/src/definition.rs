//! 组件定义
//!
//! 注册表中的条目。由类的合并元数据生成, 所有隐式标识在生成时已经解析完毕。

use crate::component::ComponentClass;
use crate::errors::{ContainerResult, InjectionError};
use crate::metadata::{
    ClassId, ClassMetadata, ComponentFlags, DependencyDescriptor, LifecycleRecord, Token,
};
use crate::lifecycle::Lifetime;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// 组件定义
#[derive(Clone)]
pub struct ComponentDefinition {
    pub token: Token,
    pub class: Arc<dyn ComponentClass>,
    pub class_id: ClassId,
    pub lifetime: Lifetime,
    pub aliases: BTreeSet<Token>,
    pub profiles: BTreeSet<String>,
    pub flags: ComponentFlags,
    /// 构造参数依赖, 按声明顺序
    pub constructor_dependencies: Vec<DependencyDescriptor>,
    /// 字段依赖
    pub field_dependencies: BTreeMap<String, DependencyDescriptor>,
    /// 延迟依赖, 注入的是查找句柄
    pub dynamic_dependencies: BTreeMap<String, DependencyDescriptor>,
    /// 配置值字段, 字段名到配置键
    pub value_properties: BTreeMap<String, String>,
    /// 请求局部字段
    pub request_locals: BTreeMap<String, Token>,
    pub lifecycle: LifecycleRecord,
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("token", &self.token)
            .field("class", &self.class_id)
            .field("lifetime", &self.lifetime)
            .field("aliases", &self.aliases)
            .field("profiles", &self.profiles)
            .field("constructor_dependencies", &self.constructor_dependencies)
            .field("field_dependencies", &self.field_dependencies)
            .finish_non_exhaustive()
    }
}

impl ComponentDefinition {
    /// 由类的元数据生成定义
    ///
    /// `component_token` 用于解析由成员类型推断的标识, 必须在所有类都已发现之后调用。
    pub fn from_metadata(
        class: Arc<dyn ComponentClass>,
        metadata: &ClassMetadata,
        component_token: impl Fn(&ClassId) -> Option<Token>,
    ) -> ContainerResult<Self> {
        let resolve = |point: &crate::metadata::InjectionPoint| -> Result<DependencyDescriptor, InjectionError> {
            point.resolve(&component_token)
        };

        let constructor_dependencies = metadata
            .constructor
            .parameters
            .iter()
            .map(resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let mut field_dependencies = BTreeMap::new();
        for (field, point) in &metadata.injections.fields {
            field_dependencies.insert(field.clone(), resolve(point)?);
        }

        let mut dynamic_dependencies = BTreeMap::new();
        for (field, point) in &metadata.dynamic.fields {
            dynamic_dependencies.insert(field.clone(), resolve(point)?);
        }

        Ok(Self {
            token: metadata.token(),
            class_id: metadata.class,
            class,
            lifetime: metadata.component.lifetime,
            aliases: metadata.component.aliases.clone(),
            profiles: metadata.component.profiles.clone(),
            flags: metadata.component.flags,
            constructor_dependencies,
            field_dependencies,
            dynamic_dependencies,
            value_properties: metadata.values.fields.clone(),
            request_locals: metadata.request_locals.fields.clone(),
            lifecycle: metadata.lifecycle.clone(),
        })
    }

    /// 以最少的信息创建定义, 主要用于测试和手工注册
    pub fn new(token: impl Into<Token>, class: Arc<dyn ComponentClass>) -> Self {
        Self {
            token: token.into(),
            class_id: class.class_id(),
            class,
            lifetime: Lifetime::Singleton,
            aliases: BTreeSet::new(),
            profiles: BTreeSet::new(),
            flags: ComponentFlags::default(),
            constructor_dependencies: Vec::new(),
            field_dependencies: BTreeMap::new(),
            dynamic_dependencies: BTreeMap::new(),
            value_properties: BTreeMap::new(),
            request_locals: BTreeMap::new(),
            lifecycle: LifecycleRecord::default(),
        }
    }

    /// 添加构造依赖
    pub fn with_constructor_dependency(mut self, descriptor: DependencyDescriptor) -> Self {
        self.constructor_dependencies.push(descriptor);
        self
    }

    /// 添加字段依赖
    pub fn with_field_dependency(
        mut self,
        field: impl Into<String>,
        descriptor: DependencyDescriptor,
    ) -> Self {
        self.field_dependencies.insert(field.into(), descriptor);
        self
    }

    /// 添加别名
    pub fn with_alias(mut self, alias: impl Into<Token>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// 添加 profile
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.insert(profile.into());
        self
    }

    /// 设置生命周期
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// 是否为单例
    pub fn is_singleton(&self) -> bool {
        self.lifetime == Lifetime::Singleton
    }

    /// 标识或别名是否匹配
    pub fn answers_to(&self, token: &Token) -> bool {
        self.token == *token || self.aliases.contains(token)
    }

    /// 在给定的激活 profile 下是否保留
    ///
    /// 没有声明 profile 的组件始终保留。
    pub fn is_active(&self, active_profiles: &BTreeSet<String>) -> bool {
        self.profiles.is_empty() || self.profiles.iter().any(|p| active_profiles.contains(p))
    }

    /// 所有直接依赖, 构造依赖在前
    pub fn dependencies(&self) -> impl Iterator<Item = &DependencyDescriptor> {
        self.constructor_dependencies
            .iter()
            .chain(self.field_dependencies.values())
    }
}
