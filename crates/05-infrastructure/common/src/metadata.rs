//! 元数据定义
//!
//! 提供组件标识、依赖描述符以及按类挂载的元数据存储。
//!
//! 元数据以"记录类型"为键挂在类上。读取时沿父类链从根到当前类逐层合并,
//! 子类的同名键覆盖父类, 父类本身的记录不会被修改。

use crate::errors::{ConfigurationError, ConfigurationResult, InjectionError, InjectionResult};
use crate::lifecycle::Lifetime;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// 组件标识
///
/// 不可变的字符串, 克隆开销很低。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(Arc<str>);

impl Token {
    /// 创建新的标识
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// 以类的简短名称作为标识
    pub fn for_class(class: &ClassId) -> Self {
        Self::new(class.short_name())
    }

    /// 获取字符串形式
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", &*self.0)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 类标识
///
/// 相等性只取决于 [`TypeId`], 名称用于日志和默认标识。
#[derive(Clone, Copy)]
pub struct ClassId {
    type_id: TypeId,
    name: &'static str,
}

impl ClassId {
    /// 从类型获取类标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 类型ID
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整类型名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for ClassId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassId {}

impl std::hash::Hash for ClassId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for ClassId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.type_id.cmp(&other.type_id))
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.name)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// 依赖基数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// 恰好一个实例
    One,
    /// 零个或多个实例
    Many,
}

/// 依赖描述符
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyDescriptor {
    pub token: Token,
    pub cardinality: Cardinality,
}

impl DependencyDescriptor {
    /// 创建新的依赖描述符
    pub fn new(token: impl Into<Token>, cardinality: Cardinality) -> Self {
        Self {
            token: token.into(),
            cardinality,
        }
    }

    /// 单实例依赖
    pub fn one(token: impl Into<Token>) -> Self {
        Self::new(token, Cardinality::One)
    }

    /// 多实例依赖
    pub fn many(token: impl Into<Token>) -> Self {
        Self::new(token, Cardinality::Many)
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// 注入点声明的成员类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredType {
    /// 成员（或集合元素）的类, 无法得知时为 `None`
    pub class: Option<ClassId>,
    /// 成员是否为集合类型
    pub multi: bool,
}

impl DeclaredType {
    /// 单值成员
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            class: Some(ClassId::of::<T>()),
            multi: false,
        }
    }

    /// 集合成员
    pub fn many_of<T: ?Sized + 'static>() -> Self {
        Self {
            class: Some(ClassId::of::<T>()),
            multi: true,
        }
    }

    /// 元素类型未知的集合成员
    pub fn untyped_collection() -> Self {
        Self {
            class: None,
            multi: true,
        }
    }
}

/// 注入点的标识来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// 显式给出的标识
    Explicit(Token),
    /// 由成员类型推断, 在注册阶段解析为该类的组件标识
    Class(ClassId),
}

/// 注入点
///
/// 声明时记录, 组件注册时再解析成 [`DependencyDescriptor`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPoint {
    pub member: String,
    pub source: TokenSource,
    pub cardinality: Cardinality,
}

impl InjectionPoint {
    /// 根据显式标识和声明类型创建注入点
    ///
    /// 既没有显式标识也没有可用类型时返回 [`InjectionError::UntypedMember`]。
    pub fn create(
        explicit: Option<Token>,
        declared: Option<DeclaredType>,
        member: impl Into<String>,
    ) -> InjectionResult<Self> {
        let member = member.into();
        let cardinality = match declared {
            Some(declared) if declared.multi => Cardinality::Many,
            _ => Cardinality::One,
        };

        let source = match (explicit, declared.and_then(|d| d.class)) {
            (Some(token), _) => TokenSource::Explicit(token),
            (None, Some(class)) => TokenSource::Class(class),
            (None, None) => return Err(InjectionError::UntypedMember { member }),
        };

        Ok(Self {
            member,
            source,
            cardinality,
        })
    }

    /// 解析为依赖描述符
    ///
    /// `component_token` 返回某个类作为组件时的标识, 不是组件时返回 `None`。
    pub fn resolve(
        &self,
        component_token: impl Fn(&ClassId) -> Option<Token>,
    ) -> InjectionResult<DependencyDescriptor> {
        let token = match &self.source {
            TokenSource::Explicit(token) => token.clone(),
            TokenSource::Class(class) => {
                component_token(class).ok_or_else(|| InjectionError::NotAComponent {
                    member: self.member.clone(),
                    class: class.name().to_string(),
                })?
            }
        };
        Ok(DependencyDescriptor::new(token, self.cardinality))
    }
}

/// 元数据的挂载目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// 类
    Class,
    /// 属性
    Property,
    /// 方法
    Method,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "类",
            Self::Property => "属性",
            Self::Method => "方法",
        };
        f.write_str(name)
    }
}

/// 元数据记录
///
/// 每种记录类型各自决定如何与父类的记录合并。
pub trait MetadataRecord: Clone + Default + Send + Sync + 'static {
    /// 记录类型名称
    const KIND: &'static str;

    /// 允许挂载的目标
    const TARGET: TargetKind;

    /// 是否沿继承链合并; 不继承的记录只读取类自身
    const INHERITED: bool = true;

    /// 将 `overlay` 合并到当前记录上, `overlay` 中的键优先
    fn merge_from(&mut self, overlay: &Self);
}

/// 组件角色标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFlags {
    pub controller: bool,
    pub interceptor: bool,
    pub post_processor: bool,
    pub definition_post_processor: bool,
}

impl ComponentFlags {
    fn merge_from(&mut self, overlay: &Self) {
        self.controller |= overlay.controller;
        self.interceptor |= overlay.interceptor;
        self.post_processor |= overlay.post_processor;
        self.definition_post_processor |= overlay.definition_post_processor;
    }
}

/// 组件记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentRecord {
    /// 显式标识, 未给出时使用类名
    pub token: Option<Token>,
    pub lifetime: Lifetime,
    /// 限定符别名
    pub aliases: BTreeSet<Token>,
    pub profiles: BTreeSet<String>,
    pub flags: ComponentFlags,
}

impl MetadataRecord for ComponentRecord {
    const KIND: &'static str = "component";
    const TARGET: TargetKind = TargetKind::Class;
    const INHERITED: bool = false;

    fn merge_from(&mut self, overlay: &Self) {
        if overlay.token.is_some() {
            self.token = overlay.token.clone();
        }
        if overlay.lifetime != Lifetime::default() {
            self.lifetime = overlay.lifetime;
        }
        self.aliases.extend(overlay.aliases.iter().cloned());
        self.profiles.extend(overlay.profiles.iter().cloned());
        self.flags.merge_from(&overlay.flags);
    }
}

/// 构造器注入记录
///
/// 子类声明了构造器参数时整体替换父类的声明。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructorRecord {
    pub parameters: Vec<InjectionPoint>,
}

impl MetadataRecord for ConstructorRecord {
    const KIND: &'static str = "constructor";
    const TARGET: TargetKind = TargetKind::Class;

    fn merge_from(&mut self, overlay: &Self) {
        if !overlay.parameters.is_empty() {
            self.parameters = overlay.parameters.clone();
        }
    }
}

/// 字段注入记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionRecord {
    pub fields: BTreeMap<String, InjectionPoint>,
}

impl MetadataRecord for InjectionRecord {
    const KIND: &'static str = "injection";
    const TARGET: TargetKind = TargetKind::Property;

    fn merge_from(&mut self, overlay: &Self) {
        for (field, point) in &overlay.fields {
            self.fields.insert(field.clone(), point.clone());
        }
    }
}

/// 配置值注入记录, 字段名到配置键
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueRecord {
    pub fields: BTreeMap<String, String>,
}

impl MetadataRecord for ValueRecord {
    const KIND: &'static str = "value";
    const TARGET: TargetKind = TargetKind::Property;

    fn merge_from(&mut self, overlay: &Self) {
        for (field, key) in &overlay.fields {
            self.fields.insert(field.clone(), key.clone());
        }
    }
}

/// 延迟注入记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicInjectionRecord {
    pub fields: BTreeMap<String, InjectionPoint>,
}

impl MetadataRecord for DynamicInjectionRecord {
    const KIND: &'static str = "dynamic-injection";
    const TARGET: TargetKind = TargetKind::Property;

    fn merge_from(&mut self, overlay: &Self) {
        for (field, point) in &overlay.fields {
            self.fields.insert(field.clone(), point.clone());
        }
    }
}

/// 请求局部字段记录, 字段名到请求存储中的标识
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLocalRecord {
    pub fields: BTreeMap<String, Token>,
}

impl MetadataRecord for RequestLocalRecord {
    const KIND: &'static str = "request-local";
    const TARGET: TargetKind = TargetKind::Property;

    fn merge_from(&mut self, overlay: &Self) {
        for (field, token) in &overlay.fields {
            self.fields.insert(field.clone(), token.clone());
        }
    }
}

/// 生命周期回调记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleRecord {
    pub post_construct: Option<String>,
    pub pre_destroy: Option<String>,
}

impl MetadataRecord for LifecycleRecord {
    const KIND: &'static str = "lifecycle";
    const TARGET: TargetKind = TargetKind::Method;

    fn merge_from(&mut self, overlay: &Self) {
        if overlay.post_construct.is_some() {
            self.post_construct = overlay.post_construct.clone();
        }
        if overlay.pre_destroy.is_some() {
            self.pre_destroy = overlay.pre_destroy.clone();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct KindInfo {
    name: &'static str,
    target: TargetKind,
}

/// 全局元数据存储
static GLOBAL_METADATA_STORE: Lazy<Arc<MetadataStore>> =
    Lazy::new(|| Arc::new(MetadataStore::new()));

/// 元数据存储
///
/// 启动之前写入, 启动之后只读。
pub struct MetadataStore {
    records: RwLock<HashMap<(ClassId, TypeId), Box<dyn Any + Send + Sync>>>,
    kinds: RwLock<HashMap<TypeId, KindInfo>>,
    parents: RwLock<HashMap<ClassId, ClassId>>,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("records", &self.records.read().len())
            .field("kinds", &self.kinds.read().len())
            .field("parents", &self.parents.read().len())
            .finish()
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// 创建新的元数据存储, 内置记录类型已注册
    pub fn new() -> Self {
        let store = Self {
            records: RwLock::new(HashMap::new()),
            kinds: RwLock::new(HashMap::new()),
            parents: RwLock::new(HashMap::new()),
        };
        store.register_kind::<ComponentRecord>();
        store.register_kind::<ConstructorRecord>();
        store.register_kind::<InjectionRecord>();
        store.register_kind::<ValueRecord>();
        store.register_kind::<DynamicInjectionRecord>();
        store.register_kind::<RequestLocalRecord>();
        store.register_kind::<LifecycleRecord>();
        store
    }

    /// 获取全局元数据存储
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_METADATA_STORE)
    }

    /// 注册记录类型
    pub fn register_kind<R: MetadataRecord>(&self) {
        self.kinds.write().insert(
            TypeId::of::<R>(),
            KindInfo {
                name: R::KIND,
                target: R::TARGET,
            },
        );
    }

    /// 记录类型是否已注册
    pub fn is_kind_registered<R: MetadataRecord>(&self) -> bool {
        self.kinds.read().contains_key(&TypeId::of::<R>())
    }

    /// 记录类型允许的挂载目标
    pub fn kind_target<R: MetadataRecord>(&self) -> ConfigurationResult<TargetKind> {
        self.kinds
            .read()
            .get(&TypeId::of::<R>())
            .map(|info| info.target)
            .ok_or(ConfigurationError::UnregisteredMetadataKind { kind: R::KIND })
    }

    fn ensure_registered<R: MetadataRecord>(&self) -> ConfigurationResult<()> {
        self.kind_target::<R>().map(|_| ())
    }

    /// 读取类自身的记录, 不存在时返回默认值
    pub fn get_own<R: MetadataRecord>(&self, class: ClassId) -> R {
        self.records
            .read()
            .get(&(class, TypeId::of::<R>()))
            .and_then(|record| record.downcast_ref::<R>())
            .cloned()
            .unwrap_or_default()
    }

    /// 类自身是否有该类型的记录
    pub fn has_own<R: MetadataRecord>(&self, class: ClassId) -> bool {
        self.records
            .read()
            .contains_key(&(class, TypeId::of::<R>()))
    }

    /// 替换类自身的记录
    pub fn set<R: MetadataRecord>(&self, class: ClassId, record: R) -> ConfigurationResult<()> {
        self.ensure_registered::<R>()?;
        self.records
            .write()
            .insert((class, TypeId::of::<R>()), Box::new(record));
        Ok(())
    }

    /// 修改类自身的记录
    pub fn update<R, F>(&self, class: ClassId, f: F) -> ConfigurationResult<()>
    where
        R: MetadataRecord,
        F: FnOnce(&mut R),
    {
        self.ensure_registered::<R>()?;
        let mut records = self.records.write();
        let entry = records
            .entry((class, TypeId::of::<R>()))
            .or_insert_with(|| Box::new(R::default()));
        if let Some(record) = entry.downcast_mut::<R>() {
            f(record);
        }
        Ok(())
    }

    /// 读取合并后的记录
    ///
    /// 沿父类链从根合并到当前类, 不继承的记录只返回类自身的值。
    pub fn get_merged<R: MetadataRecord>(&self, class: ClassId) -> ConfigurationResult<R> {
        self.ensure_registered::<R>()?;
        if !R::INHERITED {
            return Ok(self.get_own(class));
        }

        let mut merged = R::default();
        for ancestor in self.ancestry(class) {
            if self.has_own::<R>(ancestor) {
                merged.merge_from(&self.get_own::<R>(ancestor));
            }
        }
        Ok(merged)
    }

    /// 声明父类
    ///
    /// 每个类只能有一个父类, 且继承链不能成环。
    pub fn declare_parent(&self, class: ClassId, parent: ClassId) -> ConfigurationResult<()> {
        let mut parents = self.parents.write();

        if let Some(existing) = parents.get(&class) {
            if *existing == parent {
                return Ok(());
            }
            return Err(ConfigurationError::ConflictingParent {
                class: class.name().to_string(),
                existing: existing.name().to_string(),
                requested: parent.name().to_string(),
            });
        }

        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == class {
                return Err(ConfigurationError::CyclicHierarchy {
                    class: class.name().to_string(),
                });
            }
            cursor = parents.get(&current).copied();
        }

        parents.insert(class, parent);
        Ok(())
    }

    /// 获取父类
    pub fn parent_of(&self, class: ClassId) -> Option<ClassId> {
        self.parents.read().get(&class).copied()
    }

    /// 继承链, 根在前, 当前类在最后
    pub fn ancestry(&self, class: ClassId) -> Vec<ClassId> {
        let parents = self.parents.read();
        let mut chain = vec![class];
        let mut cursor = parents.get(&class).copied();
        while let Some(current) = cursor {
            if chain.contains(&current) {
                break;
            }
            chain.push(current);
            cursor = parents.get(&current).copied();
        }
        chain.reverse();
        chain
    }

    /// 类是否声明为组件
    pub fn is_component(&self, class: ClassId) -> bool {
        self.has_own::<ComponentRecord>(class)
    }

    /// 类作为组件时的标识
    pub fn component_token(&self, class: ClassId) -> Option<Token> {
        if !self.is_component(class) {
            return None;
        }
        let record = self.get_own::<ComponentRecord>(class);
        Some(record.token.unwrap_or_else(|| Token::for_class(&class)))
    }
}

/// 某个类合并后的全部元数据
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    pub class: ClassId,
    pub component: ComponentRecord,
    pub constructor: ConstructorRecord,
    pub injections: InjectionRecord,
    pub values: ValueRecord,
    pub dynamic: DynamicInjectionRecord,
    pub request_locals: RequestLocalRecord,
    pub lifecycle: LifecycleRecord,
}

impl ClassMetadata {
    /// 从元数据存储中收集
    pub fn collect(store: &MetadataStore, class: ClassId) -> ConfigurationResult<Self> {
        if !store.is_component(class) {
            return Err(ConfigurationError::NotAComponent {
                class: class.name().to_string(),
            });
        }

        Ok(Self {
            class,
            component: store.get_merged(class)?,
            constructor: store.get_merged(class)?,
            injections: store.get_merged(class)?,
            values: store.get_merged(class)?,
            dynamic: store.get_merged(class)?,
            request_locals: store.get_merged(class)?,
            lifecycle: store.get_merged(class)?,
        })
    }

    /// 组件标识
    pub fn token(&self) -> Token {
        self.component
            .token
            .clone()
            .unwrap_or_else(|| Token::for_class(&self.class))
    }
}
