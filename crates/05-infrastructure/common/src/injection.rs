//! 注入值定义

use crate::component::ComponentRef;
use crate::errors::{ContainerError, ContainerResult, InjectionError, InjectionResult, LookupError, ScopeResult};
use crate::lifecycle::ContainerState;
use crate::metadata::{Cardinality, ClassId, DependencyDescriptor, Token};
use crate::request_scope;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// 注入到构造参数或字段中的值
#[derive(Debug, Clone)]
pub enum Injected {
    /// 单个组件
    One(ComponentRef),
    /// 按标识排序的组件列表, 可能为空
    Many(Vec<ComponentRef>),
    /// 配置值
    Value(String),
    /// 延迟查找句柄
    Lazy(LazyComponent),
    /// 请求局部值句柄
    RequestLocal(RequestLocal),
}

impl Injected {
    fn kind(&self) -> &'static str {
        match self {
            Self::One(_) => "单个组件",
            Self::Many(_) => "组件列表",
            Self::Value(_) => "配置值",
            Self::Lazy(_) => "延迟句柄",
            Self::RequestLocal(_) => "请求局部句柄",
        }
    }

    fn unexpected(expected: impl Into<String>) -> InjectionError {
        InjectionError::UnexpectedValue {
            expected: expected.into(),
        }
    }

    /// 取出单个组件的具体类型
    pub fn into_component<T: Any + Send + Sync>(self) -> InjectionResult<Arc<T>> {
        match self {
            Self::One(component) => component
                .downcast::<T>()
                .ok_or_else(|| Self::unexpected(std::any::type_name::<T>())),
            other => Err(Self::unexpected(format!("单个组件, 实际为{}", other.kind()))),
        }
    }

    /// 取出单个组件的接口视图
    pub fn into_view<V: ?Sized + Send + Sync + 'static>(self) -> InjectionResult<Arc<V>> {
        match self {
            Self::One(component) => component
                .view::<V>()
                .ok_or_else(|| Self::unexpected(std::any::type_name::<V>())),
            other => Err(Self::unexpected(format!("单个组件, 实际为{}", other.kind()))),
        }
    }

    /// 取出组件列表的具体类型
    pub fn into_components<T: Any + Send + Sync>(self) -> InjectionResult<Vec<Arc<T>>> {
        match self {
            Self::Many(components) => components
                .iter()
                .map(|c| {
                    c.downcast::<T>()
                        .ok_or_else(|| Self::unexpected(std::any::type_name::<T>()))
                })
                .collect(),
            other => Err(Self::unexpected(format!("组件列表, 实际为{}", other.kind()))),
        }
    }

    /// 取出组件列表的接口视图
    pub fn into_views<V: ?Sized + Send + Sync + 'static>(self) -> InjectionResult<Vec<Arc<V>>> {
        match self {
            Self::Many(components) => components
                .iter()
                .map(|c| {
                    c.view::<V>()
                        .ok_or_else(|| Self::unexpected(std::any::type_name::<V>()))
                })
                .collect(),
            other => Err(Self::unexpected(format!("组件列表, 实际为{}", other.kind()))),
        }
    }

    /// 取出配置值
    pub fn into_value(self) -> InjectionResult<String> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(Self::unexpected(format!("配置值, 实际为{}", other.kind()))),
        }
    }

    /// 取出配置值并转换类型
    pub fn parse_value<T: FromStr>(self) -> InjectionResult<T> {
        let raw = self.into_value()?;
        raw.trim()
            .parse::<T>()
            .map_err(|_| InjectionError::ValueConversion {
                value: raw.clone(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// 取出延迟查找句柄
    pub fn into_lazy(self) -> InjectionResult<LazyComponent> {
        match self {
            Self::Lazy(lazy) => Ok(lazy),
            other => Err(Self::unexpected(format!("延迟句柄, 实际为{}", other.kind()))),
        }
    }

    /// 取出请求局部值句柄
    pub fn into_request_local(self) -> InjectionResult<RequestLocal> {
        match self {
            Self::RequestLocal(local) => Ok(local),
            other => Err(Self::unexpected(format!(
                "请求局部句柄, 实际为{}",
                other.kind()
            ))),
        }
    }
}

/// 构造参数
///
/// 参数按声明顺序依次取出。
#[derive(Debug)]
pub struct ConstructorArgs {
    owner: Token,
    values: VecDeque<Injected>,
    index: usize,
}

impl ConstructorArgs {
    /// 创建新的构造参数
    pub fn new(owner: Token, values: Vec<Injected>) -> Self {
        Self {
            owner,
            values: values.into(),
            index: 0,
        }
    }

    /// 没有参数
    pub fn empty(owner: Token) -> Self {
        Self::new(owner, Vec::new())
    }

    /// 正在构造的组件标识
    pub fn owner(&self) -> &Token {
        &self.owner
    }

    /// 剩余参数数量
    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// 取出下一个参数
    pub fn next_value(&mut self) -> InjectionResult<Injected> {
        let index = self.index;
        let value = self
            .values
            .pop_front()
            .ok_or_else(|| InjectionError::Argument {
                index,
                expected: "更多构造参数".to_string(),
            })?;
        self.index += 1;
        Ok(value)
    }

    fn wrap<T>(index: usize, result: InjectionResult<T>) -> InjectionResult<T> {
        result.map_err(|e| match e {
            InjectionError::UnexpectedValue { expected } => {
                InjectionError::Argument { index, expected }
            }
            other => other,
        })
    }

    /// 下一个参数, 单个组件
    pub fn component<T: Any + Send + Sync>(&mut self) -> InjectionResult<Arc<T>> {
        let index = self.index;
        Self::wrap(index, self.next_value()?.into_component())
    }

    /// 下一个参数, 单个组件的接口视图
    pub fn view<V: ?Sized + Send + Sync + 'static>(&mut self) -> InjectionResult<Arc<V>> {
        let index = self.index;
        Self::wrap(index, self.next_value()?.into_view())
    }

    /// 下一个参数, 组件列表
    pub fn components<T: Any + Send + Sync>(&mut self) -> InjectionResult<Vec<Arc<T>>> {
        let index = self.index;
        Self::wrap(index, self.next_value()?.into_components())
    }

    /// 下一个参数, 组件列表的接口视图
    pub fn views<V: ?Sized + Send + Sync + 'static>(&mut self) -> InjectionResult<Vec<Arc<V>>> {
        let index = self.index;
        Self::wrap(index, self.next_value()?.into_views())
    }
}

/// 组件查找接口
///
/// 由容器实现, 供延迟句柄在运行时回查。
pub trait ComponentLookup: Send + Sync {
    /// 按描述符查找组件
    fn lookup(&self, descriptor: &DependencyDescriptor) -> ContainerResult<Injected>;
}

/// 延迟查找句柄
///
/// 构造时不解析依赖, 每次访问时才到容器中查找。
#[derive(Clone)]
pub struct LazyComponent {
    descriptor: DependencyDescriptor,
    lookup: Weak<dyn ComponentLookup>,
}

impl fmt::Debug for LazyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyComponent")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl LazyComponent {
    /// 创建新的延迟句柄
    pub fn new(descriptor: DependencyDescriptor, lookup: Weak<dyn ComponentLookup>) -> Self {
        Self { descriptor, lookup }
    }

    /// 依赖描述符
    pub fn descriptor(&self) -> &DependencyDescriptor {
        &self.descriptor
    }

    /// 查找当前值
    pub fn resolve(&self) -> ContainerResult<Injected> {
        let lookup = self.lookup.upgrade().ok_or(LookupError::NotReady {
            state: ContainerState::Destroyed,
        })?;
        lookup.lookup(&self.descriptor)
    }

    /// 查找单个组件
    pub fn get<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.expect_cardinality(Cardinality::One)?;
        Ok(self.resolve()?.into_component()?)
    }

    /// 查找单个组件的接口视图
    pub fn get_view<V: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<V>> {
        self.expect_cardinality(Cardinality::One)?;
        Ok(self.resolve()?.into_view()?)
    }

    /// 查找全部组件
    pub fn get_all<T: Any + Send + Sync>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.expect_cardinality(Cardinality::Many)?;
        Ok(self.resolve()?.into_components()?)
    }

    /// 查找全部组件的接口视图
    pub fn get_all_views<V: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<V>>> {
        self.expect_cardinality(Cardinality::Many)?;
        Ok(self.resolve()?.into_views()?)
    }

    fn expect_cardinality(&self, cardinality: Cardinality) -> ContainerResult<()> {
        if self.descriptor.cardinality == cardinality {
            return Ok(());
        }
        Err(ContainerError::from(InjectionError::UnexpectedValue {
            expected: format!("{:?} 基数的依赖 {}", cardinality, self.descriptor.token),
        }))
    }
}

/// 请求局部值句柄
///
/// 读写当前请求作用域中以字段为键的值, 不同请求之间互不可见。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLocal {
    token: Token,
}

impl RequestLocal {
    /// 使用指定标识
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// 字段对应的标识, 形如 `request-local:Class#field`
    pub fn token_for(class: &ClassId, field: &str) -> Token {
        Token::new(format!("request-local:{}#{}", class.short_name(), field))
    }

    /// 字段对应的句柄
    pub fn for_field(class: &ClassId, field: &str) -> Self {
        Self::new(Self::token_for(class, field))
    }

    /// 存储中的标识
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// 读取当前请求中的值
    pub fn get<T: Any + Send + Sync>(&self) -> ScopeResult<Option<Arc<T>>> {
        request_scope::get_request_value(&self.token)
    }

    /// 写入当前请求中的值
    pub fn set<T: Any + Send + Sync>(&self, value: T) -> ScopeResult<()> {
        request_scope::set_request_value(&self.token, value)
    }
}
