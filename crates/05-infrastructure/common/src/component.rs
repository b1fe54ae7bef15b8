//! 组件基础接口定义
//!
//! 用户类型实现 [`Component`], 容器通过对象安全的 [`ComponentClass`] 操作它们。

use crate::errors::{BoxError, InjectionError};
use crate::injection::{ConstructorArgs, Injected};
use crate::metadata::{ClassId, Token};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 组件基础 trait
///
/// 容器按元数据调用这些方法: 先构造, 再逐个注入字段, 最后按名称调用生命周期方法。
/// 字段注入发生在实例共享之后, 因此可变字段需要内部可变性。
pub trait Component: Send + Sync + Sized + 'static {
    /// 使用构造参数创建实例
    fn construct(args: &mut ConstructorArgs) -> Result<Self, BoxError>;

    /// 注入字段
    fn inject(&self, field: &str, _value: Injected) -> Result<(), BoxError> {
        Err(InjectionError::UnknownField {
            class: std::any::type_name::<Self>().to_string(),
            field: field.to_string(),
        }
        .into())
    }

    /// 调用生命周期方法
    fn invoke(&self, method: &str) -> Result<(), BoxError> {
        Err(InjectionError::UnknownMethod {
            class: std::any::type_name::<Self>().to_string(),
            method: method.to_string(),
        }
        .into())
    }

    /// 以接口视图暴露自身
    ///
    /// 实现时用 [`view_of`] 包装, 例如 `view_of::<dyn Greeter>(self)`。
    fn view(self: Arc<Self>, _interface: TypeId) -> Option<Instance> {
        None
    }
}

/// 将接口视图包装为实例
pub fn view_of<V: ?Sized + Send + Sync + 'static>(view: Arc<V>) -> Instance {
    Arc::new(view)
}

/// 组件类
///
/// [`Component`] 的对象安全形式, 注册表中保存的就是它。
pub trait ComponentClass: Send + Sync + 'static {
    /// 类标识
    fn class_id(&self) -> ClassId;

    /// 构造实例
    fn construct(&self, args: &mut ConstructorArgs) -> Result<Instance, BoxError>;

    /// 注入字段
    fn inject(&self, instance: &Instance, field: &str, value: Injected) -> Result<(), BoxError>;

    /// 调用生命周期方法
    fn invoke(&self, instance: &Instance, method: &str) -> Result<(), BoxError>;

    /// 获取接口视图
    fn view(&self, instance: &Instance, interface: TypeId) -> Option<Instance>;
}

/// 基于具体类型的组件类
pub struct TypedClass<T>(PhantomData<fn() -> T>);

impl<T: Component> TypedClass<T> {
    fn downcast(instance: &Instance) -> Result<Arc<T>, BoxError> {
        Arc::clone(instance).downcast::<T>().map_err(|_| {
            InjectionError::UnexpectedValue {
                expected: std::any::type_name::<T>().to_string(),
            }
            .into()
        })
    }
}

impl<T: Component> ComponentClass for TypedClass<T> {
    fn class_id(&self) -> ClassId {
        ClassId::of::<T>()
    }

    fn construct(&self, args: &mut ConstructorArgs) -> Result<Instance, BoxError> {
        let instance: Instance = Arc::new(T::construct(args)?);
        Ok(instance)
    }

    fn inject(&self, instance: &Instance, field: &str, value: Injected) -> Result<(), BoxError> {
        Self::downcast(instance)?.inject(field, value)
    }

    fn invoke(&self, instance: &Instance, method: &str) -> Result<(), BoxError> {
        Self::downcast(instance)?.invoke(method)
    }

    fn view(&self, instance: &Instance, interface: TypeId) -> Option<Instance> {
        Self::downcast(instance).ok()?.view(interface)
    }
}

/// 获取类型对应的组件类
pub fn class_of<T: Component>() -> Arc<dyn ComponentClass> {
    Arc::new(TypedClass::<T>(PhantomData))
}

/// 容器中的组件引用
///
/// `target` 是构造出来的原始实例, 字段注入和生命周期方法都作用于它;
/// `instance` 是对外暴露的实例, 后处理器可以把它替换成包装对象。
#[derive(Clone)]
pub struct ComponentRef {
    token: Token,
    instance: Instance,
    target: Instance,
    class: Arc<dyn ComponentClass>,
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("token", &self.token)
            .field("class", &self.class.class_id())
            .field("replaced", &self.is_replaced())
            .finish()
    }
}

impl ComponentRef {
    /// 创建新的组件引用
    pub fn new(token: Token, target: Instance, class: Arc<dyn ComponentClass>) -> Self {
        Self {
            token,
            instance: Arc::clone(&target),
            target,
            class,
        }
    }

    /// 组件标识
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// 对外暴露的实例
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// 原始实例
    pub fn target(&self) -> &Instance {
        &self.target
    }

    /// 组件类
    pub fn class(&self) -> &Arc<dyn ComponentClass> {
        &self.class
    }

    /// 替换对外暴露的实例
    pub fn replace_instance(mut self, instance: Instance) -> Self {
        self.instance = instance;
        self
    }

    /// 实例是否已被后处理器替换
    pub fn is_replaced(&self) -> bool {
        !same_allocation(&self.instance, &self.target)
    }

    /// 是否指向同一个实例
    pub fn same_instance(&self, other: &Self) -> bool {
        same_allocation(&self.instance, &other.instance)
    }

    /// 按具体类型获取实例
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// 按接口获取实例
    ///
    /// 被替换的实例若本身就是该接口的视图也可以取到。
    pub fn view<V: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<V>> {
        if let Ok(view) = Arc::clone(&self.instance).downcast::<Arc<V>>() {
            return Some(Arc::clone(&*view));
        }
        self.class
            .view(&self.instance, TypeId::of::<V>())
            .and_then(|view| view.downcast::<Arc<V>>().ok())
            .map(|view| Arc::clone(&*view))
    }
}

/// 实例槽位
///
/// 组件构造完成后先以 `InProgress` 占位, 字段循环依赖时可以拿到尚未初始化完的实例。
#[derive(Debug, Clone)]
pub enum InstanceSlot {
    InProgress(ComponentRef),
    Ready(ComponentRef),
}

impl InstanceSlot {
    /// 槽位中的组件
    pub fn component(&self) -> &ComponentRef {
        match self {
            Self::InProgress(component) | Self::Ready(component) => component,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

fn same_allocation(a: &Instance, b: &Instance) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}
