//! 组件扫描器实现
//!
//! - [`StaticScanner`]: 显式列出的组件类
//! - [`InventoryScanner`]: 通过 `inventory::submit!` 在编译期登记的组件类

use async_trait::async_trait;
use di_abstractions::{ComponentScanner, DiscoveredClass};
use infrastructure_common::{
    class_of, Component, ComponentClass, ContainerResult, MetadataStore,
};
use std::sync::Arc;
use tracing::debug;

/// 静态组件扫描器
#[derive(Clone)]
pub struct StaticScanner {
    name: String,
    classes: Vec<Arc<dyn ComponentClass>>,
}

impl Default for StaticScanner {
    fn default() -> Self {
        Self::new("static")
    }
}

impl StaticScanner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    /// 添加组件类
    pub fn with_class(mut self, class: Arc<dyn ComponentClass>) -> Self {
        self.classes.push(class);
        self
    }

    /// 添加组件类型
    pub fn with<T: Component>(self) -> Self {
        self.with_class(class_of::<T>())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[async_trait]
impl ComponentScanner for StaticScanner {
    async fn discover_classes(&self, store: &MetadataStore) -> ContainerResult<Vec<DiscoveredClass>> {
        let mut discovered = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            discovered.push(DiscoveredClass::collect(store, Arc::clone(class))?);
        }
        Ok(discovered)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 组件声明函数, 写入元数据并返回组件类
pub type DeclareFn = fn(&MetadataStore) -> ContainerResult<Arc<dyn ComponentClass>>;

/// 编译期登记的组件声明
///
/// ```ignore
/// di_impl::inventory::submit! {
///     di_impl::ComponentDeclaration::new("greeter", declare_greeter)
/// }
/// ```
pub struct ComponentDeclaration {
    name: &'static str,
    declare: DeclareFn,
}

impl ComponentDeclaration {
    pub const fn new(name: &'static str, declare: DeclareFn) -> Self {
        Self { name, declare }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

inventory::collect!(ComponentDeclaration);

/// 基于 inventory 的组件扫描器
///
/// 发现结果按类名排序, 与链接顺序无关。
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryScanner;

impl InventoryScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComponentScanner for InventoryScanner {
    async fn discover_classes(&self, store: &MetadataStore) -> ContainerResult<Vec<DiscoveredClass>> {
        let mut discovered = Vec::new();
        for declaration in inventory::iter::<ComponentDeclaration> {
            debug!("登记的组件声明: {}", declaration.name);
            let class = (declaration.declare)(store)?;
            discovered.push(DiscoveredClass::collect(store, class)?);
        }
        discovered.sort_by(|a, b| a.metadata.class.cmp(&b.metadata.class));
        Ok(discovered)
    }

    fn name(&self) -> &str {
        "inventory"
    }
}
