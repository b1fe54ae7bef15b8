//! # Infrastructure Common
//!
//! IoC 容器的公共类型: 组件标识、元数据存储、组件模型以及请求作用域。
//!
//! ## 核心组件
//!
//! - [`MetadataStore`] - 按类挂载、读取时沿继承链合并的元数据
//! - [`DependencyDescriptor`] - 按标识和基数描述一个依赖
//! - [`Component`] / [`ComponentClass`] - 受容器管理的组件
//! - [`ComponentDefinition`] - 注册表条目
//! - [`request_scope`] - 请求隔离的值存储
//!
//! ## 设计原则
//!
//! - 以标识而非具体类型寻址组件, 多个实现可以共享同一个标识
//! - 元数据写入时只记录, 读取时才合并
//! - 容器启动后实例池只读

pub mod component;
pub mod configuration;
pub mod decorators;
pub mod definition;
pub mod errors;
pub mod injection;
pub mod lifecycle;
pub mod metadata;
pub mod processors;
pub mod request_scope;

pub use component::*;
pub use configuration::*;
pub use decorators::{declare, ClassDeclaration, ComponentRole, DecoratorTarget};
pub use definition::*;
pub use errors::*;
pub use injection::*;
pub use lifecycle::*;
pub use metadata::*;
pub use processors::*;
pub use request_scope::{
    current_request, current_request_id, get_request_value, is_request_active,
    set_request_value, spawn_in_request, RequestId, RequestStore,
};
