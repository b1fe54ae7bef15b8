//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义组件注册、实例化规划和组件查询的核心接口。
//!
//! ## 核心接口
//!
//! - [`ComponentRegistry`] - 组件注册表接口
//! - [`ComponentScanner`] - 组件扫描器接口
//! - [`ResolutionPlanner`] - 实例化规划接口
//! - [`ApplicationContext`] - 应用上下文接口

pub mod container;
pub mod planner;
pub mod registry;
pub mod scanner;

pub use container::*;
pub use planner::*;
pub use registry::*;
pub use scanner::*;
