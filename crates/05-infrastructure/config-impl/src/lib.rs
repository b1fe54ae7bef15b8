//! # 配置源实现
//!
//! 为容器提供 [`PropertyResolver`](infrastructure_common::PropertyResolver) 的各种来源。
//!
//! ## 主要组件
//!
//! - [`MapPropertySource`] - 内存配置源
//! - [`EnvironmentPropertySource`] - 环境变量配置源
//! - [`ProcessArgumentsSource`] - 进程参数配置源
//! - [`TomlPropertySource`] - TOML 文件配置源
//! - [`CompositePropertyResolver`] - 按优先级组合多个配置源
//!
//! 默认优先级: 进程参数 300, 环境变量 200, TOML 文件 100, 内存 0。

pub mod arguments;
pub mod composite;
pub mod providers;

pub use arguments::{ProcessArgumentsSource, ENTRY_KEY, EXECUTABLE_KEY};
pub use composite::CompositePropertyResolver;
pub use providers::{EnvironmentPropertySource, MapPropertySource, TomlPropertySource};
