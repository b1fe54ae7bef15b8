//! 配置相关的基础接口定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// 激活 profile 的配置键, 值为逗号分隔的列表
pub const ACTIVE_PROFILES_KEY: &str = "application.profiles.active";

/// 配置值解析器
///
/// 容器只通过它读取 `value` 字段的配置, 具体来源由实现决定。
pub trait PropertyResolver: Send + Sync {
    /// 按键读取配置值
    fn resolve_value(&self, key: &str) -> Option<String>;

    /// 解析器名称
    fn name(&self) -> &str;

    /// 优先级, 数值越高优先级越高
    fn priority(&self) -> i32 {
        0
    }

    /// 已知的全部配置键
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: PropertyResolver + ?Sized> PropertyResolver for Arc<T> {
    fn resolve_value(&self, key: &str) -> Option<String> {
        (**self).resolve_value(key)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn priority(&self) -> i32 {
        (**self).priority()
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }
}

/// 空解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProperties;

impl PropertyResolver for NoProperties {
    fn resolve_value(&self, _key: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// 容器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// 激活的 profile
    #[serde(default)]
    pub active_profiles: BTreeSet<String>,
    /// 启动失败时是否销毁已创建的组件
    #[serde(default = "default_true")]
    pub teardown_on_failed_start: bool,
    /// 就绪监听器失败时是否中止启动, 否则只记录警告
    #[serde(default = "default_true")]
    pub listener_failures_fatal: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            active_profiles: BTreeSet::new(),
            teardown_on_failed_start: true,
            listener_failures_fatal: true,
        }
    }
}

impl ContainerConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加激活的 profile
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.active_profiles.insert(profile.into());
        self
    }

    /// 添加多个激活的 profile
    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_profiles
            .extend(profiles.into_iter().map(Into::into));
        self
    }

    /// 设置启动失败时是否销毁
    pub fn with_teardown_on_failed_start(mut self, enabled: bool) -> Self {
        self.teardown_on_failed_start = enabled;
        self
    }

    /// 设置就绪监听器失败是否中止启动
    pub fn with_listener_failures_fatal(mut self, fatal: bool) -> Self {
        self.listener_failures_fatal = fatal;
        self
    }

    /// 未显式指定 profile 时从配置中读取
    pub fn merge_properties(mut self, properties: &dyn PropertyResolver) -> Self {
        if self.active_profiles.is_empty() {
            if let Some(raw) = properties.resolve_value(ACTIVE_PROFILES_KEY) {
                self.active_profiles = parse_profiles(&raw);
            }
        }
        self
    }
}

/// 解析逗号分隔的 profile 列表
pub fn parse_profiles(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// 将 profile 列表格式化为配置值
pub fn format_profiles<'a>(profiles: impl IntoIterator<Item = &'a String>) -> String {
    profiles
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
