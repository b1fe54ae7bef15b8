//! 组合配置解析器

use dashmap::DashMap;
use infrastructure_common::PropertyResolver;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 组合配置解析器
///
/// 按优先级从高到低依次查询各配置源, 返回第一个命中的值。优先级相同时先加入的优先。
/// 命中结果会被缓存, 加入新配置源时缓存清空。
pub struct CompositePropertyResolver {
    sources: RwLock<Vec<Arc<dyn PropertyResolver>>>,
    cache: DashMap<String, Option<String>>,
}

impl fmt::Debug for CompositePropertyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositePropertyResolver")
            .field("sources", &self.source_names())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Default for CompositePropertyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositePropertyResolver {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            cache: DashMap::new(),
        }
    }

    /// 添加配置源
    pub fn with_source<R: PropertyResolver + 'static>(self, source: R) -> Self {
        self.add_source(Arc::new(source));
        self
    }

    /// 添加共享的配置源
    pub fn add_source(&self, source: Arc<dyn PropertyResolver>) {
        info!("注册配置源: {} (优先级 {})", source.name(), source.priority());
        let mut sources = self.sources.write();
        sources.push(source);
        // 稳定排序, 同优先级保持加入顺序
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
        self.cache.clear();
    }

    /// 按查询顺序列出配置源名称
    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    /// 查找提供该键的配置源名称
    pub fn origin_of(&self, key: &str) -> Option<String> {
        self.sources
            .read()
            .iter()
            .find(|s| s.resolve_value(key).is_some())
            .map(|s| s.name().to_string())
    }

    fn lookup(&self, key: &str) -> Option<String> {
        for source in self.sources.read().iter() {
            if let Some(value) = source.resolve_value(key) {
                debug!("配置 {} 来自 {}", key, source.name());
                return Some(value);
            }
        }
        None
    }
}

impl PropertyResolver for CompositePropertyResolver {
    fn resolve_value(&self, key: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(key) {
            return cached.clone();
        }
        let value = self.lookup(key);
        self.cache.insert(key.to_string(), value.clone());
        value
    }

    fn name(&self) -> &str {
        "composite"
    }

    fn priority(&self) -> i32 {
        self.sources
            .read()
            .first()
            .map_or(0, |s| s.priority())
    }

    fn keys(&self) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .sources
            .read()
            .iter()
            .flat_map(|s| s.keys())
            .collect();
        keys.into_iter().collect()
    }
}
