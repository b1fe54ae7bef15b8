//! 组件注册表实现

use di_abstractions::ComponentRegistry;
use infrastructure_common::{
    ComponentDefinition, ConfigurationError, ConfigurationResult, InjectionError,
    InjectionResult, Token,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 基于有序映射的组件注册表
///
/// 按标识排序保存, 保证遍历顺序与发现顺序无关。
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistryImpl {
    entries: BTreeMap<Token, Arc<ComponentDefinition>>,
    aliases: BTreeMap<Token, BTreeSet<Token>>,
    excluded: BTreeSet<Token>,
}

impl ComponentRegistryImpl {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    fn index_aliases(&mut self, definition: &ComponentDefinition) {
        for alias in &definition.aliases {
            self.aliases
                .entry(alias.clone())
                .or_default()
                .insert(definition.token.clone());
        }
    }

    fn rebuild_aliases(&mut self) {
        self.aliases.clear();
        let entries: Vec<_> = self.entries.values().cloned().collect();
        for definition in entries {
            self.index_aliases(&definition);
        }
    }

    fn alias_candidates(&self, token: &Token) -> Vec<Arc<ComponentDefinition>> {
        self.aliases
            .get(token)
            .map(|owners| {
                owners
                    .iter()
                    .filter_map(|owner| self.entries.get(owner).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ComponentRegistry for ComponentRegistryImpl {
    fn register(&mut self, definition: ComponentDefinition) -> ConfigurationResult<()> {
        if self.entries.contains_key(&definition.token) {
            return Err(ConfigurationError::DuplicateToken {
                token: definition.token,
            });
        }

        debug!(
            "注册组件: {} ({}, {})",
            definition.token,
            definition.class_id.name(),
            definition.lifetime
        );
        self.index_aliases(&definition);
        self.entries
            .insert(definition.token.clone(), Arc::new(definition));
        Ok(())
    }

    fn get(&self, token: &Token) -> Option<Arc<ComponentDefinition>> {
        self.entries.get(token).cloned()
    }

    fn all_entries(&self) -> Vec<Arc<ComponentDefinition>> {
        self.entries.values().cloned().collect()
    }

    fn candidates(&self, token: &Token) -> Vec<Arc<ComponentDefinition>> {
        let mut matched: BTreeMap<Token, Arc<ComponentDefinition>> = BTreeMap::new();
        if let Some(primary) = self.entries.get(token) {
            matched.insert(primary.token.clone(), Arc::clone(primary));
        }
        for definition in self.alias_candidates(token) {
            matched.insert(definition.token.clone(), definition);
        }
        matched.into_values().collect()
    }

    fn resolve_one(&self, owner: &Token, token: &Token) -> InjectionResult<Arc<ComponentDefinition>> {
        if let Some(primary) = self.entries.get(token) {
            return Ok(Arc::clone(primary));
        }

        let mut candidates = self.alias_candidates(token);
        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            0 if self.excluded.contains(token) => Err(InjectionError::ProfileExcluded {
                owner: owner.clone(),
                token: token.clone(),
            }),
            0 => Err(InjectionError::Unresolved {
                owner: owner.clone(),
                token: token.clone(),
            }),
            _ => Err(InjectionError::Ambiguous {
                owner: owner.clone(),
                token: token.clone(),
                candidates: candidates.iter().map(|d| d.token.clone()).collect(),
            }),
        }
    }

    fn retain_active(&mut self, active_profiles: &BTreeSet<String>) -> Vec<Arc<ComponentDefinition>> {
        let (kept, removed): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(_, definition)| definition.is_active(active_profiles));

        self.entries = kept;
        for definition in removed.values() {
            debug!(
                "组件 {} 的 profile {:?} 未激活, 已排除",
                definition.token, definition.profiles
            );
            self.excluded.insert(definition.token.clone());
            self.excluded.extend(definition.aliases.iter().cloned());
        }
        self.rebuild_aliases();

        if !removed.is_empty() {
            info!(
                "按 profile {:?} 排除了 {} 个组件",
                active_profiles,
                removed.len()
            );
        }
        removed.into_values().collect()
    }

    fn is_excluded(&self, token: &Token) -> bool {
        self.excluded.contains(token)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
