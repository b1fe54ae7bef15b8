//! 深度优先实例化规划器

use di_abstractions::{ComponentRegistry, InstantiationPlan, ResolutionPlanner};
use infrastructure_common::{
    Cardinality, ComponentDefinition, ContainerResult, DependencyDescriptor, DependencyError,
    InjectionError, Lifetime, Token,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// 深度优先规划器
///
/// 只有构造依赖参与排序; 字段依赖和延迟依赖只校验能否解析。
/// 节点按标识顺序访问, 依赖按声明顺序访问, 因此结果与发现顺序无关。
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthFirstPlanner;

impl DepthFirstPlanner {
    pub fn new() -> Self {
        Self
    }

    /// 解析依赖的目标, 并检查作用域
    fn targets(
        registry: &dyn ComponentRegistry,
        owner: &ComponentDefinition,
        descriptor: &DependencyDescriptor,
        check_scope: bool,
    ) -> ContainerResult<Vec<Arc<ComponentDefinition>>> {
        let targets = match descriptor.cardinality {
            Cardinality::One => vec![registry.resolve_one(&owner.token, &descriptor.token)?],
            Cardinality::Many => registry.candidates(&descriptor.token),
        };

        if check_scope && owner.lifetime == Lifetime::Singleton {
            if let Some(target) = targets.iter().find(|t| t.lifetime == Lifetime::Request) {
                return Err(InjectionError::ScopeMismatch {
                    owner: owner.token.clone(),
                    token: target.token.clone(),
                }
                .into());
            }
        }
        Ok(targets)
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        tokens: &[Token],
        states: &mut [VisitState],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), DependencyError> {
        states[node] = VisitState::InProgress;
        path.push(node);

        for &next in &edges[node] {
            match states[next] {
                VisitState::Unvisited => Self::visit(next, edges, tokens, states, path, order)?,
                VisitState::InProgress => {
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<Token> =
                        path[start..].iter().map(|&n| tokens[n].clone()).collect();
                    cycle.push(tokens[next].clone());
                    return Err(DependencyError::CircularDependency { path: cycle });
                }
                VisitState::Done => {}
            }
        }

        path.pop();
        states[node] = VisitState::Done;
        order.push(node);
        Ok(())
    }
}

impl ResolutionPlanner for DepthFirstPlanner {
    fn plan(&self, registry: &dyn ComponentRegistry) -> ContainerResult<InstantiationPlan> {
        let entries = registry.all_entries();
        let index: HashMap<Token, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, definition)| (definition.token.clone(), i))
            .collect();
        let tokens: Vec<Token> = entries.iter().map(|d| d.token.clone()).collect();

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
        for (i, definition) in entries.iter().enumerate() {
            for descriptor in &definition.constructor_dependencies {
                for target in Self::targets(registry, definition, descriptor, true)? {
                    if let Some(&j) = index.get(&target.token) {
                        edges[i].push(j);
                    }
                }
            }
            for descriptor in definition.field_dependencies.values() {
                Self::targets(registry, definition, descriptor, true)?;
            }
            for descriptor in definition.dynamic_dependencies.values() {
                Self::targets(registry, definition, descriptor, false)?;
            }
        }

        let mut states = vec![VisitState::Unvisited; entries.len()];
        let mut order = Vec::with_capacity(entries.len());
        let mut path = Vec::new();
        for node in 0..entries.len() {
            if states[node] == VisitState::Unvisited {
                Self::visit(node, &edges, &tokens, &mut states, &mut path, &mut order)?;
            }
        }

        let mut plan = InstantiationPlan::default();
        for node in order {
            let definition = Arc::clone(&entries[node]);
            match definition.lifetime {
                Lifetime::Singleton => plan.singletons.push(definition),
                Lifetime::Request => plan.request_scoped.push(definition),
            }
        }

        debug!("实例化顺序: {:?}", plan.tokens());
        info!(
            "实例化计划完成: {} 个单例, {} 个请求作用域组件",
            plan.singletons.len(),
            plan.request_scoped.len()
        );
        Ok(plan)
    }

    fn name(&self) -> &str {
        "DepthFirstPlanner"
    }
}
