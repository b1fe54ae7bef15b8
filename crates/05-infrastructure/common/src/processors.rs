//! 组件后处理扩展点

use crate::component::ComponentRef;
use crate::definition::ComponentDefinition;
use crate::errors::BoxError;

/// 组件定义后处理器
///
/// 在组件实例化之前调用, 可以修改定义。
pub trait ComponentDefinitionPostProcessor: Send + Sync {
    /// 后处理定义
    fn post_process_definition(&self, definition: &mut ComponentDefinition) -> Result<(), BoxError>;
}

/// 组件后处理器
///
/// 在 post-construct 回调前后调用, 返回值替换对外暴露的实例。
pub trait ComponentPostProcessor: Send + Sync {
    /// 初始化前处理
    fn post_process_before_init(
        &self,
        _definition: &ComponentDefinition,
        component: ComponentRef,
    ) -> Result<ComponentRef, BoxError> {
        Ok(component)
    }

    /// 初始化后处理
    fn post_process_after_init(
        &self,
        _definition: &ComponentDefinition,
        component: ComponentRef,
    ) -> Result<ComponentRef, BoxError> {
        Ok(component)
    }
}

/// 组件就绪监听器
///
/// 每个单例组件完成初始化后调用一次。返回错误会中止容器启动。
pub trait ComponentReadyListener: Send + Sync {
    /// 组件就绪
    fn on_component_ready(
        &self,
        definition: &ComponentDefinition,
        component: &ComponentRef,
    ) -> Result<(), BoxError>;
}
