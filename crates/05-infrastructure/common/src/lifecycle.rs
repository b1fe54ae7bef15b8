//! 组件生命周期管理

use crate::errors::BoxError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// 组件生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// 单例模式 - 容器启动时创建, 整个容器生命周期内只有一个实例
    #[default]
    Singleton,
    /// 请求模式 - 每个请求作用域内首次访问时创建, 请求结束时销毁
    Request,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Request => f.write_str("request"),
        }
    }
}

/// 容器状态
///
/// 状态只能按声明顺序前进, 启动失败时直接进入 `Destroyed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerState {
    Created,
    Scanning,
    Planning,
    Initializing,
    Ready,
    Destroying,
    Destroyed,
}

impl ContainerState {
    const ALL: [Self; 7] = [
        Self::Created,
        Self::Scanning,
        Self::Planning,
        Self::Initializing,
        Self::Ready,
        Self::Destroying,
        Self::Destroyed,
    ];

    /// 编码为整数, 便于原子存储
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 从整数解码
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// 正常流程中的下一个状态
    pub fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        self == Self::Destroyed
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Scanning => "SCANNING",
            Self::Planning => "PLANNING",
            Self::Initializing => "INITIALIZING",
            Self::Ready => "READY",
            Self::Destroying => "DESTROYING",
            Self::Destroyed => "DESTROYED",
        };
        f.write_str(name)
    }
}

type ShutdownCallback = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

struct ShutdownHook {
    id: u64,
    name: String,
    callback: ShutdownCallback,
}

/// 关闭钩子列表
///
/// 容器销毁时按注册顺序执行并清空。
#[derive(Default)]
pub struct ShutdownHooks {
    next_id: AtomicU64,
    hooks: Mutex<Vec<ShutdownHook>>,
}

impl fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("pending", &self.hooks.lock().len())
            .finish()
    }
}

impl ShutdownHooks {
    /// 创建新的钩子列表
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册关闭钩子
    pub fn register<F>(self: &Arc<Self>, name: impl Into<String>, callback: F) -> ShutdownHookHandle
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        debug!("注册关闭钩子: {}", name);
        self.hooks.lock().push(ShutdownHook {
            id,
            name,
            callback: Box::new(callback),
        });
        ShutdownHookHandle {
            id,
            hooks: Arc::downgrade(self),
        }
    }

    /// 待执行的钩子数量
    pub fn pending(&self) -> usize {
        self.hooks.lock().len()
    }

    /// 执行全部钩子, 返回失败的钩子名称
    ///
    /// 单个钩子失败不会影响后续钩子。
    pub fn run_all(&self) -> Vec<String> {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let mut failures = Vec::new();
        for hook in hooks {
            debug!("执行关闭钩子: {}", hook.name);
            if let Err(e) = (hook.callback)() {
                warn!("关闭钩子执行失败: {}, 错误: {}", hook.name, e);
                failures.push(hook.name);
            }
        }
        failures
    }

    fn remove(&self, id: u64) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|hook| hook.id != id);
        hooks.len() != before
    }
}

/// 关闭钩子句柄
///
/// 丢弃句柄不会注销钩子, 需要提前注销时调用 [`ShutdownHookHandle::release`]。
#[derive(Debug)]
pub struct ShutdownHookHandle {
    id: u64,
    hooks: Weak<ShutdownHooks>,
}

impl ShutdownHookHandle {
    /// 注销钩子, 钩子已执行或容器已释放时返回 `false`
    pub fn release(self) -> bool {
        self.hooks
            .upgrade()
            .map(|hooks| hooks.remove(self.id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_state_order() {
        assert_eq!(ContainerState::Created.next(), Some(ContainerState::Scanning));
        assert_eq!(ContainerState::Ready.next(), Some(ContainerState::Destroying));
        assert_eq!(ContainerState::Destroyed.next(), None);
        assert_eq!(
            ContainerState::from_u8(ContainerState::Planning.as_u8()),
            Some(ContainerState::Planning)
        );
        assert!(ContainerState::Destroyed.is_terminal());
    }

    #[test]
    fn test_shutdown_hooks_run_in_order() {
        let hooks = ShutdownHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            hooks.register(name, move || {
                order.lock().push(name);
                if name == "second" {
                    return Err("boom".into());
                }
                Ok(())
            });
        }

        let failures = hooks.run_all();
        assert_eq!(failures, vec!["second".to_string()]);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
        assert_eq!(hooks.pending(), 0);
    }

    #[test]
    fn test_released_hook_not_run() {
        let hooks = ShutdownHooks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let handle = hooks.register("counter", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(handle.release());
        hooks.run_all();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
