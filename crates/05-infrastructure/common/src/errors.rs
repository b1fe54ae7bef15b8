//! 错误类型定义
//!
//! 容器的错误按来源划分为若干族, 最终都可以汇入 [`ContainerError`]。

use crate::lifecycle::ContainerState;
use crate::metadata::{TargetKind, Token};
use thiserror::Error;

/// 用户代码返回的通用错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
///
/// 元数据声明、组件注册以及容器状态使用不当时产生。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("组件标识重复: {token}")]
    DuplicateToken { token: Token },

    #[error("装饰器 {decorator} 只能用于{expected}, 实际目标: {actual}")]
    WrongTarget {
        decorator: &'static str,
        expected: TargetKind,
        actual: String,
    },

    #[error("装饰器 {decorator} 只能用于组件类, {class} 尚未声明为组件")]
    ComponentRequired {
        decorator: &'static str,
        class: String,
    },

    #[error("类 {class} 不是组件")]
    NotAComponent { class: String },

    #[error("元数据类型未注册: {kind}")]
    UnregisteredMetadataKind { kind: &'static str },

    #[error("类 {class} 已声明父类 {existing}, 不能再声明父类 {requested}")]
    ConflictingParent {
        class: String,
        existing: String,
        requested: String,
    },

    #[error("类继承链存在环: {class}")]
    CyclicHierarchy { class: String },

    #[error("组件 {token} 标记为 {role}, 但没有提供对应的接口视图")]
    MissingView { token: Token, role: &'static str },

    #[error("容器状态非法: 期望 {expected}, 实际 {actual}")]
    InvalidState {
        expected: ContainerState,
        actual: ContainerState,
    },
}

/// 注入错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    #[error("无法注入非组件类型: {member} 的类型 {class} 不是组件")]
    NotAComponent { member: String, class: String },

    #[error("注入点既没有显式标识也没有声明类型: {member}")]
    UntypedMember { member: String },

    #[error("组件 {owner} 的依赖无法解析: {token}")]
    Unresolved { owner: Token, token: Token },

    #[error("组件 {owner} 依赖的 {token} 已被 profile 排除")]
    ProfileExcluded { owner: Token, token: Token },

    #[error("组件 {owner} 的依赖 {token} 存在多个候选: {candidates:?}")]
    Ambiguous {
        owner: Token,
        token: Token,
        candidates: Vec<Token>,
    },

    #[error("组件 {owner} 的字段 {field} 缺少配置项: {key}")]
    MissingProperty {
        owner: Token,
        field: String,
        key: String,
    },

    #[error("单例组件 {owner} 不能直接注入请求作用域组件 {token}")]
    ScopeMismatch { owner: Token, token: Token },

    #[error("构造参数 #{index} 缺失或类型不匹配, 期望: {expected}")]
    Argument { index: usize, expected: String },

    #[error("注入值类型不匹配, 期望: {expected}")]
    UnexpectedValue { expected: String },

    #[error("配置项 {value} 无法转换为 {expected}")]
    ValueConversion { value: String, expected: String },

    #[error("组件 {class} 没有可注入字段: {field}")]
    UnknownField { class: String, field: String },

    #[error("组件 {class} 没有生命周期方法: {method}")]
    UnknownMethod { class: String, method: String },
}

/// 依赖关系错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("检测到循环依赖: {}", join_path(.path))]
    CircularDependency { path: Vec<Token> },
}

impl DependencyError {
    /// 获取循环路径, 首尾为同一个组件
    pub fn cycle_path(&self) -> &[Token] {
        match self {
            Self::CircularDependency { path } => path,
        }
    }
}

fn join_path(path: &[Token]) -> String {
    path.iter()
        .map(Token::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// 请求作用域错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("当前不在请求作用域内")]
    NoActiveRequest,

    #[error("请求作用域中的值类型不匹配: {token}")]
    ValueTypeMismatch { token: Token },
}

/// 组件查找错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("未知的组件标识: {token}")]
    UnknownToken { token: Token },

    #[error("组件标识 {token} 对应多个组件: {candidates:?}")]
    Ambiguous { token: Token, candidates: Vec<Token> },

    #[error("容器尚未就绪, 当前状态: {state}")]
    NotReady { state: ContainerState },

    #[error("组件 {token} 类型不匹配, 期望: {expected}")]
    TypeMismatch { token: Token, expected: String },
}

/// 配置源错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置文件读取失败: {source}")]
    FileReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置项无效: {key}, 原因: {message}")]
    InvalidProperty { key: String, message: String },
}

/// 组件生命周期中失败的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// 组件定义后处理
    DefinitionPostProcessing,
    /// 构造
    Construction,
    /// 字段注入
    FieldInjection,
    /// 初始化前后处理
    BeforeInit,
    /// post-construct 回调
    PostConstruct,
    /// 初始化后后处理
    AfterInit,
    /// 就绪通知
    ReadyNotification,
    /// pre-destroy 回调
    PreDestroy,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DefinitionPostProcessing => "定义后处理",
            Self::Construction => "构造",
            Self::FieldInjection => "字段注入",
            Self::BeforeInit => "初始化前处理",
            Self::PostConstruct => "post-construct",
            Self::AfterInit => "初始化后处理",
            Self::ReadyNotification => "就绪通知",
            Self::PreDestroy => "pre-destroy",
        };
        f.write_str(name)
    }
}

/// 容器统一错误类型
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("配置错误: {source}")]
    Configuration {
        #[from]
        source: ConfigurationError,
    },

    #[error("注入错误: {source}")]
    Injection {
        #[from]
        source: InjectionError,
    },

    #[error("依赖错误: {source}")]
    Dependency {
        #[from]
        source: DependencyError,
    },

    #[error("作用域错误: {source}")]
    Scope {
        #[from]
        source: ScopeError,
    },

    #[error("查找错误: {source}")]
    Lookup {
        #[from]
        source: LookupError,
    },

    #[error("组件 {token} 在{phase}阶段失败: {source}")]
    ComponentFailure {
        token: Token,
        phase: FailurePhase,
        source: BoxError,
    },

    #[error("组件扫描失败: {message}")]
    Scan { message: String },
}

impl ContainerError {
    /// 创建组件失败错误
    pub fn component_failure(token: &Token, phase: FailurePhase, source: BoxError) -> Self {
        Self::ComponentFailure {
            token: token.clone(),
            phase,
            source,
        }
    }

    /// 创建扫描错误
    pub fn scan_error(message: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
        }
    }

    /// 是否为循环依赖错误
    pub fn is_circular_dependency(&self) -> bool {
        matches!(
            self,
            Self::Dependency {
                source: DependencyError::CircularDependency { .. }
            }
        )
    }
}

/// 基础设施统一错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("容器错误: {source}")]
    ContainerError {
        #[from]
        source: ContainerError,
    },

    #[error("应用启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("应用关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ContainerResult<T> = Result<T, ContainerError>;
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
pub type InjectionResult<T> = Result<T, InjectionError>;
pub type ScopeResult<T> = Result<T, ScopeError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_path_display() {
        let error = DependencyError::CircularDependency {
            path: vec![Token::new("a"), Token::new("b"), Token::new("a")],
        };
        assert_eq!(error.to_string(), "检测到循环依赖: a -> b -> a");
        assert_eq!(error.cycle_path().len(), 3);
    }

    #[test]
    fn test_container_error_from_family() {
        let error: ContainerError = ScopeError::NoActiveRequest.into();
        assert!(matches!(
            error,
            ContainerError::Scope {
                source: ScopeError::NoActiveRequest
            }
        ));

        let error: ContainerError = DependencyError::CircularDependency {
            path: vec![Token::new("x"), Token::new("x")],
        }
        .into();
        assert!(error.is_circular_dependency());
    }
}
