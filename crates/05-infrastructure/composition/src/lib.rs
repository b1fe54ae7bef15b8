//! # 应用组合层
//!
//! 将配置源, 应用上下文和请求分发组合成一个可运行的应用。
//!
//! ## 主要功能
//!
//! - **应用构建器**: 组装配置源, 组件扫描器和日志
//! - **请求分发**: 控制器和拦截器在就绪时登记, 每个请求在独立的请求作用域内处理
//! - **生命周期管理**: 启动, 停止以及等待关闭信号
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::{Application, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Application::builder()
//!         .add_config_env_vars("APP")
//!         .add_process_arguments()
//!         .scan_inventory()
//!         .build();
//!
//!     app.start().await?;
//!     let response = app.dispatch(Request::get("/health")).await;
//!     println!("{}: {}", response.status, response.body);
//!
//!     app.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod builder;
pub mod dispatcher;

// 重新导出主要类型
pub use application::{Application, ApplicationMetrics};
pub use builder::{ApplicationBuilder, LoggingConfig};
pub use dispatcher::{
    Controller, Dispatcher, Interceptor, Request, RequestMethod, Response, RouteDefinition,
    REQUEST_ID_HEADER,
};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
