//! 应用主入口

use crate::builder::ApplicationBuilder;
use crate::dispatcher::{Dispatcher, Request, Response};
use chrono::{DateTime, Utc};
use config_impl::CompositePropertyResolver;
use di_abstractions::{ApplicationContext, TeardownReport};
use di_impl::ApplicationContextImpl;
use infrastructure_common::{
    ContainerState, InfrastructureError, InfrastructureResult, PropertyResolver, RequestId,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 应用
///
/// 持有应用上下文, 请求分发器和配置源。
pub struct Application {
    /// 应用上下文
    context: ApplicationContextImpl,
    /// 请求分发器
    dispatcher: Arc<Dispatcher>,
    /// 配置源
    properties: Arc<CompositePropertyResolver>,
    /// 统计信息
    metrics: RwLock<ApplicationMetrics>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.context.state())
            .field("dispatcher", &self.dispatcher)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Application {
    /// 创建应用构建器
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub(crate) fn new(
        context: ApplicationContextImpl,
        dispatcher: Arc<Dispatcher>,
        properties: Arc<CompositePropertyResolver>,
    ) -> Self {
        Self {
            context,
            dispatcher,
            properties,
            metrics: RwLock::new(ApplicationMetrics::default()),
        }
    }

    /// 启动应用
    pub async fn start(&self) -> InfrastructureResult<()> {
        info!("启动应用");
        if let Err(e) = self.context.start().await {
            error!("应用启动失败: {}", e);
            return Err(e.into());
        }
        self.metrics.write().start_time = Some(Utc::now());
        info!(
            "应用启动完成, 路由 {} 条, 拦截器 {} 个",
            self.dispatcher.routes().len(),
            self.dispatcher.interceptor_count()
        );
        Ok(())
    }

    /// 停止应用
    pub fn stop(&self) -> InfrastructureResult<TeardownReport> {
        info!("停止应用");
        let report = self.context.destroy()?;
        if !report.is_clean() {
            warn!(
                "应用停止时有 {} 个组件销毁失败, {} 个关闭钩子失败",
                report.failures.len(),
                report.failed_hooks.len()
            );
        }
        self.metrics.write().stop_time = Some(Utc::now());
        info!("应用停止完成");
        Ok(report)
    }

    /// 等待 Ctrl-C 后停止应用
    pub async fn run_until_signal(&self) -> InfrastructureResult<TeardownReport> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| InfrastructureError::ShutdownFailed {
                message: format!("等待关闭信号失败: {}", e),
            })?;
        info!("收到关闭信号");
        self.stop()
    }

    /// 分发请求
    pub async fn dispatch(&self, request: Request) -> Response {
        let response = self.dispatcher.dispatch(&self.context, request).await;
        let mut metrics = self.metrics.write();
        metrics.requests_dispatched += 1;
        if !response.is_success() {
            metrics.requests_failed += 1;
        }
        response
    }

    /// 在新的请求作用域中执行
    pub async fn handle<F: Future>(&self, body: F) -> F::Output {
        self.context.with_request(RequestId::random(), body).await
    }

    /// 读取配置值
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.resolve_value(key)
    }

    pub fn state(&self) -> ContainerState {
        self.context.state()
    }

    pub fn context(&self) -> &ApplicationContextImpl {
        &self.context
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn properties(&self) -> &Arc<CompositePropertyResolver> {
        &self.properties
    }

    pub fn metrics(&self) -> ApplicationMetrics {
        self.metrics.read().clone()
    }
}

/// 应用统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplicationMetrics {
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    /// 已分发的请求数
    pub requests_dispatched: u64,
    /// 非 2xx 响应数
    pub requests_failed: u64,
}

impl ApplicationMetrics {
    /// 运行时长, 尚未启动时为 `None`
    pub fn uptime(&self) -> Option<chrono::Duration> {
        let start = self.start_time?;
        Some(self.stop_time.unwrap_or_else(Utc::now) - start)
    }
}
