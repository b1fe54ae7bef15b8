//! # 示例应用程序
//!
//! 演示配置源组合, profile 选择, 组件注入以及请求作用域内的请求分发。

mod components;

use anyhow::Context;
use clap::Parser;
use config_impl::MapPropertySource;
use infrastructure_common::{MetadataStore, ACTIVE_PROFILES_KEY};
use infrastructure_composition::{Application, LoggingConfig, Request, REQUEST_ID_HEADER};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn IoC 示例应用")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/app.toml")]
    config: PathBuf,

    /// 激活的 profile, 可重复
    #[arg(short, long)]
    profile: Vec<String>,

    /// 使用 JSON 日志
    #[arg(long)]
    json_logs: bool,

    /// 演示请求完成后等待 Ctrl-C
    #[arg(long)]
    wait: bool,

    /// 其余参数作为 `key=value` 配置
    #[arg(trailing_var_arg = true)]
    properties: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app = build_application(&args)?;
    info!("启动 Lorn IoC 示例应用");
    app.start().await.context("应用启动失败")?;

    if let Some(stats) = app.context().stats() {
        info!("容器统计: {}", serde_json::to_string(&stats)?);
    }
    info!("实例化顺序: {:?}", app.context().instantiation_order());

    demonstrate_requests(&app).await?;

    let report = if args.wait {
        info!("等待退出信号");
        app.run_until_signal().await?
    } else {
        app.stop()?
    };
    info!(
        "应用已关闭, 销毁组件 {} 个, 失败 {} 个",
        report.destroyed.len(),
        report.failures.len()
    );
    Ok(())
}

/// 构建应用
fn build_application(args: &Args) -> anyhow::Result<Application> {
    let logging = if args.json_logs {
        LoggingConfig::production()
    } else {
        LoggingConfig::development()
    };

    let store = MetadataStore::global();
    let mut builder = components::declare_components(&store)?
        .into_iter()
        .fold(Application::builder(), |builder, class| builder.with_class(class))
        .with_logging(logging)
        .with_metadata_store(Arc::clone(&store))
        .scan_inventory()
        .add_post_processor(Arc::new(components::CreationLogger))
        .add_property_source(
            MapPropertySource::new("defaults")
                .with("app.name", "Lorn Demo")
                .with(ACTIVE_PROFILES_KEY, "dev")
                .with_priority(-100),
        )
        .add_optional_config_toml(&args.config)?
        .add_config_env_vars("APP")
        .add_arguments(
            std::iter::once(std::env::args().next().unwrap_or_default())
                .chain(std::iter::once("demo".to_string()))
                .chain(args.properties.iter().cloned()),
        );

    if !args.profile.is_empty() {
        builder = builder.with_active_profiles(args.profile.iter().cloned());
    }
    Ok(builder.build())
}

/// 演示请求分发
async fn demonstrate_requests(app: &Application) -> anyhow::Result<()> {
    let requests = vec![
        Request::get("/hello/lorn").with_header(REQUEST_ID_HEADER, "demo-1"),
        Request::get("/clock"),
        Request::get("/hello/guest").with_header("x-blocked", "演示拦截"),
        Request::get("/missing"),
    ];

    for request in requests {
        let line = format!("{} {}", request.method, request.path);
        let response = app.dispatch(request).await;
        info!(
            "{} -> {} {}",
            line,
            response.status,
            serde_json::to_string(&response.body)?
        );
    }

    let metrics = app.metrics();
    info!(
        "已分发 {} 个请求, 其中 {} 个失败",
        metrics.requests_dispatched, metrics.requests_failed
    );
    Ok(())
}
