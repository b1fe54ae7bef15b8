//! # 依赖注入具体实现
//!
//! 提供组件注册表, 实例化规划器, 组件扫描器和应用上下文的具体实现。
//!
//! ```ignore
//! let context = ApplicationContextImpl::builder()
//!     .add_scanner(StaticScanner::default().with::<OrderService>())
//!     .with_active_profiles(["dev"])
//!     .build();
//! context.start().await?;
//! let service = context.get_as::<OrderService>(&Token::new("orderService"))?;
//! ```

pub mod builder;
pub mod context;
mod instantiation;
pub mod planner;
pub mod registry;
pub mod scanner;

pub use builder::ApplicationContextBuilder;
pub use context::ApplicationContextImpl;
pub use planner::DepthFirstPlanner;
pub use registry::ComponentRegistryImpl;
pub use scanner::{ComponentDeclaration, DeclareFn, InventoryScanner, StaticScanner};

pub use inventory;
