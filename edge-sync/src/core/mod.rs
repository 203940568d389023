//! 核心模块 - 引擎配置与错误定义
//!
//! # 模块结构
//!
//! - [`SyncConfig`] - 同步引擎配置
//! - [`EngineError`] - 引擎错误

pub mod config;
pub mod error;

pub use config::SyncConfig;
pub use error::{EngineError, EngineResult};
