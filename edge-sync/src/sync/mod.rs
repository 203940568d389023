//! 同步编排
//!
//! - [`SyncService`] - 运行调度、pull/push 阶段、冲突处理
//! - [`retry`] - 指数退避重试与超时
//! - [`state`] - 运行状态与订单锁
//! - [`stats`] - 运行统计
//! - [`validation`] - 本地数据校验

pub mod retry;
pub mod service;
pub mod state;
pub mod stats;
pub mod validation;

pub use retry::{CallContext, CallFailure, RetryPolicy, call_with_retry};
pub use service::SyncService;
pub use state::{OrderLocks, RunState};
pub use stats::StatsCollector;
pub use validation::{ValidationIssue, ValidationReport, validate_order, validate_orders};
