//! Edge Sync - 机上订单与地面后端的同步引擎
//!
//! # 架构概述
//!
//! 本 crate 在边缘节点上运行，负责把本地订单推送到后端，并处理两端并发修改：
//!
//! - **冲突检测** (`conflict`): 比较本地与远端副本，输出冲突类型与严重程度
//! - **冲突解决** (`conflict`): 自动策略、合并、优先级评分与人工解决
//! - **同步编排** (`sync`): 分块推送、重试退避、限流、取消与统计
//! - **协作方** (`store`, `backend`): 本地存储与后端客户端的 trait 边界
//! - **事件** (`listener`): 同步过程的监听器通知
//!
//! # 模块结构
//!
//! ```text
//! edge-sync/src/
//! ├── core/          # 配置、错误
//! ├── conflict/      # 冲突检测、解决、合并
//! ├── backend/       # BackendClient + 内存模拟后端
//! ├── store/         # OrderStore + 内存存储
//! ├── listener/      # 监听器与事件
//! ├── sync/          # 同步服务、重试、统计、校验
//! └── utils/         # 日志
//! ```

pub mod backend;
pub mod conflict;
pub mod core;
pub mod listener;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use backend::{BackendClient, Fault, InMemoryBackend};
pub use conflict::{ConflictDetector, ConflictResolver, DetectionError, ResolutionError};
pub use core::{EngineError, EngineResult, SyncConfig};
pub use listener::{ChannelListener, ListenerId, SyncEvent, SyncListener};
pub use store::{MemoryOrderStore, OrderStore};
pub use sync::{RunState, SyncService, ValidationReport};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_from_config, init_logger_with_file};
