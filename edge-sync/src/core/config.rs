use std::time::Duration;

use super::error::{EngineError, EngineResult};

/// 同步引擎配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | SYNC_MAX_RETRIES | 3 | 可重试错误的最大重试次数 |
/// | SYNC_INITIAL_RETRY_DELAY_MS | 5000 | 首次重试延迟(毫秒) |
/// | SYNC_MAX_RETRY_DELAY_MS | 60000 | 重试延迟上限(毫秒) |
/// | SYNC_REQUEST_TIMEOUT_MS | 30000 | 单次后端调用超时(毫秒) |
/// | SYNC_CONFLICT_WINDOW_SECS | 60 | 时间戳冲突窗口(秒) |
/// | SYNC_MAX_CONCURRENT_PUSHES | 4 | 并发推送上限 |
/// | SYNC_RATE_LIMIT_BACKOFF_SECS | 300 | 限流默认退避(秒) |
/// | SYNC_AUTO_RESOLVE | true | 同步时自动解决冲突 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 滚动日志目录 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// SYNC_MAX_RETRIES=5 SYNC_CONFLICT_WINDOW_SECS=30 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 可重试错误的最大重试次数 (不含首次调用)
    pub max_retries: u32,
    /// 首次重试延迟 (毫秒)，之后每次翻倍
    pub initial_retry_delay_ms: u64,
    /// 重试延迟上限 (毫秒)
    pub max_retry_delay_ms: u64,
    /// 单次后端调用超时 (毫秒)
    pub request_timeout_ms: u64,
    /// 时间戳冲突窗口 (秒)
    pub conflict_window_secs: u64,
    /// 并发推送上限，实际值还受后端限流约束
    pub max_concurrent_pushes: usize,
    /// 后端未给出 retry-after 时的限流退避 (秒)
    pub rate_limit_backoff_secs: u64,
    /// 同步过程中是否自动解决可自动解决的冲突
    pub auto_resolve: bool,
    /// 日志级别
    pub log_level: String,
    /// 日志目录 (可选)
    pub log_dir: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl SyncConfig {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            max_retries: env_or("SYNC_MAX_RETRIES", 3),
            initial_retry_delay_ms: env_or("SYNC_INITIAL_RETRY_DELAY_MS", 5000),
            max_retry_delay_ms: env_or("SYNC_MAX_RETRY_DELAY_MS", 60_000),
            request_timeout_ms: env_or("SYNC_REQUEST_TIMEOUT_MS", 30_000),
            conflict_window_secs: env_or("SYNC_CONFLICT_WINDOW_SECS", 60),
            max_concurrent_pushes: env_or("SYNC_MAX_CONCURRENT_PUSHES", 4),
            rate_limit_backoff_secs: env_or("SYNC_RATE_LIMIT_BACKOFF_SECS", 300),
            auto_resolve: env_or("SYNC_AUTO_RESOLVE", true),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 先加载 `.env` 文件，再从环境变量读取
    pub fn load() -> EngineResult<Self> {
        // .env 不存在不是错误
        dotenv::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// 测试配置：无退避延迟，短超时
    pub fn for_tests() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 0,
            max_retry_delay_ms: 0,
            request_timeout_ms: 1000,
            conflict_window_secs: 60,
            max_concurrent_pushes: 4,
            rate_limit_backoff_secs: 300,
            auto_resolve: true,
            log_level: "debug".into(),
            log_dir: None,
            environment: "test".into(),
        }
    }

    /// 检查配置是否自洽
    pub fn validate(&self) -> EngineResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(EngineError::Config(
                "SYNC_REQUEST_TIMEOUT_MS must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_pushes == 0 {
            return Err(EngineError::Config(
                "SYNC_MAX_CONCURRENT_PUSHES must be greater than 0".into(),
            ));
        }
        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(EngineError::Config(
                "SYNC_INITIAL_RETRY_DELAY_MS must not exceed SYNC_MAX_RETRY_DELAY_MS".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn conflict_window(&self) -> Duration {
        Duration::from_secs(self.conflict_window_secs)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
