//! 全局配置
//!
//! 语言相关常量与调试开关都在这里定义

use std::sync::OnceLock;

/// 语言名称
pub const LANG_NAME: &str = "气";

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 源文件扩展名
pub const SOURCE_EXTENSION: &str = "qi";

/// GC 触发后堆增长因子
pub const GC_HEAP_GROW_FACTOR: usize = 2;

static LOG_GC: OnceLock<bool> = OnceLock::new();
static TRACE_EXEC: OnceLock<bool> = OnceLock::new();

/// 是否打印 GC 跟踪日志（环境变量 QI_LOG_GC）
pub fn log_gc() -> bool {
    *LOG_GC.get_or_init(|| env_flag("QI_LOG_GC"))
}

/// 是否打印指令执行跟踪（环境变量 QI_TRACE_EXEC）
pub fn trace_exec() -> bool {
    *TRACE_EXEC.get_or_init(|| env_flag("QI_TRACE_EXEC"))
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !v.is_empty() && v != "0",
        Err(_) => false,
    }
}
