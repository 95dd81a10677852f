// ==========================================
// 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 重算 worker 跑在多个线程上，日志带线程ID便于区分任务
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 未设置 RUST_LOG 时的过滤规则: 全局 info，队列重试细节 debug
const DEFAULT_FILTER: &str = "info,cabinet_risk_engine::engine::recalc_queue=debug";

/// 测试只看本 crate 的 debug 日志，屏蔽 tokio 等依赖
const TEST_FILTER: &str = "warn,cabinet_risk_engine=debug";

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 覆盖默认过滤规则
///   例如: RUST_LOG=cabinet_risk_engine::engine::inventory_risk=trace
///
/// # 示例
/// ```no_run
/// cabinet_risk_engine::logging::init();
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        // worker 并发执行
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

/// 初始化测试环境的日志系统
///
/// 多个测试重复调用时只有第一次生效
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(TEST_FILTER))
        .with_thread_ids(true)
        .with_test_writer()
        .try_init();
}
