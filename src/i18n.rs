// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）和英文
// 偏差说明文本全部经由此模块生成
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use cabinet_risk_engine::i18n::t_with_args;
/// let msg = t_with_args("deviation.order_delay", &[("code", "MDF18"), ("unmet", "3")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key).to_string(), args)
}

/// 按指定语言翻译（不修改全局语言）
pub fn t_in(locale: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key, locale = locale).to_string(), args)
}

fn fill_args(mut result: String, args: &[(&str, &str)]) -> String {
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

/// 数量/金额的统一展示格式
pub fn fmt_num(value: f64) -> String {
    format!("{:.2}", value)
}

/// 比例的统一展示格式（0.125 → "12.5%"）
pub fn fmt_pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 为避免测试互相干扰，这里对修改全局语言的测试串行化。
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");

        // 恢复默认语言
        set_locale("zh-CN");
        assert_eq!(current_locale(), "zh-CN");
    }

    #[test]
    fn test_deviation_messages_per_locale() {
        let args = [("code", "MDF18"), ("unmet", "3.00")];

        let zh = t_in("zh-CN", "deviation.order_delay", &args);
        assert!(zh.contains("MDF18"));
        assert!(zh.contains("采购单"));

        let en = t_in("en", "deviation.order_delay", &args);
        assert!(en.contains("MDF18"));
        assert!(en.contains("purchase order"));
        assert!(!en.contains("%{"));
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(fmt_num(200.0), "200.00");
        assert_eq!(fmt_pct(0.125), "12.5%");
    }
}
