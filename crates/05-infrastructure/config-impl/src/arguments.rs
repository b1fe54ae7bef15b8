//! 进程参数配置源

use infrastructure_common::PropertyResolver;
use std::collections::BTreeMap;
use tracing::debug;

/// 可执行文件路径的配置键
pub const EXECUTABLE_KEY: &str = "application.process.executable";
/// 入口参数的配置键
pub const ENTRY_KEY: &str = "application.process.entry";

/// 进程参数配置源
///
/// 第一个参数为可执行文件, 第二个参数为入口。其余参数中 `key=value` 按键值读取,
/// 不带 `=` 的参数视为值为 `"true"` 的开关。参数前的 `--` 会被去掉。
#[derive(Debug, Clone)]
pub struct ProcessArgumentsSource {
    values: BTreeMap<String, String>,
    priority: i32,
}

impl ProcessArgumentsSource {
    /// 从当前进程参数加载
    pub fn from_env() -> Self {
        Self::new(std::env::args())
    }

    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = BTreeMap::new();
        let mut args = args.into_iter().map(Into::into);

        if let Some(executable) = args.next() {
            values.insert(EXECUTABLE_KEY.to_string(), executable);
        }
        if let Some(entry) = args.next() {
            values.insert(ENTRY_KEY.to_string(), entry);
        }
        for arg in args {
            let arg = arg.trim().trim_start_matches("--");
            match arg.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    values.insert(key.trim().to_string(), value.trim().to_string());
                }
                Some(_) => debug!("忽略没有键的参数: {}", arg),
                None if !arg.is_empty() => {
                    values.insert(arg.to_string(), "true".to_string());
                }
                None => {}
            }
        }

        debug!("解析了 {} 个进程参数", values.len());
        Self {
            values,
            priority: 300,
        }
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertyResolver for ProcessArgumentsSource {
    fn resolve_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn name(&self) -> &str {
        "arguments"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_forms() {
        let source = ProcessArgumentsSource::new([
            "/usr/bin/node",
            "main.js",
            "server.port=9090",
            "--verbose",
            "--application.profiles.active=dev,test",
            "=orphan",
        ]);

        assert_eq!(source.resolve_value(EXECUTABLE_KEY), Some("/usr/bin/node".to_string()));
        assert_eq!(source.resolve_value(ENTRY_KEY), Some("main.js".to_string()));
        assert_eq!(source.resolve_value("server.port"), Some("9090".to_string()));
        assert_eq!(source.resolve_value("verbose"), Some("true".to_string()));
        assert_eq!(
            source.resolve_value("application.profiles.active"),
            Some("dev,test".to_string())
        );
        assert_eq!(source.keys().len(), 5);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let source = ProcessArgumentsSource::new(["app", "run", "filter=a=b"]);
        assert_eq!(source.resolve_value("filter"), Some("a=b".to_string()));
    }

    #[test]
    fn test_key_and_value_trimmed() {
        let source = ProcessArgumentsSource::new(["app", "run", " a = b ", " --debug ", " = x"]);
        assert_eq!(source.resolve_value("a"), Some("b".to_string()));
        assert_eq!(source.resolve_value("debug"), Some("true".to_string()));
        assert_eq!(source.keys().len(), 4);
    }

    #[test]
    fn test_no_arguments() {
        let source = ProcessArgumentsSource::new(Vec::<String>::new());
        assert!(source.keys().is_empty());
        assert_eq!(source.resolve_value(EXECUTABLE_KEY), None);
    }
}
