//! 配置源实现
//!
//! 每个配置源都实现 [`PropertyResolver`], 以点分隔的键读取字符串值。

use infrastructure_common::{ConfigError, ConfigResult, PropertyResolver};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 内存配置源
#[derive(Debug, Clone, Default)]
pub struct MapPropertySource {
    name: String,
    values: BTreeMap<String, String>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            priority: 0,
        }
    }

    /// 由键值对构造
    pub fn from_pairs<I, K, V>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(Self::new(name), |source, (k, v)| source.with(k, v))
    }

    /// 添加配置项
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PropertyResolver for MapPropertySource {
    fn resolve_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// 环境变量配置源
///
/// `APP_SERVER_PORT` 在前缀 `APP`, 分隔符 `_` 下映射为 `server.port`。
#[derive(Debug, Clone)]
pub struct EnvironmentPropertySource {
    prefix: String,
    separator: String,
    priority: i32,
    env_vars: HashMap<String, String>,
}

impl EnvironmentPropertySource {
    /// 从当前进程环境加载
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// 从给定的环境变量加载
    pub fn from_vars<I>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::with_separator(prefix, "_", vars)
    }

    /// 使用自定义分隔符加载
    pub fn with_separator<I>(prefix: impl Into<String>, separator: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut source = Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 200,
            env_vars: HashMap::new(),
        };
        source.load_env_vars(vars);
        source
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn load_env_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        debug!("加载环境变量, 前缀: {}", self.prefix);
        for (key, value) in vars {
            if let Some(config_key) = self.env_key_to_config_key(&key) {
                self.env_vars.insert(config_key, value);
            }
        }
        debug!("加载了 {} 个环境变量", self.env_vars.len());
    }

    /// 将环境变量键转换为配置键, 不带前缀的键返回 `None`
    fn env_key_to_config_key(&self, env_key: &str) -> Option<String> {
        let rest = env_key.strip_prefix(&self.prefix)?;
        let rest = if self.prefix.is_empty() {
            rest
        } else {
            rest.strip_prefix(&self.separator)?
        };
        if rest.is_empty() {
            return None;
        }
        Some(rest.replace(&self.separator, ".").to_lowercase())
    }

    /// 将配置键转换为环境变量键
    pub fn config_key_to_env_key(&self, config_key: &str) -> String {
        let key = config_key.replace('.', &self.separator).to_uppercase();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}{}{}", self.prefix, self.separator, key)
        }
    }
}

impl PropertyResolver for EnvironmentPropertySource {
    fn resolve_value(&self, key: &str) -> Option<String> {
        self.env_vars.get(key).cloned()
    }

    fn name(&self) -> &str {
        "environment"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.env_vars.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// TOML 文件配置源
///
/// 嵌套表以 `.` 展开, 标量数组以逗号拼接。
#[derive(Debug, Clone)]
pub struct TomlPropertySource {
    file_path: PathBuf,
    config: toml::Table,
    priority: i32,
}

impl TomlPropertySource {
    /// 加载 TOML 文件
    pub fn new<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file_path = path.as_ref().to_path_buf();
        if !file_path.exists() {
            return Err(ConfigError::FileNotFound {
                path: file_path.display().to_string(),
            });
        }
        debug!("加载 TOML 配置文件: {}", file_path.display());
        let content = std::fs::read_to_string(&file_path)?;
        let mut source = Self::parse(&content)?;
        source.file_path = file_path;
        debug!("TOML 配置文件加载完成");
        Ok(source)
    }

    /// 从字符串解析
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config = content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::ParseError { source: Box::new(e) })?;
        Ok(Self {
            file_path: PathBuf::new(),
            config,
            priority: 100,
        })
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 从嵌套路径获取值
    fn get_nested_value(&self, path: &str) -> Option<&toml::Value> {
        let mut parts = path.split('.');
        let mut current = self.config.get(parts.next()?)?;
        for part in parts {
            match current {
                toml::Value::Table(table) => current = table.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// 递归收集叶子键
    fn collect_keys(table: &toml::Table, prefix: &str, keys: &mut Vec<String>) {
        for (key, value) in table {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                toml::Value::Table(nested) => Self::collect_keys(nested, &full_key, keys),
                _ => keys.push(full_key),
            }
        }
    }
}

/// 标量转为字符串, 表不可直接取值
fn render(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(render)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(",")),
        toml::Value::Table(_) => None,
    }
}

impl PropertyResolver for TomlPropertySource {
    fn resolve_value(&self, key: &str) -> Option<String> {
        self.get_nested_value(key).and_then(render)
    }

    fn name(&self) -> &str {
        "toml"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.config, "", &mut keys);
        keys.sort();
        keys
    }
}
