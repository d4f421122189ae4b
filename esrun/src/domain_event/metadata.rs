use crate::error::DomainResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 事件侧元数据：由命令提供、原样盖印到该命令产生的每个信封上的键值映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(HashMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式写入，便于在命令实现中就地构造
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// 写入任意可序列化的结构化值；序列化失败以 `Serde` 错误返回
    pub fn try_with(mut self, key: impl Into<String>, value: &impl Serialize) -> DomainResult<Self> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<HashMap<String, Value>> for Metadata {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self(entries)
    }
}
