//! 标识（Identity）
//!
//! 以 `(entity_type, id)` 定位一个实体实例：既是仓储的路由键，
//! 也是该实体产生的每个事件信封上的 `origin` 印记。
//!
use serde::{Deserialize, Serialize};
use std::fmt;

/// 实体标识，不可变值对象
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    entity_type: String,
    id: String,
}

impl Identity {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}
