use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
///
/// 事件是不可变事实，描述一次状态迁移；应用侧通常以枚举（和类型标签的
/// match 分发）定义每个实体类型的事件集合。
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型（形如 `OrderPlaced` 或带命名空间的类型名）
    fn event_type(&self) -> &str;
}
