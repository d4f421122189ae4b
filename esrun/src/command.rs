//! 命令（Command）
//!
//! 针对单个实体的一次意图性工作单元：
//! - `execute` 是唯一允许触发实体发射新事件的入口；
//! - 可选地钉住期望版本（`expected_version`），不匹配即拒绝执行；
//! - `metadata` 盖印到本次命令产生的每个事件信封上。
//!
use crate::domain_event::Metadata;
use crate::entity::{Entity, EntityCell};
use crate::error::DomainResult;
use crate::value_object::Version;
use async_trait::async_trait;

/// 实体命令接口
///
/// 实现者以 trait object 形式进入监督器的执行队列，因此要求 `Send + Sync`；
/// `execute` 可以在 I/O 边界挂起，挂起只会推迟、不会重排同一实体的后续命令。
#[async_trait]
pub trait Command<E>: Send + Sync
where
    E: Entity,
{
    /// 执行命令：读取实体状态、通过 `EntityCell::emit` 产生零个或多个事件
    async fn execute(&self, entity: &mut EntityCell<E>) -> DomainResult<()>;

    /// 期望的已提交版本；返回 `Some` 时不匹配即以 `VersionConflict` 拒绝
    fn expected_version(&self) -> Option<Version> {
        None
    }

    /// 盖印到产出信封上的元数据（默认空映射）
    fn metadata(&self) -> Metadata {
        Metadata::default()
    }
}
