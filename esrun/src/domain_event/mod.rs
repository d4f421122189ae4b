//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`），以及将事件与来源、
//! 版本、元数据封装后的 `EventEnvelope`。信封是持久化与回放的基本单位。

mod domain_event_trait;
mod event_envelope;
mod metadata;

pub use domain_event_trait::DomainEvent;
pub use event_envelope::EventEnvelope;
pub use metadata::Metadata;
