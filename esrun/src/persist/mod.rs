//! 持久化接口（persist）
//!
//! 运行时与持久事件存储之间的两条协作契约：
//! - `EventSink`：原子地持久化一批信封（全有或全无，批内顺序保持）；
//! - `EventSource`：按标识产出升序、有限的历史信封流，回放期间不得重启。
//!
//! 本模块只定义接口与最小类型；具体存储由基础设施适配实现，
//! crate 内附带内存版实现（`InMemoryEventStore`）用于测试与本地开发。

mod store_inmemory;

pub use store_inmemory::InMemoryEventStore;

use crate::domain_event::{DomainEvent, EventEnvelope};
use crate::error::DomainResult;
use crate::identity::Identity;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

/// 惰性信封序列：按版本升序产出，有限
pub type EnvelopeStream<E> = BoxStream<'static, DomainResult<EventEnvelope<E>>>;

/// 事件汇：持久化信封批次
#[async_trait]
pub trait EventSink<E>: Send + Sync
where
    E: DomainEvent,
{
    /// 原子地存储整批信封；失败时后续 `load` 不得观察到任何一条
    async fn persist(&self, envelopes: Vec<EventEnvelope<E>>) -> DomainResult<()>;
}

/// 事件源：加载单个标识的历史
#[async_trait]
pub trait EventSource<E>: Send + Sync
where
    E: DomainEvent,
{
    /// 产出该标识此前持久化的全部信封，按版本升序
    async fn load(&self, identity: &Identity) -> DomainResult<EnvelopeStream<E>>;
}

#[async_trait]
impl<E, T> EventSink<E> for Arc<T>
where
    E: DomainEvent,
    T: EventSink<E> + ?Sized,
{
    async fn persist(&self, envelopes: Vec<EventEnvelope<E>>) -> DomainResult<()> {
        (**self).persist(envelopes).await
    }
}

#[async_trait]
impl<E, T> EventSource<E> for Arc<T>
where
    E: DomainEvent,
    T: EventSource<E> + ?Sized,
{
    async fn load(&self, identity: &Identity) -> DomainResult<EnvelopeStream<E>> {
        (**self).load(identity).await
    }
}
