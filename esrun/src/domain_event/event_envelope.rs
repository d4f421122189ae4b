use crate::domain_event::{DomainEvent, Metadata};
use crate::identity::Identity;
use crate::value_object::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 事件信封：事件载荷加上持久化所需的元信息
///
/// `version` 是该事件在其实体全序中的 1 起始序号，严格递增且连续；
/// `origin` 为产生该事件的实体标识。信封一经构造即不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct EventEnvelope<E>
where
    E: DomainEvent,
{
    pub event_id: Uuid,
    pub payload: E,
    pub origin: Identity,
    pub version: Version,
    pub metadata: Metadata,
    pub occurred_at: DateTime<Utc>,
}

impl<E> EventEnvelope<E>
where
    E: DomainEvent,
{
    pub fn new(payload: E, origin: Identity, version: Version, metadata: Metadata) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payload,
            origin,
            version,
            metadata,
            occurred_at: Utc::now(),
        }
    }
}
