//! 内存版事件存储（InMemoryEventStore）
//!
//! 以互斥保护的事件带（tape）同时实现 `EventSink` 与 `EventSource`：
//! - `persist`：整批追加，批内顺序保持；
//! - `load`：按完整标识（类型 + id）过滤出该实体的历史并以流产出；
//! - 典型用途：测试环境、示例与本地开发。

use crate::domain_event::{DomainEvent, EventEnvelope};
use crate::error::{DomainError, DomainResult};
use crate::identity::Identity;
use crate::persist::{EnvelopeStream, EventSink, EventSource};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::sync::{Arc, Mutex};

/// 共享事件带存储；`Clone` 共享同一条带
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore<E>
where
    E: DomainEvent,
{
    tape: Arc<Mutex<Vec<EventEnvelope<E>>>>,
}

impl<E> InMemoryEventStore<E>
where
    E: DomainEvent,
{
    pub fn new() -> Self {
        Self {
            tape: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 当前事件带的快照（断言用）
    pub fn envelopes(&self) -> Vec<EventEnvelope<E>> {
        self.tape.lock().unwrap().clone()
    }

    /// 事件带长度
    pub fn len(&self) -> usize {
        self.tape.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tape.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl<E> EventSink<E> for InMemoryEventStore<E>
where
    E: DomainEvent,
{
    async fn persist(&self, envelopes: Vec<EventEnvelope<E>>) -> DomainResult<()> {
        let mut tape = self
            .tape
            .lock()
            .map_err(|_| DomainError::persistence("event tape poisoned"))?;
        tape.extend(envelopes);
        Ok(())
    }
}

#[async_trait]
impl<E> EventSource<E> for InMemoryEventStore<E>
where
    E: DomainEvent,
{
    async fn load(&self, identity: &Identity) -> DomainResult<EnvelopeStream<E>> {
        let history: Vec<EventEnvelope<E>> = {
            let tape = self
                .tape
                .lock()
                .map_err(|_| DomainError::load("event tape poisoned"))?;
            tape.iter()
                .filter(|envelope| &envelope.origin == identity)
                .cloned()
                .collect()
        };
        Ok(stream::iter(history.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryEventStore;
    use crate::domain_event::{DomainEvent, EventEnvelope, Metadata};
    use crate::identity::Identity;
    use crate::persist::{EventSink, EventSource};
    use crate::value_object::Version;
    use futures_util::StreamExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping;

    impl DomainEvent for Ping {
        fn event_type(&self) -> &str {
            "Ping"
        }
    }

    #[tokio::test]
    async fn load_filters_by_full_identity() {
        let store = InMemoryEventStore::new();
        let a = Identity::new("Order", "A");
        let b = Identity::new("Order", "B");
        let other_type = Identity::new("Invoice", "A");

        store
            .persist(vec![
                EventEnvelope::new(Ping, a.clone(), Version::from_value(1), Metadata::default()),
                EventEnvelope::new(Ping, b.clone(), Version::from_value(1), Metadata::default()),
                EventEnvelope::new(
                    Ping,
                    other_type.clone(),
                    Version::from_value(1),
                    Metadata::default(),
                ),
                EventEnvelope::new(Ping, a.clone(), Version::from_value(2), Metadata::default()),
            ])
            .await
            .unwrap();

        let stream = store.load(&a).await.unwrap();
        let loaded: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].version, Version::from_value(1));
        assert_eq!(loaded[1].version, Version::from_value(2));
        assert!(loaded.iter().all(|e| e.origin == a));
    }
}
