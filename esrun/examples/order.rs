/// Order 实体示例
/// 演示命令驱动的事件溯源运行时：下单、取消、空闲回收与重新装载
use async_trait::async_trait;
use esrun::command::Command;
use esrun::domain_event::{DomainEvent, Metadata};
use esrun::entity::{Entity, EntityCell};
use esrun::error::{DomainError, DomainResult};
use esrun::identity::Identity;
use esrun::persist::{EventSink, EventSource, InMemoryEventStore};
use esrun::repository::Repository;
use esrun::timer::FakeTimers;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// 领域模型定义
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Order {
    placed: bool,
    cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum OrderEvent {
    OrderPlaced,
    OrderCancelled,
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &str {
        match self {
            OrderEvent::OrderPlaced => "OrderPlaced",
            OrderEvent::OrderCancelled => "OrderCancelled",
        }
    }
}

impl Entity for Order {
    const TYPE: &'static str = "Order";
    type Event = OrderEvent;

    fn apply(&mut self, event: &Self::Event) -> DomainResult<()> {
        match event {
            OrderEvent::OrderPlaced => {
                self.placed = true;
                Ok(())
            }
            OrderEvent::OrderCancelled => {
                self.cancelled = true;
                Ok(())
            }
        }
    }
}

struct Place;

#[async_trait]
impl Command<Order> for Place {
    async fn execute(&self, entity: &mut EntityCell<Order>) -> DomainResult<()> {
        if entity.state().cancelled {
            return Err(DomainError::invalid_state("order is already cancelled"));
        }
        if entity.state().placed {
            return Ok(());
        }
        entity.emit(OrderEvent::OrderPlaced)
    }

    fn metadata(&self) -> Metadata {
        Metadata::new().with("channel", "demo")
    }
}

struct Cancel {
    reason: String,
}

#[async_trait]
impl Command<Order> for Cancel {
    async fn execute(&self, entity: &mut EntityCell<Order>) -> DomainResult<()> {
        if self.reason.trim().is_empty() {
            return Err(DomainError::invalid_command("cancellation requires a reason"));
        }
        if entity.state().cancelled {
            return Ok(());
        }
        entity.emit(OrderEvent::OrderCancelled)
    }

    fn metadata(&self) -> Metadata {
        Metadata::new().with("reason", self.reason.clone())
    }
}

// ============================================================================
// 运行流程
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store: InMemoryEventStore<OrderEvent> = InMemoryEventStore::new();
    let timers = FakeTimers::new();

    let repo: Repository<Order> = Repository::builder()
        .source(Arc::new(store.clone()) as Arc<dyn EventSource<OrderEvent>>)
        .sink(Arc::new(store.clone()) as Arc<dyn EventSink<OrderEvent>>)
        .timer_provider(Arc::new(timers.clone()))
        .build();

    let id = Identity::new("Order", "ORDER-1");

    // 首次命令触发惰性装载（空历史）并持久化 OrderPlaced
    let placed = repo.run_command(&id, Place).await?;
    println!("placed: version={}", placed[0].version.value());

    // 幂等：重复下单不产生新事实
    let again = repo.run_command(&id, Place).await?;
    println!("placed again: {} new events", again.len());

    // 空闲回收：定时器触发后实例被移出注册表
    timers.flush();
    println!("live after eviction: {}", repo.live_count());

    // 下一条命令重新装载历史，取消事件续接版本序列
    let cancelled = repo
        .run_command(
            &id,
            Cancel {
                reason: "customer request".to_string(),
            },
        )
        .await?;
    println!("cancelled: version={}", cancelled[0].version.value());

    for envelope in store.envelopes() {
        println!(
            "tape: {} {} v{}",
            envelope.origin,
            envelope.payload.event_type(),
            envelope.version.value()
        );
    }

    Ok(())
}
