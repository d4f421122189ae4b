//! 仓储（Repository）
//!
//! 面向单一实体类型的实例注册表：`id → EntityLifecycleManager` 映射。
//! 提供"每个标识同一时刻至多一个活动实例、首次使用透明加载、
//! 空闲后透明卸载"的保证：
//! - 类型不匹配的标识立即拒绝，不产生任何副作用；
//! - 管理器惰性创建，创建时读取当前配置（空闲超时、定时器提供者）；
//! - 空闲回调触发时，仅当管理器静止（无在途命令）才从映射中移除：
//!   命令在查找管理器的同一分片临界区内登记在途许可，
//!   使真实时钟下并发触发的定时器无法回收仍在执行的实例。
//!
use crate::command::Command;
use crate::domain_event::EventEnvelope;
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::identity::Identity;
use crate::lifecycle::EntityLifecycleManager;
use crate::persist::{EventSink, EventSource};
use crate::timer::{TimerProvider, TokioTimers};
use bon::Builder;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// 默认空闲超时：5 秒
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

/// 类型范围内的实体仓储
///
/// 实体类型标签取自 `E::TYPE`，零状态工厂即 `E::default()`。
/// 配置（空闲超时、定时器提供者）在构建时注入，也可在首次使用前
/// 通过 setter 调整；两者都只影响此后创建的管理器。
#[derive(Builder)]
pub struct Repository<E>
where
    E: Entity,
{
    source: Arc<dyn EventSource<E::Event>>,
    sink: Arc<dyn EventSink<E::Event>>,
    #[builder(default = DEFAULT_IDLE_TIMEOUT)]
    idle_timeout: Duration,
    #[builder(default = Arc::new(TokioTimers) as Arc<dyn TimerProvider>)]
    timer_provider: Arc<dyn TimerProvider>,
    #[builder(skip)]
    live: Arc<DashMap<String, Arc<EntityLifecycleManager<E>>>>,
}

impl<E> Repository<E>
where
    E: Entity,
{
    /// 调整空闲超时；只影响此后创建的管理器
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// 替换定时器提供者；只影响此后创建的管理器
    pub fn set_timer_provider(&mut self, timer_provider: Arc<dyn TimerProvider>) {
        self.timer_provider = timer_provider;
    }

    /// 当前活动（已加载）实例数
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// 对给定标识执行一条命令
    ///
    /// 标识类型与 `E::TYPE` 不符时立即以 `TypeMismatch` 失败（不创建管理器）；
    /// 否则查找或创建其生命周期管理器并委托执行。并发的首次命令在
    /// 映射的分片锁内去重，同一标识至多创建一个管理器。
    pub async fn run_command<C>(
        &self,
        identity: &Identity,
        command: C,
    ) -> DomainResult<Vec<EventEnvelope<E::Event>>>
    where
        C: Command<E> + 'static,
    {
        if identity.entity_type() != E::TYPE {
            return Err(DomainError::TypeMismatch {
                expected: E::TYPE.to_string(),
                found: identity.entity_type().to_string(),
            });
        }

        // 在分片锁内同时取得管理器与在途许可：此后空闲回收的
        // 静止检查必然观察到该命令，不会移除它所在的实例
        let (manager, permit) = {
            let entry = self
                .live
                .entry(identity.id().to_string())
                .or_insert_with(|| self.start(identity));
            let permit = entry.value().begin_command();
            (Arc::clone(entry.value()), permit)
        };

        let result = manager.run_command(Box::new(command)).await;
        drop(permit);
        result
    }

    fn start(&self, identity: &Identity) -> Arc<EntityLifecycleManager<E>> {
        let manager = Arc::new(EntityLifecycleManager::spawn(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            identity.clone(),
            self.idle_timeout,
            Arc::clone(&self.timer_provider),
        ));

        let live = Arc::clone(&self.live);
        let id = identity.id().to_string();
        manager.set_idle_callback(Box::new(move || {
            // 移除与静止检查在分片锁内一体完成，在途命令使移除让路
            live.remove_if(&id, |_, manager| manager.is_quiescent());
        }));

        manager
    }
}
