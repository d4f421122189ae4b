//! 实体生命周期管理（EntityLifecycleManager）
//!
//! 为每个受管实体包装一层加载阶段与空闲回收：
//! - Loading：回放进行中，到达的命令按提交顺序排队等待；
//! - Running：加载完成，命令直接转发给监督器；
//! - Failed：加载失败，排队中与后续的命令一律收到 `Load` 错误；
//! - Loading → Running 的迁移恰好发生一次，且不可逆。
//!
//! 空闲回收：每次 `run_command` 前清除已布防的定时器，结算后（无论成败）
//! 重新布防一次性定时器；定时器触发时调用注册的空闲回调，管理器自身
//! 不做任何破坏性动作。
//!
//! 真实时钟下回调可能与命令派发并发：派发方先通过 `begin_command`
//! 登记在途许可，回收方在移除前必须确认 `is_quiescent`，
//! 否则定时器在"查到管理器"与"清除定时器"之间触发会回收仍在执行的实例。
//!
use crate::command::Command;
use crate::domain_event::EventEnvelope;
use crate::entity::{Entity, EntityCell};
use crate::error::{DomainError, DomainResult};
use crate::identity::Identity;
use crate::persist::{EventSink, EventSource};
use crate::supervisor::EntitySupervisor;
use crate::timer::{Timer, TimerProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// 空闲回调：管理器对外通告"我可以被回收了"的唯一机制
pub type IdleCallback = Box<dyn Fn() + Send + Sync>;

/// 在途命令许可；释放（drop）前管理器不得被视为静止
pub struct CommandPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for CommandPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

type CommandAck<E> = oneshot::Sender<DomainResult<Vec<EventEnvelope<E>>>>;

enum RunState<E>
where
    E: Entity,
{
    Loading {
        pending: Vec<(Box<dyn Command<E>>, CommandAck<E::Event>)>,
    },
    Running(EntitySupervisor<E>),
    Failed {
        reason: String,
    },
}

pub struct EntityLifecycleManager<E>
where
    E: Entity,
{
    state: Arc<Mutex<RunState<E>>>,
    idle_timeout: Duration,
    timer_provider: Arc<dyn TimerProvider>,
    idle_timer: Mutex<Option<Box<dyn Timer>>>,
    on_idle: Arc<Mutex<Option<IdleCallback>>>,
    in_flight: Arc<AtomicUsize>,
}

impl<E> EntityLifecycleManager<E>
where
    E: Entity,
{
    /// 创建管理器并立即启动加载：
    /// 构建零状态实体与监督器，读取事件源并回放完成后迁移到 Running。
    pub fn spawn(
        source: Arc<dyn EventSource<E::Event>>,
        sink: Arc<dyn EventSink<E::Event>>,
        id: Identity,
        idle_timeout: Duration,
        timer_provider: Arc<dyn TimerProvider>,
    ) -> Self {
        let state = Arc::new(Mutex::new(RunState::Loading {
            pending: Vec::new(),
        }));

        let supervisor = EntitySupervisor::start(Arc::clone(&sink), EntityCell::default(), id.clone());
        let load_state = Arc::clone(&state);
        tokio::spawn(async move {
            let loaded = async {
                let stream = source.load(&id).await?;
                supervisor.rehydrate(stream).await
            }
            .await;
            Self::finish_loading(&load_state, supervisor, loaded);
        });

        Self {
            state,
            idle_timeout,
            timer_provider,
            idle_timer: Mutex::new(None),
            on_idle: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 注册空闲回调（覆盖式，布防中的定时器触发时读取当前值）
    pub fn set_idle_callback(&self, on_idle: IdleCallback) {
        *self.on_idle.lock().unwrap() = Some(on_idle);
    }

    /// 登记一条在途命令
    ///
    /// 派发方必须在"查到管理器"的同一临界区内取得许可，
    /// 并持有到命令完整结算之后。
    pub fn begin_command(&self) -> CommandPermit {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        CommandPermit {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// 无在途命令时为真；回收方移除管理器前必须原子地确认静止
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// 执行一条命令；结算前后负责空闲定时器的清除与重新布防
    pub async fn run_command(
        &self,
        command: Box<dyn Command<E>>,
    ) -> DomainResult<Vec<EventEnvelope<E::Event>>> {
        self.clear_idle_timer();
        let result = self.dispatch(command).await;
        self.start_idle_timer();
        result
    }

    async fn dispatch(
        &self,
        command: Box<dyn Command<E>>,
    ) -> DomainResult<Vec<EventEnvelope<E::Event>>> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                RunState::Loading { pending } => {
                    let (ack, rx) = oneshot::channel();
                    pending.push((command, ack));
                    rx
                }
                RunState::Running(supervisor) => supervisor.submit(command),
                RunState::Failed { reason } => {
                    return Err(DomainError::load(reason.clone()));
                }
            }
        };

        rx.await
            .map_err(|_| DomainError::supervisor("command ack dropped"))?
    }

    /// 加载结算：在同一临界区内先转发排队命令、再迁移状态，
    /// 保证后到的命令不会越过队列直达监督器。
    fn finish_loading(
        state: &Arc<Mutex<RunState<E>>>,
        supervisor: EntitySupervisor<E>,
        loaded: DomainResult<()>,
    ) {
        let mut guard = state.lock().unwrap();
        let next = match &loaded {
            Ok(()) => RunState::Running(supervisor.clone()),
            Err(err) => RunState::Failed {
                reason: err.to_string(),
            },
        };
        let previous = std::mem::replace(&mut *guard, next);

        let RunState::Loading { pending } = previous else {
            return;
        };
        match loaded {
            Ok(()) => {
                for (command, ack) in pending {
                    let settled = supervisor.submit(command);
                    tokio::spawn(async move {
                        let result = settled
                            .await
                            .map_err(|_| DomainError::supervisor("command ack dropped"))
                            .and_then(|r| r);
                        let _ = ack.send(result);
                    });
                }
            }
            Err(err) => {
                let reason = err.to_string();
                for (_, ack) in pending {
                    let _ = ack.send(Err(DomainError::load(reason.clone())));
                }
            }
        }
    }

    fn clear_idle_timer(&self) {
        if let Some(timer) = self.idle_timer.lock().unwrap().take() {
            timer.clear();
        }
    }

    fn start_idle_timer(&self) {
        let on_idle = Arc::clone(&self.on_idle);
        let timer = self.timer_provider.set_timer(
            self.idle_timeout,
            Box::new(move || {
                if let Some(callback) = &*on_idle.lock().unwrap() {
                    callback();
                }
            }),
        );
        // 覆盖前取消旧定时器，避免它在新命令到来之后仍然触发
        if let Some(previous) = self.idle_timer.lock().unwrap().replace(timer) {
            previous.clear();
        }
    }
}

impl<E> Drop for EntityLifecycleManager<E>
where
    E: Entity,
{
    fn drop(&mut self) {
        self.clear_idle_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::EntityLifecycleManager;
    use crate::command::Command;
    use crate::domain_event::{DomainEvent, EventEnvelope, Metadata};
    use crate::entity::{Entity, EntityCell};
    use crate::error::{DomainError, DomainResult};
    use crate::identity::Identity;
    use crate::persist::{EnvelopeStream, EventSink, EventSource, InMemoryEventStore};
    use crate::timer::FakeTimers;
    use crate::value_object::Version;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Log {
        lines: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct LineWritten {
        text: String,
    }

    impl DomainEvent for LineWritten {
        fn event_type(&self) -> &str {
            "LineWritten"
        }
    }

    impl Entity for Log {
        const TYPE: &'static str = "Log";
        type Event = LineWritten;

        fn apply(&mut self, event: &Self::Event) -> DomainResult<()> {
            if event.text.is_empty() {
                return Err(DomainError::event_handling(
                    event.event_type(),
                    "empty lines are not recordable",
                ));
            }
            self.lines.push(event.text.clone());
            Ok(())
        }
    }

    struct Write {
        text: String,
    }

    #[async_trait]
    impl Command<Log> for Write {
        async fn execute(&self, entity: &mut EntityCell<Log>) -> DomainResult<()> {
            entity.emit(LineWritten {
                text: self.text.clone(),
            })
        }
    }

    fn write(text: &str) -> Box<dyn Command<Log>> {
        Box::new(Write {
            text: text.to_string(),
        })
    }

    /// 直到收到放行信号才产出历史的事件源
    struct GatedSource {
        inner: InMemoryEventStore<LineWritten>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl EventSource<LineWritten> for GatedSource {
        async fn load(&self, identity: &Identity) -> DomainResult<EnvelopeStream<LineWritten>> {
            self.gate.notified().await;
            self.inner.load(identity).await
        }
    }

    /// 加载永远失败的事件源
    struct BrokenSource;

    #[async_trait]
    impl EventSource<LineWritten> for BrokenSource {
        async fn load(&self, _identity: &Identity) -> DomainResult<EnvelopeStream<LineWritten>> {
            Err(DomainError::load("history unavailable"))
        }
    }

    fn identity() -> Identity {
        Identity::new("Log", "LOG-1")
    }

    #[tokio::test]
    async fn commands_queued_during_load_run_in_order() {
        let store = InMemoryEventStore::new();
        let gate = Arc::new(Notify::new());
        let source = Arc::new(GatedSource {
            inner: store.clone(),
            gate: Arc::clone(&gate),
        });
        let manager = EntityLifecycleManager::spawn(
            source as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(FakeTimers::new()),
        );

        // 加载仍被闸门挡住，两条命令先后排队；join! 按声明顺序首轮轮询，
        // 放行闸门的未来排在最后，保证两条命令都已入队
        let (first, second, _) = tokio::join!(
            manager.run_command(write("a")),
            manager.run_command(write("b")),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert!(store.is_empty());
                gate.notify_one();
            }
        );
        let first = first.unwrap();
        let second = second.unwrap();

        // 提交顺序决定版本顺序
        assert!(first[0].version < second[0].version);
        let texts: Vec<String> = store
            .envelopes()
            .iter()
            .map(|e| e.payload.text.clone())
            .collect();
        assert_eq!(texts, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failed_load_rejects_queued_and_later_commands() {
        let store = InMemoryEventStore::new();
        let manager = EntityLifecycleManager::spawn(
            Arc::new(BrokenSource) as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(FakeTimers::new()),
        );

        let err = manager.run_command(write("a")).await.unwrap_err();
        assert!(matches!(err, DomainError::Load { .. }));

        // 管理器此后不可用
        let err = manager.run_command(write("b")).await.unwrap_err();
        assert!(matches!(err, DomainError::Load { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn history_the_entity_cannot_apply_fails_the_load() {
        let store = InMemoryEventStore::new();
        // 历史中的空行会在回放时被实体拒绝
        store
            .persist(vec![EventEnvelope::new(
                LineWritten {
                    text: String::new(),
                },
                identity(),
                Version::from_value(1),
                Metadata::default(),
            )])
            .await
            .unwrap();

        let manager = EntityLifecycleManager::spawn(
            Arc::new(store.clone()) as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(FakeTimers::new()),
        );

        // 回放中途失败等同加载失败：排队中与后续命令一律收到 Load
        let err = manager.run_command(write("a")).await.unwrap_err();
        assert!(matches!(err, DomainError::Load { .. }));
        let err = manager.run_command(write("b")).await.unwrap_err();
        assert!(matches!(err, DomainError::Load { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn permits_mark_the_manager_busy() {
        let store = InMemoryEventStore::new();
        let manager = EntityLifecycleManager::<Log>::spawn(
            Arc::new(store.clone()) as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(FakeTimers::new()),
        );

        assert!(manager.is_quiescent());
        let first = manager.begin_command();
        let second = manager.begin_command();
        assert!(!manager.is_quiescent());

        drop(first);
        assert!(!manager.is_quiescent());
        drop(second);
        assert!(manager.is_quiescent());
    }

    #[tokio::test]
    async fn idle_callback_fires_once_after_quiescence() {
        let store = InMemoryEventStore::new();
        let timers = FakeTimers::new();
        let manager = EntityLifecycleManager::spawn(
            Arc::new(store.clone()) as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(timers.clone()),
        );

        let idled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&idled);
        manager.set_idle_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        manager.run_command(write("a")).await.unwrap();
        // 命令结算后恰有一个布防中的定时器，且回调尚未触发
        assert_eq!(timers.armed(), 1);
        assert_eq!(idled.load(Ordering::SeqCst), 0);

        timers.flush();
        assert_eq!(idled.load(Ordering::SeqCst), 1);

        timers.flush();
        assert_eq!(idled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_command_rearms_instead_of_stacking_timers() {
        let store = InMemoryEventStore::new();
        let timers = FakeTimers::new();
        let manager = EntityLifecycleManager::spawn(
            Arc::new(store.clone()) as Arc<dyn EventSource<LineWritten>>,
            Arc::new(store.clone()) as Arc<dyn EventSink<LineWritten>>,
            identity(),
            Duration::from_millis(1000),
            Arc::new(timers.clone()),
        );

        let idled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&idled);
        manager.set_idle_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        manager.run_command(write("a")).await.unwrap();
        manager.run_command(write("b")).await.unwrap();
        assert_eq!(timers.armed(), 1);

        timers.flush();
        assert_eq!(idled.load(Ordering::SeqCst), 1);
    }
}
