//! 实体监督器（EntitySupervisor）
//!
//! 独占持有一个已加载实体，串行化针对它的全部命令执行：
//! - 无界 FIFO 邮箱 + 单消费者工作任务，同一实体的命令严格按提交顺序执行，
//!   命令体内的 I/O 挂起只推迟、不重排后续命令；
//! - 乐观版本检查在任何副作用之前完成；
//! - 一条命令产生的事件以 committed+1.. 连续编号，整批一次调用事件汇持久化；
//! - 持久化成功后推进已提交版本并清空缓冲，失败则原样向调用方传播。
//!
//! 失败后的状态分歧（内存状态领先于持久历史）通过"污染闩锁"显式处理：
//! 一旦发生未落盘的状态变更，监督器拒绝后续所有命令，要求重新构建。
//!
use crate::command::Command;
use crate::domain_event::EventEnvelope;
use crate::entity::{Entity, EntityCell};
use crate::error::{DomainError, DomainResult};
use crate::identity::Identity;
use crate::persist::{EnvelopeStream, EventSink};
use crate::value_object::Version;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum SupervisorMsg<E>
where
    E: Entity,
{
    Rehydrate {
        stream: EnvelopeStream<E::Event>,
        ack: oneshot::Sender<DomainResult<()>>,
    },
    Execute {
        command: Box<dyn Command<E>>,
        ack: oneshot::Sender<DomainResult<Vec<EventEnvelope<E::Event>>>>,
    },
}

/// 监督器句柄：可廉价克隆；全部句柄释放后工作任务自行退出
pub struct EntitySupervisor<E>
where
    E: Entity,
{
    tx: mpsc::UnboundedSender<SupervisorMsg<E>>,
}

impl<E> Clone for EntitySupervisor<E>
where
    E: Entity,
{
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> EntitySupervisor<E>
where
    E: Entity,
{
    /// 启动监督器，已提交版本从 0 开始
    pub fn start(sink: Arc<dyn EventSink<E::Event>>, instance: EntityCell<E>, id: Identity) -> Self {
        Self::start_at(sink, instance, id, Version::new())
    }

    /// 以给定的已提交版本启动（恢复场景）
    pub fn start_at(
        sink: Arc<dyn EventSink<E::Event>>,
        instance: EntityCell<E>,
        id: Identity,
        version: Version,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SupervisorWorker {
            sink,
            instance,
            id,
            version,
            rehydrated: false,
            tainted: None,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// 消费历史信封流并回放到实体
    ///
    /// 必须在任何命令被接受之前完成；只允许调用一次，不可恢复续传。
    pub async fn rehydrate(&self, stream: EnvelopeStream<E::Event>) -> DomainResult<()> {
        let (ack, rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorMsg::Rehydrate { stream, ack })
            .is_err()
        {
            return Err(DomainError::supervisor("worker stopped"));
        }
        rx.await
            .map_err(|_| DomainError::supervisor("worker dropped the rehydrate ack"))?
    }

    /// 同步入队一条命令，返回结算回执的接收端
    ///
    /// 入队顺序即执行顺序；队列无界，背压由集成方自行规划。
    pub fn submit(
        &self,
        command: Box<dyn Command<E>>,
    ) -> oneshot::Receiver<DomainResult<Vec<EventEnvelope<E::Event>>>> {
        let (ack, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(msg)) =
            self.tx.send(SupervisorMsg::Execute { command, ack })
        {
            if let SupervisorMsg::Execute { ack, .. } = msg {
                let _ = ack.send(Err(DomainError::supervisor("worker stopped")));
            }
        }
        rx
    }

    /// 入队一条命令并等待其完整结算（持久化成功或失败）
    pub async fn run_command(
        &self,
        command: Box<dyn Command<E>>,
    ) -> DomainResult<Vec<EventEnvelope<E::Event>>> {
        self.submit(command)
            .await
            .map_err(|_| DomainError::supervisor("worker dropped the command ack"))?
    }
}

struct SupervisorWorker<E>
where
    E: Entity,
{
    sink: Arc<dyn EventSink<E::Event>>,
    instance: EntityCell<E>,
    id: Identity,
    version: Version,
    rehydrated: bool,
    tainted: Option<String>,
}

impl<E> SupervisorWorker<E>
where
    E: Entity,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SupervisorMsg<E>>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                SupervisorMsg::Rehydrate { stream, ack } => {
                    let _ = ack.send(self.rehydrate(stream).await);
                }
                SupervisorMsg::Execute { command, ack } => {
                    let _ = ack.send(self.execute(command).await);
                }
            }
        }
    }

    async fn rehydrate(&mut self, mut stream: EnvelopeStream<E::Event>) -> DomainResult<()> {
        if self.rehydrated {
            return Err(DomainError::invalid_state("rehydration may run only once"));
        }
        self.rehydrated = true;

        while let Some(envelope) = stream.next().await {
            let envelope = envelope?;
            self.instance.replay(&envelope.payload)?;
            self.version = envelope.version;
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        command: Box<dyn Command<E>>,
    ) -> DomainResult<Vec<EventEnvelope<E::Event>>> {
        if let Some(reason) = &self.tainted {
            return Err(DomainError::invalid_state(format!(
                "entity state diverged from persisted history ({reason}); rebuild the instance"
            )));
        }

        // 版本检查先于命令体的任何副作用
        if let Some(expected) = command.expected_version() {
            if expected != self.version {
                return Err(DomainError::VersionConflict {
                    expected: expected.value(),
                    actual: self.version.value(),
                });
            }
        }

        if let Err(err) = command.execute(&mut self.instance).await {
            // 命令失败却已发射事件，或事件应用本身失败：
            // 内存状态可能领先于持久历史，封存该实例
            if self.instance.has_pending() || matches!(err, DomainError::EventHandling { .. }) {
                self.tainted = Some(err.to_string());
            }
            return Err(err);
        }

        let metadata = command.metadata();
        let envelopes: Vec<EventEnvelope<E::Event>> = self
            .instance
            .pending_events()
            .into_iter()
            .enumerate()
            .map(|(offset, event)| {
                EventEnvelope::new(
                    event,
                    self.id.clone(),
                    self.version.advance(offset + 1),
                    metadata.clone(),
                )
            })
            .collect();

        // 未发射任何事件的命令不触碰事件汇，也不推进版本
        if envelopes.is_empty() {
            return Ok(envelopes);
        }

        if let Err(err) = self.sink.persist(envelopes.clone()).await {
            self.tainted = Some(err.to_string());
            return Err(err);
        }

        self.version = self.version.advance(envelopes.len());
        self.instance.clear_pending();
        Ok(envelopes)
    }
}
