//! 实体（Entity）抽象
//!
//! 约束一个可回放状态机的核心行为：
//! - `Entity::apply` 将事件投影到状态（实时发射与历史回放共用，结果必须一致）；
//! - `EntityCell` 为运行时持有的实体外壳：状态 + 待持久化事件缓冲；
//! - `emit` 先应用再入缓冲，使同一命令内的后续逻辑立即可见新事件；
//! - 缓冲只读暴露（防御性拷贝），清空/回放为 crate 内部特权（由监督器使用）。
//!
use crate::domain_event::DomainEvent;
use crate::error::DomainResult;

/// 实体状态机接口
///
/// `apply` 必须是确定性的、只依赖当前状态与事件本身的迁移函数；
/// 遇到无法识别或与状态不兼容的事件时返回 `EventHandling` 错误，
/// 该错误对在途操作（回放或命令）是致命的，不得静默忽略。
pub trait Entity: Default + Send + Sync + 'static {
    /// 实体类型标签，用于仓储路由与信封来源
    const TYPE: &'static str;

    /// 该实体产生的事件类型
    type Event: DomainEvent;

    /// 应用事件，更新实体状态
    fn apply(&mut self, event: &Self::Event) -> DomainResult<()>;
}

/// 实体外壳：状态与待持久化事件缓冲
///
/// 不变式：静止时（无在途命令）缓冲为空，状态恰为已提交版本内
/// 全部已持久化事件的折叠结果。
#[derive(Debug)]
pub struct EntityCell<E>
where
    E: Entity,
{
    state: E,
    pending: Vec<E::Event>,
}

impl<E> Default for EntityCell<E>
where
    E: Entity,
{
    fn default() -> Self {
        Self {
            state: E::default(),
            pending: Vec::new(),
        }
    }
}

impl<E> EntityCell<E>
where
    E: Entity,
{
    /// 只读访问当前状态
    pub fn state(&self) -> &E {
        &self.state
    }

    /// 发射一个新事件：先应用到状态，再追加到缓冲
    ///
    /// 仅应由实体自身的行为逻辑（命令执行路径）调用。
    pub fn emit(&mut self, event: E::Event) -> DomainResult<()> {
        self.state.apply(&event)?;
        self.pending.push(event);
        Ok(())
    }

    /// 缓冲中待持久化事件的防御性拷贝
    pub fn pending_events(&self) -> Vec<E::Event> {
        self.pending.clone()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 回放一个历史事件：只应用，不入缓冲
    pub(crate) fn replay(&mut self, event: &E::Event) -> DomainResult<()> {
        self.state.apply(event)
    }

    /// 持久化成功后由监督器清空缓冲
    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
