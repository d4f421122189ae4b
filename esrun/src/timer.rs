//! 定时器抽象（Timer）
//!
//! 调度一次性延迟回调，可取消。生命周期管理用它驱动空闲回收：
//! - `TokioTimers`：真实时钟实现，基于任务休眠，`clear` 中止任务；
//! - `FakeTimers`：手动触发实现，供测试与示例确定性地推进时间。
//!
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// 已调度的一次性定时器句柄
pub trait Timer: Send + Sync {
    /// 取消定时器；回调尚未触发时保证不再触发
    fn clear(&self);
}

/// 定时器提供者
pub trait TimerProvider: Send + Sync {
    /// 在 `delay` 之后调度一次 `callback`
    fn set_timer(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn Timer>;
}

/// 基于 tokio 时钟的真实定时器实现
///
/// 注意：`set_timer` 需要在 tokio 运行时上下文内调用。
#[derive(Debug, Default, Clone)]
pub struct TokioTimers;

impl TokioTimers {
    pub fn new() -> Self {
        Self
    }
}

impl TimerProvider for TokioTimers {
    fn set_timer(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn Timer> {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Box::new(TokioTimer { handle })
    }
}

struct TokioTimer {
    handle: JoinHandle<()>,
}

impl Timer for TokioTimer {
    fn clear(&self) {
        self.handle.abort();
    }
}

/// 手动触发的假定时器，忽略延迟参数
///
/// `flush` 按登记顺序（而非延迟长短）触发所有未取消的回调，
/// 典型用途：测试环境、示例与本地开发。
#[derive(Clone, Default)]
pub struct FakeTimers {
    inner: Arc<Mutex<FakeTimersState>>,
}

#[derive(Default)]
struct FakeTimersState {
    next_id: u64,
    scheduled: Vec<(u64, Box<dyn FnOnce() + Send>)>,
}

impl FakeTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前已登记且未取消的定时器数量
    pub fn armed(&self) -> usize {
        self.inner.lock().unwrap().scheduled.len()
    }

    /// 触发并清空所有已登记的回调
    pub fn flush(&self) {
        let drained = {
            let mut state = self.inner.lock().unwrap();
            std::mem::take(&mut state.scheduled)
        };
        for (_, callback) in drained {
            callback();
        }
    }
}

impl TimerProvider for FakeTimers {
    fn set_timer(&self, _delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn Timer> {
        let id = {
            let mut state = self.inner.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.scheduled.push((id, callback));
            id
        };
        Box::new(FakeTimer {
            id,
            inner: Arc::clone(&self.inner),
        })
    }
}

struct FakeTimer {
    id: u64,
    inner: Arc<Mutex<FakeTimersState>>,
}

impl Timer for FakeTimer {
    fn clear(&self) {
        let mut state = self.inner.lock().unwrap();
        state.scheduled.retain(|(id, _)| *id != self.id);
    }
}
