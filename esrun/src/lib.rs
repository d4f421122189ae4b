//! 进程内事件溯源运行时（esrun）
//!
//! 为每个标识（`Identity`）维护一个可回放的权威状态机（实体），并提供：
//! - 实体抽象（`entity`）：事件驱动的状态机与待持久化事件缓冲
//! - 命令监督器（`supervisor`）：单写者串行执行、乐观版本控制与批量持久化
//! - 生命周期管理（`lifecycle`）：惰性加载、加载期命令排队与空闲回收
//! - 仓储（`repository`）：按类型路由、实例注册与惰性创建/移除
//!
//! 持久化（`persist`）与定时器（`timer`）以最小接口形式定义，
//! 由外部基础设施适配实现；crate 内附带内存版实现用于测试与本地开发。
//!
//! 典型用法：
//! 1. 定义实体与事件，为实体实现 `Entity`（`apply` 投影事件到状态）；
//! 2. 定义命令，实现 `Command`（在 `execute` 中通过 `EntityCell::emit` 产生事件）；
//! 3. 通过 `Repository::builder()` 注入事件源/汇与空闲超时配置；
//! 4. 以 `(Identity, Command)` 调用 `Repository::run_command` 驱动完整流程。
//!
pub mod command;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod persist;
pub mod repository;
pub mod supervisor;
pub mod timer;
pub mod value_object;
