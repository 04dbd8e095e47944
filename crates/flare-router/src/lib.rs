//! # flare-router
//!
//! ## 模块使命（Why）
//! - 维护“消息标识 → Handler”的唯一绑定，以及全局与按标识两级中间件；
//! - 在分发时按“全局在前、按标识在后”的顺序自右向左组合调用链，使首个全局中间件位于最外层。
//!
//! ## 核心契约（What）
//! - [`RouterBuilder`] 负责注册，`build` 后得到不可变的 [`Router`]，可通过 `Arc` 在任意多个
//!   会话任务间共享而无需加锁；
//! - [`Router::dispatch`] 对缺失绑定逐级回退：已绑定 Handler → not-found Handler → 空操作；
//! - 路由表打印只读取状态，属于诊断输出。
//!
//! ## 风险提示（Trade-offs）
//! - 组合在每次分发时进行，成本为 O(中间件数量) 次 `Arc` 分配；中间件数量通常很小。

mod handler;
mod router;

pub use handler::{
    BoxHandler, BoxMiddleware, Handler, Middleware, NamedHandler, handler_fn, middleware_fn,
};
pub use router::{RouteEntry, Router, RouterBuilder};
