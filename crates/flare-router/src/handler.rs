use std::{borrow::Cow, fmt, sync::Arc};

use flare_core::{Context, HandlerError};

/// 业务处理单元，绑定到唯一的消息标识。
///
/// 闭包 `Fn(&mut Context) -> Result<(), HandlerError>` 自动实现该 trait。
pub trait Handler: Send + Sync + 'static {
    /// 处理一次请求。
    fn call(&self, ctx: &mut Context) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        self(ctx)
    }
}

/// 对象化的 Handler。
pub type BoxHandler = Arc<dyn Handler>;

/// Handler 到 Handler 的变换。
///
/// # 契约说明（What）
/// - `wrap` 接收内层 `next` 并返回包裹后的新 Handler；实现可以在调用 `next` 前后插入逻辑，
///   也可以不调用 `next` 直接短路；
/// - 中间件之间不共享基础状态，每个实例只描述一次变换。
///
/// 闭包 `Fn(BoxHandler) -> BoxHandler` 自动实现该 trait。
pub trait Middleware: Send + Sync + 'static {
    /// 包裹内层 Handler。
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// 对象化的中间件。
pub type BoxMiddleware = Arc<dyn Middleware>;

/// 将闭包装箱为 [`BoxHandler`]，同时帮助编译器推断参数生命周期。
pub fn handler_fn<F>(f: F) -> BoxHandler
where
    F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 将闭包装箱为 [`BoxMiddleware`]。
pub fn middleware_fn<F>(f: F) -> BoxMiddleware
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 附带可读名称的 Handler，名称仅用于路由表与日志。
#[derive(Clone)]
pub struct NamedHandler {
    name: Cow<'static, str>,
    handler: BoxHandler,
}

impl NamedHandler {
    /// 以具体 Handler 构造。
    pub fn new(name: impl Into<Cow<'static, str>>, handler: impl Handler) -> Self {
        Self::from_boxed(name, Arc::new(handler))
    }

    /// 以已装箱的 Handler 构造。
    pub fn from_boxed(name: impl Into<Cow<'static, str>>, handler: BoxHandler) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    /// 名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 内部 Handler。
    pub fn handler(&self) -> &BoxHandler {
        &self.handler
    }
}

impl fmt::Debug for NamedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
