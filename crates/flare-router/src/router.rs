use std::{
    borrow::Cow,
    collections::HashMap,
    io::{self, Write},
    iter,
    sync::Arc,
};

use flare_core::{Context, HandlerError, MessageId};

use crate::handler::{BoxHandler, BoxMiddleware, NamedHandler};

const NOOP_HANDLER_NAME: &str = "<noop>";

fn noop_handler(_ctx: &mut Context) -> Result<(), HandlerError> {
    Ok(())
}

/// 路由注册阶段的构建器。
///
/// # 教案式说明
/// - **意图 (Why)**：注册只发生在服务启动前；`build` 之后得到的 [`Router`] 不再暴露任何写入口，
///   “先写后读”的约束由类型系统保证，分发路径无需加锁。
/// - **契约 (What)**：
///   - `register`：`handler` 为 `None` 时保留已有绑定；`middlewares` 中的 `None` 被跳过，
///     过滤后至少剩一个才会写入，并**整体替换**该标识此前的中间件列表；
///     同一标识多次注册不会累加中间件，需要累加时由调用方自行合并；
///   - `register_middleware`：按顺序追加全局中间件，跳过 `None`；
///   - `set_not_found_handler`：替换缺省 Handler。
#[derive(Default)]
pub struct RouterBuilder {
    handlers: HashMap<MessageId, NamedHandler>,
    middlewares: HashMap<MessageId, Vec<BoxMiddleware>>,
    global: Vec<BoxMiddleware>,
    not_found: Option<NamedHandler>,
}

impl RouterBuilder {
    /// 创建空构建器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 `id` 绑定 Handler 与按标识中间件。
    pub fn register<I>(
        mut self,
        id: impl Into<MessageId>,
        handler: Option<NamedHandler>,
        middlewares: I,
    ) -> Self
    where
        I: IntoIterator<Item = Option<BoxMiddleware>>,
    {
        let id = id.into();
        let middlewares: Vec<BoxMiddleware> = middlewares.into_iter().flatten().collect();
        if !middlewares.is_empty() {
            self.middlewares.insert(id.clone(), middlewares);
        }
        if let Some(handler) = handler {
            self.handlers.insert(id, handler);
        }
        self
    }

    /// `register` 的便捷形式：只绑定 Handler。
    pub fn route<F>(
        self,
        id: impl Into<MessageId>,
        name: impl Into<Cow<'static, str>>,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(id, Some(NamedHandler::new(name, handler)), iter::empty())
    }

    /// `register` 的便捷形式：绑定 Handler 及其专属中间件。
    pub fn route_with<F, I>(
        self,
        id: impl Into<MessageId>,
        name: impl Into<Cow<'static, str>>,
        handler: F,
        middlewares: I,
    ) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
        I: IntoIterator<Item = BoxMiddleware>,
    {
        self.register(
            id,
            Some(NamedHandler::new(name, handler)),
            middlewares.into_iter().map(Some),
        )
    }

    /// 追加全局中间件。
    pub fn register_middleware<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Option<BoxMiddleware>>,
    {
        self.global.extend(middlewares.into_iter().flatten());
        self
    }

    /// 追加单个全局中间件。
    pub fn middleware(self, middleware: BoxMiddleware) -> Self {
        self.register_middleware([Some(middleware)])
    }

    /// 替换 not-found Handler。
    pub fn set_not_found_handler(mut self, handler: NamedHandler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// `set_not_found_handler` 的便捷形式。
    pub fn not_found<F>(self, name: impl Into<Cow<'static, str>>, handler: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.set_not_found_handler(NamedHandler::new(name, handler))
    }

    /// 冻结为不可变路由器。
    pub fn build(self) -> Router {
        let fallback = self
            .not_found
            .unwrap_or_else(|| NamedHandler::new(NOOP_HANDLER_NAME, noop_handler));
        Router {
            handlers: self.handlers,
            middlewares: self.middlewares,
            global: self.global,
            fallback,
        }
    }
}

/// 路由表中的一行诊断信息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    /// 消息标识。
    pub id: MessageId,
    /// 注册时提供的 Handler 名称。
    pub handler: String,
    /// 按标识中间件数量。
    pub middlewares: usize,
}

/// 不可变路由器。
///
/// # 行为概览（How）
/// 1. 请求为空时直接返回 `Ok(())`；
/// 2. 查找绑定 Handler，未命中时使用构建期确定的回退 Handler（not-found 或空操作）；
/// 3. 按 `global ++ per_id` 顺序收集中间件，自右向左折叠：`[m1, m2, m3]` 得到
///    `m1(m2(m3(handler)))`，`m1` 最先看到请求、最后看到结果；
/// 4. 调用组合后的 Handler，结果原样返回，不做重试。
pub struct Router {
    handlers: HashMap<MessageId, NamedHandler>,
    middlewares: HashMap<MessageId, Vec<BoxMiddleware>>,
    global: Vec<BoxMiddleware>,
    fallback: NamedHandler,
}

impl Router {
    /// 创建构建器。
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// 分发一次请求。
    pub fn dispatch(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        let chain = match ctx.request_id() {
            Some(id) => self.chain_for(id),
            None => return Ok(()),
        };
        chain.call(ctx)
    }

    fn chain_for(&self, id: &MessageId) -> BoxHandler {
        let target = self.handlers.get(id).unwrap_or(&self.fallback);
        tracing::trace!(message_id = %id, handler = target.name(), "dispatching request");

        let per_id = self.middlewares.get(id).map(Vec::as_slice).unwrap_or(&[]);
        self.global
            .iter()
            .chain(per_id)
            .rev()
            .fold(Arc::clone(target.handler()), |next, middleware| {
                middleware.wrap(next)
            })
    }

    /// 查询绑定的 Handler 名称。
    pub fn handler_name(&self, id: &MessageId) -> Option<&str> {
        self.handlers.get(id).map(NamedHandler::name)
    }

    /// 已绑定的路由数量。
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// 是否没有任何绑定。
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 按标识排序的路由表快照。
    pub fn route_table(&self) -> Vec<RouteEntry> {
        let mut entries: Vec<RouteEntry> = self
            .handlers
            .iter()
            .map(|(id, handler)| RouteEntry {
                id: id.clone(),
                handler: handler.name().to_owned(),
                middlewares: self.middlewares.get(id).map_or(0, Vec::len),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// 以表格形式输出路由表及监听地址。
    pub fn write_route_table<W: Write>(&self, out: &mut W, addr: &str) -> io::Result<()> {
        const ID_HEADER: &str = "Message ID";
        const HANDLER_HEADER: &str = "Route Handler";

        let rows: Vec<(String, String)> = self
            .route_table()
            .into_iter()
            .map(|entry| (entry.id.to_string(), entry.handler))
            .collect();
        let id_width = rows
            .iter()
            .map(|(id, _)| id.chars().count())
            .fold(ID_HEADER.len(), usize::max);
        let handler_width = rows
            .iter()
            .map(|(_, name)| name.chars().count())
            .fold(HANDLER_HEADER.len(), usize::max);
        let border = format!(
            "+{}+{}+",
            "-".repeat(id_width + 2),
            "-".repeat(handler_width + 2)
        );

        writeln!(out, "\n[FLARE ROUTE TABLE]:")?;
        writeln!(out, "{border}")?;
        writeln!(
            out,
            "| {ID_HEADER:<id_width$} | {HANDLER_HEADER:<handler_width$} |"
        )?;
        writeln!(out, "{border}")?;
        for (id, name) in &rows {
            writeln!(out, "| {id:<id_width$} | {name:<handler_width$} |")?;
        }
        writeln!(out, "{border}")?;
        writeln!(out, "[FLARE] Serving at: {addr}\n")
    }

    /// 将路由表打印到标准输出。
    pub fn print_route_table(&self, addr: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.write_route_table(&mut lock, addr)
    }
}
