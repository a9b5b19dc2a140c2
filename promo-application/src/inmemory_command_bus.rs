use crate::{
    command::Command, command_bus::CommandBus, command_handler::CommandHandler,
    context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

type CmdHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

type CmdHandlerFn =
    Arc<dyn for<'a> Fn(Box<dyn Any + Send>, &'a AppContext) -> CmdHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 CommandBus 实现
/// - 通过 TypeId 注册不同 Command 对应的 Handler
/// - 运行时以类型擦除（Any）方式进行调度
#[derive(Default)]
pub struct InMemoryCommandBus {
    handlers: DashMap<TypeId, (&'static str, CmdHandlerFn)>,
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令处理器；同一命令重复注册返回 `AlreadyRegisteredCommand`
    pub fn register<C, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let f: CmdHandlerFn = Arc::new(move |boxed_cmd, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                // 键与闭包同一泛型 C，正常情况下 downcast 不会失败
                match boxed_cmd.downcast::<C>() {
                    Ok(cmd) => handler.handle(ctx, *cmd).await,
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    }),
                }
            })
        });

        match self.handlers.entry(TypeId::of::<C>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredCommand { command: C::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((C::NAME, f));
                Ok(())
            }
        }
    }

    /// 已注册的命令名（只读视图）
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn dispatch<C: Command>(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<C>()).map(|h| h.1.clone()) else {
            return Err(AppError::HandlerNotFound(C::NAME));
        };

        debug!(
            command = C::NAME,
            correlation_id = ctx.correlation_id.as_deref(),
            "dispatching command"
        );
        (f)(Box::new(cmd), ctx).await
    }
}
