use crate::{
    context::AppContext, error::AppError, query::Query, query_bus::QueryBus,
    query_handler::QueryHandler,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxAnySend = Box<dyn Any + Send>;

type QueryHandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BoxAnySend, AppError>> + Send + 'a>>;

type QueryHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a AppContext) -> QueryHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 QueryBus 实现
/// - 通过 TypeId 注册不同 Query 对应的 Handler（结果类型由 `Query::Dto` 唯一确定）
/// - 以类型擦除方式调度，并在调用端进行结果还原
#[derive(Default)]
pub struct InMemoryQueryBus {
    handlers: DashMap<TypeId, (&'static str, QueryHandlerFn)>,
}

impl InMemoryQueryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册查询处理器
    pub fn register<Q, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let f: QueryHandlerFn = Arc::new(move |boxed_q, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                match boxed_q.downcast::<Q>() {
                    Ok(q) => {
                        let dto = handler.handle(ctx, *q).await?;
                        Ok(Box::new(dto) as BoxAnySend)
                    }
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: type_name::<Q>(),
                        found: "unknown",
                    }),
                }
            })
        });

        match self.handlers.entry(TypeId::of::<Q>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredQuery { query: Q::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((Q::NAME, f));
                Ok(())
            }
        }
    }

    /// 获取已注册的查询名列表（只读视图）
    pub fn registered_queries(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl QueryBus for InMemoryQueryBus {
    async fn dispatch<Q: Query>(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<Q>()).map(|h| h.1.clone()) else {
            return Err(AppError::HandlerNotFound(Q::NAME));
        };

        let out = (f)(Box::new(q), ctx).await?;

        match out.downcast::<Q::Dto>() {
            Ok(dto) => Ok(*dto),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<Q::Dto>(),
                found: "unknown",
            }),
        }
    }
}
