//! 状态端点：读取最近一次投递结果
//!
//! 只读 `ResultCache`，不访问 broker 或仓储。
//!
use crate::{
    context::AppContext, dto::Dto, error::AppError, query::Query, query_handler::QueryHandler,
};
use async_trait::async_trait;
use promo_domain::result_cache::{DispatchResult, ResultCache};
use serde::Serialize;

/// 查询最近一次投递结果
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDispatchStatus;

impl Query for GetDispatchStatus {
    const NAME: &'static str = "GetDispatchStatus";
    type Dto = DispatchStatusDto;
}

/// 尚无投递时两个字段均为 `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStatusDto {
    pub outcome: Option<DispatchResult>,
    pub message: Option<String>,
}

impl Dto for DispatchStatusDto {}

impl From<Option<DispatchResult>> for DispatchStatusDto {
    fn from(outcome: Option<DispatchResult>) -> Self {
        Self {
            outcome,
            message: outcome.map(|r| r.message().to_string()),
        }
    }
}

pub struct DispatchStatusHandler {
    cache: ResultCache,
}

impl DispatchStatusHandler {
    pub fn new(cache: ResultCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl QueryHandler<GetDispatchStatus> for DispatchStatusHandler {
    async fn handle(
        &self,
        _ctx: &AppContext,
        _q: GetDispatchStatus,
    ) -> Result<DispatchStatusDto, AppError> {
        Ok(self.cache.latest().into())
    }
}
