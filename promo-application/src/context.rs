/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（命令/查询）所需的横切信息：
/// - 关联追踪 `correlation_id`：写入日志，串联状态查询与手动触发；
/// - 幂等键 `idempotency_key`：同一个键的手动触发只执行一次，重复提交直接返回成功。
///
/// ```rust
/// use promo_application::context::AppContext;
///
/// let ctx = AppContext::default()
///     .with_correlation_id("cor-123")
///     .with_idempotency_key("idem-xyz");
/// assert_eq!(ctx.correlation_id.as_deref(), Some("cor-123"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppContext {
    pub correlation_id: Option<String>,
    /// 为空则不参与幂等
    pub idempotency_key: Option<String>,
}

impl AppContext {
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
