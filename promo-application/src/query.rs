use crate::dto::Dto;

/// 只读取投递状态的操作，例如 [`GetDispatchStatus`](crate::status::GetDispatchStatus)
///
/// 不触发扫描，也不改动结果缓存。
pub trait Query: Send + Sync + 'static {
    /// 出现在日志和 `HandlerNotFound` 错误里
    const NAME: &'static str;

    /// 返回给调用方的视图
    type Dto: Dto;
}
