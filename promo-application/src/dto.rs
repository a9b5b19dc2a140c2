use serde::Serialize;

/// 查询结果的对外视图，如 [`DispatchStatusDto`](crate::status::DispatchStatusDto)
///
/// 只暴露调用方需要的字段（结果枚举与提示文案），可直接序列化为 JSON 返回。
pub trait Dto: Serialize + Send + Sync + 'static {}
