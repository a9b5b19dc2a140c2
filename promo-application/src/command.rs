/// 会改变投递状态的操作，例如 [`TriggerDispatch`](crate::trigger::TriggerDispatch)
/// 立即跑一轮扫描、把待投递的促销发布出去
///
/// 只报告成功或失败，扫描结果通过状态查询读取。
/// `NAME` 出现在日志和 `HandlerNotFound` 错误里，改名会影响已有的告警规则。
pub trait Command: Send + Sync + 'static {
    const NAME: &'static str;
}
