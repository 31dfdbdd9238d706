use tracing::Span;

/// 调度循环与单次分发的 span
pub struct DispatchTracer;

impl DispatchTracer {
    pub fn tick_span(tick: u64, mode: &str, ceiling: usize) -> Span {
        tracing::debug_span!("scheduler_tick", tick = tick, mode = mode, ceiling = ceiling)
    }

    pub fn dispatch_span(task_id: &str, dispatch_id: &str, proxy_key: &str) -> Span {
        tracing::info_span!(
            "dispatch",
            task.id = task_id,
            dispatch.id = dispatch_id,
            proxy.key = proxy_key
        )
    }

    pub fn maintenance_span(operation: &str) -> Span {
        tracing::info_span!("proxy_maintenance", operation = operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_construction() {
        // 未安装 subscriber 时 span 被禁用，但构造不应 panic
        let _tick = DispatchTracer::tick_span(1, "Normal", 3);
        let _dispatch = DispatchTracer::dispatch_span("faucet", "d-1", "10.0.0.1:80");
        let _maintenance = DispatchTracer::maintenance_span("auto_provision");
    }
}
