use chrono::{DateTime, Utc};
use claim_domain::{EventEnvelope, SchedulerEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// 诊断事件广播；没有订阅者时事件被丢弃
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SchedulerEvent, now: DateTime<Utc>) {
        debug!(event_type = event.event_type(), "发布调度事件");
        let _ = self.sender.send(EventEnvelope::new(event, now));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(
            SchedulerEvent::TaskEnabled {
                task_id: "faucet".to_string(),
            },
            Utc::now(),
        );

        let mut rx = bus.subscribe();
        bus.publish(
            SchedulerEvent::ProxyAdded {
                key: "10.0.0.1:80".to_string(),
            },
            Utc::now(),
        );
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), "ProxyAdded");
    }
}
