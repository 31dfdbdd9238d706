use std::time::{Duration, Instant};

use async_trait::async_trait;
use claim_domain::{HealthProbe, ProxyRecord};
use claim_errors::{SchedulerError, SchedulerResult};
use tokio::net::TcpStream;

/// 以 TCP 建连耗时作为代理延迟
pub struct TcpConnectProbe {
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HealthProbe for TcpConnectProbe {
    async fn probe(&self, proxy: &ProxyRecord) -> SchedulerResult<u64> {
        let address = proxy.socket_address();
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(started.elapsed().as_millis() as u64),
            Ok(Err(e)) => Err(SchedulerError::Network(format!("连接代理 {address} 失败: {e}"))),
            Err(_) => Err(SchedulerError::Timeout(format!("连接代理 {address} 超时"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use claim_domain::ProxyCandidate;
    use tokio::net::TcpListener;

    fn record_for(port: u16) -> ProxyRecord {
        let candidate: ProxyCandidate = format!("127.0.0.1:{port}").parse().unwrap();
        ProxyRecord::from_candidate(&candidate, Utc::now())
    }

    #[tokio::test]
    async fn test_probe_reachable_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpConnectProbe::new(Duration::from_secs(2));
        assert!(probe.probe(&record_for(port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpConnectProbe::new(Duration::from_secs(2));
        assert!(probe.probe(&record_for(port)).await.is_err());
    }
}
