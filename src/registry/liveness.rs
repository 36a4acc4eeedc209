//! 注册存活维护
//!
//! etcd lease 续期和 Consul TTL 心跳共用同一个循环：按周期续期，续期失败时重新注册，
//! 重新注册失败则指数退避后重试，直到成功再回到续期。

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// 重新注册的指数退避参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// 第 `attempt` 次失败后的等待时间
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let delay = self.base_delay.saturating_mul(1 << attempt.min(10));
        delay.min(self.max_delay)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// 一个实例在注册中心上的存活凭据
#[async_trait]
pub(crate) trait LeaseSession: Send + 'static {
    /// 续期一次，凭据已失效时返回错误
    async fn renew(&mut self) -> Result<()>;

    /// 重新注册实例并换上新的凭据
    async fn reestablish(&mut self) -> Result<()>;
}

pub(crate) fn spawn_keep_alive<S: LeaseSession>(
    session: S,
    period: Duration,
    backoff: RetryBackoff,
    instance_id: String,
) -> JoinHandle<()> {
    tokio::spawn(run_keep_alive(session, period, backoff, instance_id))
}

pub(crate) async fn run_keep_alive<S: LeaseSession>(
    mut session: S,
    period: Duration,
    backoff: RetryBackoff,
    instance_id: String,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        match session.renew().await {
            Ok(()) => {
                debug!(instance_id = %instance_id, "💓 Registration renewed");
            }
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "⚠️ Renewal failed, registering again");
                reestablish(&mut session, backoff, &instance_id).await;
                ticker.reset();
            }
        }
    }
}

async fn reestablish<S: LeaseSession>(session: &mut S, backoff: RetryBackoff, instance_id: &str) {
    let mut attempt = 0;
    loop {
        match session.reestablish().await {
            Ok(()) => {
                info!(instance_id = %instance_id, attempt, "✅ Service registered again");
                return;
            }
            Err(e) => {
                let delay = backoff.backoff_duration(attempt);
                error!(
                    instance_id = %instance_id,
                    attempt,
                    error = %e,
                    retry_in = ?delay,
                    "❌ Re-registration failed"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// 按预设结果依次应答的凭据，记录调用顺序
    struct ScriptedSession {
        renewals: VecDeque<bool>,
        reestablishments: VecDeque<bool>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl LeaseSession for ScriptedSession {
        async fn renew(&mut self) -> Result<()> {
            self.calls.lock().push("renew");
            match self.renewals.pop_front() {
                Some(false) => Err(DriverError::resolver("lease keep-alive stream closed")),
                _ => Ok(()),
            }
        }

        async fn reestablish(&mut self) -> Result<()> {
            self.calls.lock().push("reestablish");
            match self.reestablishments.pop_front() {
                Some(false) => Err(DriverError::resolver("connection refused")),
                _ => Ok(()),
            }
        }
    }

    async fn wait_for_calls(calls: &Mutex<Vec<&'static str>>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("keep-alive loop made no progress");
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = RetryBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(backoff.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(backoff.backoff_duration(20), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_lost_lease_is_registered_again_with_backoff() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession {
            // 第二次续期时 etcd 重启，stream 关闭
            renewals: VecDeque::from([true, false, true]),
            // 恢复前两次重新注册失败
            reestablishments: VecDeque::from([false, false, true]),
            calls: calls.clone(),
        };

        let handle = spawn_keep_alive(
            session,
            Duration::from_millis(10),
            RetryBackoff::new(Duration::from_millis(1), Duration::from_millis(4)),
            "svc.order_node-a".to_string(),
        );
        wait_for_calls(&calls, 6).await;
        handle.abort();

        assert_eq!(
            calls.lock()[..6],
            ["renew", "renew", "reestablish", "reestablish", "reestablish", "renew"]
        );
    }

    #[tokio::test]
    async fn test_healthy_session_only_renews() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession {
            renewals: VecDeque::new(),
            reestablishments: VecDeque::new(),
            calls: calls.clone(),
        };

        let handle = spawn_keep_alive(
            session,
            Duration::from_millis(5),
            RetryBackoff::default(),
            "svc.order_node-a".to_string(),
        );
        wait_for_calls(&calls, 3).await;
        handle.abort();

        assert!(calls.lock().iter().all(|call| *call == "renew"));
    }
}
