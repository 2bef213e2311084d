//! Failover Module Tests
//!
//! Exercises the primary-then-backup policy against a scripted in-memory
//! transport, including a primary that never answers.

#[cfg(test)]
mod tests {
    use crate::config::FailoverConfig;
    use crate::failover::{Failover, IntentTransport, JOINT_FAILURE_MESSAGE, Origin};
    use crate::protocol::{IntentKind, StandardResult, WorkerIntent};

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Answer(bool),
        Fail,
        Hang,
        Late(Duration),
    }

    #[derive(Default)]
    struct FakeTransport {
        behaviours: HashMap<String, Behaviour>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn with(mut self, target: &str, behaviour: Behaviour) -> Self {
            self.behaviours.insert(target.to_string(), behaviour);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IntentTransport for FakeTransport {
        async fn send(&self, target: &str, _intent: &WorkerIntent) -> Result<StandardResult> {
            self.calls.lock().unwrap().push(target.to_string());

            match self.behaviours.get(target).copied().unwrap_or(Behaviour::Fail) {
                Behaviour::Answer(true) => Ok(StandardResult::success(format!("from {}", target))),
                Behaviour::Answer(false) => Ok(StandardResult::failure("El libro no existe.")),
                Behaviour::Fail => Err(anyhow!("connection refused")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(anyhow!("unreachable"))
                }
                Behaviour::Late(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(StandardResult::success(format!("from {}", target)))
                }
            }
        }
    }

    fn failover(transport: Arc<FakeTransport>) -> Failover {
        Failover::new(transport, "primary", "backup", &FailoverConfig::default())
    }

    fn loan() -> WorkerIntent {
        WorkerIntent::new(IntentKind::Loan, "LIB001", "juan")
    }

    // ============================================================
    // DELIVERY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_primary_answers() {
        let transport = Arc::new(FakeTransport::default().with("primary", Behaviour::Answer(true)));

        let delivery = failover(transport.clone()).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Primary);
        assert_eq!(delivery.result.mensaje, "from primary");
        assert_eq!(transport.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_business_failure_is_not_failed_over() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Answer(false))
                .with("backup", Behaviour::Answer(true)),
        );

        let delivery = failover(transport.clone()).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Primary);
        assert!(!delivery.result.ok);
        assert_eq!(transport.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_backup() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Fail)
                .with("backup", Behaviour::Answer(true)),
        );

        let delivery = failover(transport.clone()).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Backup);
        assert_eq!(delivery.result.mensaje, "from backup");
        assert_eq!(transport.calls(), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn test_joint_failure_is_synthesized() {
        let transport = Arc::new(FakeTransport::default());

        let delivery = failover(transport).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::None);
        assert!(!delivery.result.ok);
        assert_eq!(delivery.result.mensaje, JOINT_FAILURE_MESSAGE);
    }

    // ============================================================
    // TIMEOUT TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_hanging_primary_is_bounded_by_receive_timeout() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Hang)
                .with("backup", Behaviour::Answer(true)),
        );
        let started = tokio::time::Instant::now();

        let delivery = failover(transport).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Backup);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "Primary is waited on for the receive timeout");
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_receive_timeout_goes_to_backup() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Late(Duration::from_secs(4)))
                .with("backup", Behaviour::Answer(true)),
        );

        let delivery = failover(transport.clone()).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Backup);
        assert_eq!(delivery.result.mensaje, "from backup");
        assert_eq!(transport.calls(), vec!["primary", "backup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_within_receive_timeout_stays_on_primary() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Late(Duration::from_secs(2)))
                .with("backup", Behaviour::Answer(true)),
        );

        let delivery = failover(transport.clone()).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Primary);
        assert_eq!(transport.calls(), vec!["primary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_timeout_is_taken_from_config() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("primary", Behaviour::Late(Duration::from_secs(4)))
                .with("backup", Behaviour::Answer(true)),
        );
        let config = FailoverConfig {
            send_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(5),
        };

        let delivery = Failover::new(transport, "primary", "backup", &config).deliver(&loan()).await;

        assert_eq!(delivery.origin, Origin::Primary);
    }
}
