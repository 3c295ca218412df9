#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        routing::{get, post},
        Json, Router,
    };
    use star_core::{config::TakeoverConfig, models::ServiceId, StarError};
    use star_dispatcher::takeover::{TakeoverController, TakeoverOutcome};
    use tokio::sync::Notify;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    struct Incumbent {
        port: u16,
        stop_calls: Arc<AtomicUsize>,
    }

    /// 一个假的、正在运行的Dispatcher；`obey_stop` 为false时收到停止请求也不退出
    async fn start_incumbent(version: &'static str, obey_stop: bool) -> Incumbent {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());

        let calls = stop_calls.clone();
        let stopper = notify.clone();
        let app = Router::new()
            .route("/version", get(move || async move { Json(version.to_string()) }))
            .route(
                "/stop",
                post(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if obey_stop {
                        stopper.notify_one();
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
                .unwrap();
        });

        Incumbent { port, stop_calls }
    }

    fn controller(version: &str, max_wait_ms: u64) -> TakeoverController {
        let config = TakeoverConfig {
            probe_timeout_ms: 1_000,
            poll_interval_ms: 50,
            max_wait_ms,
        };
        TakeoverController::new(
            ServiceId::parse(&format!("main/dispatcher/{version}")).unwrap(),
            "secret",
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_newer_process_stops_incumbent_and_binds() {
        let incumbent = start_incumbent("main/dispatcher/1.0", true).await;

        let outcome = controller("2.0", 5_000)
            .run(LOCALHOST, incumbent.port)
            .await
            .unwrap();

        match outcome {
            TakeoverOutcome::Proceed(listener) => {
                assert_eq!(listener.local_addr().unwrap().port(), incumbent.port);
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
        assert_eq!(incumbent.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_equal_version_yields_without_stop() {
        let incumbent = start_incumbent("main/dispatcher/1.0", true).await;

        let outcome = controller("1.0", 1_000)
            .run(LOCALHOST, incumbent.port)
            .await
            .unwrap();

        assert!(matches!(outcome, TakeoverOutcome::Yield { .. }));
        assert_eq!(incumbent.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_older_version_yields_without_stop() {
        let incumbent = start_incumbent("main/dispatcher/2.0", true).await;

        let outcome = controller("1.9", 1_000)
            .run(LOCALHOST, incumbent.port)
            .await
            .unwrap();

        match outcome {
            TakeoverOutcome::Yield { incumbent: id } => assert_eq!(id.version().as_str(), "2.0"),
            other => panic!("expected Yield, got {other:?}"),
        }
        assert_eq!(incumbent.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_older_than_release() {
        let incumbent = start_incumbent("main/dispatcher/1.2", true).await;

        let outcome = controller("1.2-SNAPSHOT", 1_000)
            .run(LOCALHOST, incumbent.port)
            .await
            .unwrap();
        assert!(matches!(outcome, TakeoverOutcome::Yield { .. }));
    }

    #[tokio::test]
    async fn test_no_responder_binds_directly() {
        let port = {
            let probe = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
            probe.local_addr().unwrap().port()
        };

        let outcome = controller("1.0", 1_000).run(LOCALHOST, port).await.unwrap();
        assert!(matches!(outcome, TakeoverOutcome::Proceed(_)));
    }

    #[tokio::test]
    async fn test_stubborn_incumbent_is_fatal() {
        let incumbent = start_incumbent("main/dispatcher/1.0", false).await;

        let result = controller("2.0", 300).run(LOCALHOST, incumbent.port).await;

        assert!(matches!(result, Err(StarError::Fatal(_))));
        assert_eq!(incumbent.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparsable_incumbent_version_is_fatal() {
        let incumbent = start_incumbent("   ", true).await;

        let result = controller("2.0", 300).run(LOCALHOST, incumbent.port).await;
        assert!(matches!(result, Err(StarError::Fatal(_))));
        assert_eq!(incumbent.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_yield_does_not_disturb_incumbent() {
        let incumbent = start_incumbent("main/dispatcher/3.0", true).await;
        controller("1.0", 300).run(LOCALHOST, incumbent.port).await.unwrap();

        // 原进程仍在应答
        let body: String = reqwest::get(format!("http://127.0.0.1:{}/version", incumbent.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, "main/dispatcher/3.0");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
