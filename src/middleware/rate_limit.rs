use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::{body::Body, response::IntoResponse, Json, Router};
use http::{HeaderValue, Response};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

use crate::config::RateLimitConfig;
use crate::error::{AppError, ErrorResponse};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Render limiter rejections with the same JSON shape as `AppError`.
pub fn rate_limit_error(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut resp = AppError::RateLimited.into_response();
            if let Some(hmap) = headers {
                resp.headers_mut().extend(hmap);
            }
            // `wait_time` is in seconds
            resp.headers_mut()
                .insert(http::header::RETRY_AFTER, HeaderValue::from(wait_time));
            resp
        }
        GovernorError::UnableToExtractKey => AppError::BadRequest(
            "Unable to determine client IP for rate limiting".to_string(),
        )
        .into_response(),
        GovernorError::Other { code, msg, headers } => {
            let message = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp =
                (code, Json(ErrorResponse::new("RATE_LIMITED", message))).into_response();
            if let Some(hmap) = headers {
                resp.headers_mut().extend(hmap);
            }
            resp
        }
    }
}

/// Wrap `router` in a per-IP limiter and start the thread that prunes idle keys.
///
/// The thread exits once `shutdown` is set.
pub fn with_rate_limit<S>(
    router: Router<S>,
    config: &RateLimitConfig,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<(Router<S>, JoinHandle<()>)>
where
    S: Clone + Send + Sync + 'static,
{
    let mut builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    // `per_second(n)` would mean one slot every n seconds
    builder.period(config.replenish_interval());
    builder.burst_size(config.burst);
    builder.error_handler(rate_limit_error);

    let gov_conf = Arc::new(
        builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build API governor config"))?,
    );

    let cleaner = {
        let limiter = gov_conf.limiter().clone();
        std::thread::spawn(move || {
            // Small sleep granularity so shutdown is quick
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..CLEANUP_INTERVAL.as_secs() {
                    if shutdown.load(Ordering::SeqCst) {
                        tracing::info!("API rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("api rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    Ok((router.layer(GovernorLayer { config: gov_conf }), cleaner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::services::testing::{test_state, FakeProvider};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn save_token(ip: &str) -> Request<Body> {
        Request::post("/api/save-token")
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({ "userId": "alice", "token": "tok-1" }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn limiter_replenishes_at_configured_rate() {
        let (state, _) = test_state(FakeProvider::succeeding());
        let shutdown = Arc::new(AtomicBool::new(false));
        let config = RateLimitConfig {
            per_second: 10,
            burst: 1,
        };
        let (api, cleaner) =
            with_rate_limit(routes::push::router(), &config, shutdown.clone()).unwrap();
        let app = routes::app(state, api);

        let resp = app.clone().oneshot(save_token("1.2.3.4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(save_token("1.2.3.4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(http::header::RETRY_AFTER));
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "RATE_LIMITED");

        // Other clients have their own bucket
        let resp = app.clone().oneshot(save_token("5.6.7.8")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // One slot comes back every 100ms at 10/s
        tokio::time::sleep(Duration::from_millis(250)).await;
        let resp = app.oneshot(save_token("1.2.3.4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        shutdown.store(true, Ordering::SeqCst);
        cleaner.join().unwrap();
    }

    #[test]
    fn key_extraction_failure_is_a_validation_error() {
        let resp = rate_limit_error(GovernorError::UnableToExtractKey);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
