//! HTTP health polling

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Upper bound for a single probe request
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll GET `url` every `interval` until it returns 200 or `timeout` elapses.
///
/// Each request is bounded by the time left, so the whole wait never
/// exceeds `timeout` by more than one interval.
pub async fn wait_http_ok(client: &Client, url: &str, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match client
            .get(url)
            .timeout(remaining.min(PROBE_REQUEST_TIMEOUT))
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!("{} healthy after {} attempt(s)", url, attempts);
                return true;
            }
            Ok(response) => trace!("{} answered {}", url, response.status()),
            Err(e) => trace!("{} not reachable yet: {}", url, e),
        }

        if Instant::now() + interval >= deadline {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    debug!("{} not healthy after {:?} ({} attempts)", url, timeout, attempts);
    false
}
