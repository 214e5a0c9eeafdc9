//! Per-IP request rate limiter for the API routes.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::GatewayState;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window of request timestamps per client IP.
pub struct RateLimiter {
    max_requests_per_minute: u32,
    requests: Arc<RequestLog>,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: u32) -> Self {
        let limiter = Self {
            max_requests_per_minute,
            requests: Arc::new(Mutex::new(HashMap::new())),
        };

        tokio::spawn(sweep(Arc::downgrade(&limiter.requests), WINDOW));
        limiter
    }

    /// Record a request from `ip`. Returns false when it is over the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let Ok(mut map) = self.requests.lock() else {
            return true;
        };
        let now = Instant::now();
        let stamps = map.entry(ip).or_default();
        stamps.retain(|t| now.duration_since(*t) < WINDOW);

        if stamps.len() >= self.max_requests_per_minute as usize {
            warn!(%ip, count = stamps.len(), limit = self.max_requests_per_minute,
                "Rate limited: too many requests from IP");
            return false;
        }

        stamps.push(now);
        true
    }
}

type RequestLog = Mutex<HashMap<IpAddr, Vec<Instant>>>;

/// Drop expired timestamps every `period` until the limiter is gone.
async fn sweep(requests: Weak<RequestLog>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let Some(log) = requests.upgrade() else {
            debug!("Rate limiter dropped, cleanup stopped");
            break;
        };
        let Ok(mut map) = log.lock() else {
            break;
        };
        let now = Instant::now();
        map.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < WINDOW);
            !stamps.is_empty()
        });
        debug!(entries = map.len(), "Rate limiter cleanup");
    }
}

/// Middleware rejecting over-limit clients with 429.
pub async fn limit_requests(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.check(addr.ip()) {
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(request).await
}
