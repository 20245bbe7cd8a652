use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::core::config::RateLimit;

/// Token bucket shared by every request a session makes.
///
/// `burst` tokens are available up front and refill at `qps` per second.
/// Callers that find the bucket empty reserve a token and sleep until it is due.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    limit: RateLimit,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: f64::from(limit.burst),
                last_refill: Instant::now(),
            })),
            limit,
        }
    }

    pub async fn acquire(&self) {
        let qps = f64::from(self.limit.qps);
        if qps <= 0.0 {
            return;
        }

        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * qps).min(f64::from(self.limit.burst.max(1)));
            bucket.last_refill = now;
            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(-bucket.tokens / qps))
            }
        };

        if let Some(wait) = wait {
            sleep(wait).await;
        }
    }
}
