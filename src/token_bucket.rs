//! Local mirror of one server-side rate-limit bucket.

use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::Instant;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";

/// Cap for cooldowns whose end does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Rate-limit headers carried by a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
}

impl RateLimitHeaders {
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name| header_text(headers, name);

        Self {
            limit: text(HEADER_LIMIT).and_then(|v| v.parse().ok()),
            remaining: text(HEADER_REMAINING).and_then(|v| v.parse().ok()),
            // seconds with millisecond precision, e.g. "1.337"
            reset_after: text(HEADER_RESET_AFTER)
                .and_then(|v| v.parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            bucket: text(HEADER_BUCKET).map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_after.is_none()
            && self.bucket.is_none()
    }
}

fn header_text<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Cooldown state of one bucket.
///
/// `remaining` is unknown until the first response arrives; an unknown
/// bucket never blocks.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    last_used: Instant,
}

impl TokenBucket {
    pub fn new(now: Instant) -> Self {
        Self {
            limit: None,
            remaining: None,
            reset_at: None,
            last_used: now,
        }
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    fn refill(&mut self, now: Instant) {
        if let Some(reset_at) = self.reset_at {
            if now >= reset_at {
                self.remaining = self.limit;
                self.reset_at = None;
            }
        }
    }

    /// When the bucket is exhausted, the instant it resets
    pub fn cooldown_until(&mut self, now: Instant) -> Option<Instant> {
        self.refill(now);
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at),
            _ => None,
        }
    }

    pub fn is_cooling_down(&mut self, now: Instant) -> bool {
        self.cooldown_until(now).is_some()
    }

    /// Spend one request from the local estimate
    pub fn consume(&mut self, now: Instant) {
        self.refill(now);
        self.last_used = now;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Replace the local estimate with what the server reported
    pub fn apply(&mut self, headers: &RateLimitHeaders, now: Instant) {
        self.last_used = now;
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = Some(remaining);
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(deadline(now, reset_after));
        }
    }

    /// Cool down for exactly `wait`, replacing any local estimate
    pub fn block_for(&mut self, wait: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(deadline(now, wait));
        self.last_used = now;
    }
}

fn deadline(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait.min(FAR_FUTURE)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_LIMIT, "5"),
            (HEADER_REMAINING, "0"),
            (HEADER_RESET_AFTER, "1.250"),
            (HEADER_BUCKET, "abcd1234"),
        ]));

        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.reset_after, Some(Duration::from_millis(1250)));
        assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn test_parse_ignores_garbage() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_REMAINING, "many"),
            (HEADER_RESET_AFTER, "-1"),
            (HEADER_BUCKET, " "),
        ]));
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_parse_rejects_unrepresentable_reset_after() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_REMAINING, "0"),
            (HEADER_RESET_AFTER, "1e30"),
        ]));
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.reset_after, None);
    }

    #[test]
    fn test_huge_waits_saturate() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(now);
        bucket.apply(
            &RateLimitHeaders {
                limit: Some(1),
                remaining: Some(0),
                reset_after: Some(Duration::MAX),
                bucket: None,
            },
            now,
        );
        assert_eq!(bucket.cooldown_until(now), Some(now + FAR_FUTURE));

        bucket.block_for(Duration::MAX, now);
        assert!(bucket.is_cooling_down(now + Duration::from_secs(86400)));
    }

    #[test]
    fn test_unknown_bucket_never_blocks() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(now);
        assert!(!bucket.is_cooling_down(now));
        bucket.consume(now);
        assert_eq!(bucket.remaining(), None);
    }

    #[test]
    fn test_exhausted_bucket_cools_down_until_reset() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(now);
        bucket.apply(
            &RateLimitHeaders {
                limit: Some(5),
                remaining: Some(0),
                reset_after: Some(Duration::from_secs(2)),
                bucket: None,
            },
            now,
        );

        assert_eq!(bucket.cooldown_until(now), Some(now + Duration::from_secs(2)));
        assert!(bucket.is_cooling_down(now + Duration::from_millis(1999)));

        let later = now + Duration::from_secs(2);
        assert!(!bucket.is_cooling_down(later));
        assert_eq!(bucket.remaining(), Some(5));
    }

    #[test]
    fn test_consume_exhausts_local_estimate() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(now);
        bucket.apply(
            &RateLimitHeaders {
                limit: Some(2),
                remaining: Some(1),
                reset_after: Some(Duration::from_secs(1)),
                bucket: None,
            },
            now,
        );

        assert!(!bucket.is_cooling_down(now));
        bucket.consume(now);
        assert_eq!(bucket.remaining(), Some(0));
        assert!(bucket.is_cooling_down(now));
        bucket.consume(now);
        assert_eq!(bucket.remaining(), Some(0));
    }

    #[test]
    fn test_block_for_replaces_header_estimate() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(now);
        bucket.apply(
            &RateLimitHeaders {
                limit: Some(5),
                remaining: Some(0),
                reset_after: Some(Duration::from_secs(30)),
                bucket: None,
            },
            now,
        );
        bucket.block_for(Duration::from_secs(1), now);

        assert_eq!(bucket.cooldown_until(now), Some(now + Duration::from_secs(1)));
        assert!(!bucket.is_cooling_down(now + Duration::from_secs(1)));
        assert_eq!(bucket.remaining(), Some(5));
    }
}
