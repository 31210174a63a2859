//! C7: retry/redirect controller (§4.7). `Retry` is an immutable value —
//! every attempt produces a new one via [`Retry::record_and_decrement`].

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{Error, RetryCategory};
use crate::url::Url;

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub attempt: u32,
    pub category: RetryCategory,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct Retry {
    pub total: Option<u32>,
    pub connect: Option<u32>,
    pub read: Option<u32>,
    pub status: Option<u32>,
    pub redirect: Option<u32>,
    pub other: Option<u32>,
    pub allowed_methods: HashSet<String>,
    pub status_forcelist: HashSet<u16>,
    pub backoff_factor: f64,
    pub backoff_max: Duration,
    pub backoff_jitter: Duration,
    pub respect_retry_after_header: bool,
    pub remove_headers_on_redirect: HashSet<String>,
    pub history: Vec<RetryEvent>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            total: Some(3),
            connect: None,
            read: None,
            status: None,
            redirect: Some(5),
            other: None,
            allowed_methods: ["GET", "HEAD", "PUT", "DELETE", "OPTIONS", "TRACE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            status_forcelist: HashSet::new(),
            backoff_factor: 0.0,
            backoff_max: Duration::from_secs(120),
            backoff_jitter: Duration::ZERO,
            respect_retry_after_header: true,
            remove_headers_on_redirect: ["authorization"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Retry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn is_status_forced(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }

    /// Decrement `category` and `total` together for this attempt, returning
    /// the next `Retry` state, or `Error::MaxRetry` if either was already
    /// exhausted.
    pub fn record_and_decrement(
        &self,
        category: RetryCategory,
        attempt: u32,
        detail: String,
        url: &Url,
        reason: Error,
    ) -> Result<Self, Error> {
        let mut next = self.clone();
        let category_ok = match category {
            RetryCategory::Connect => decrement(&mut next.connect),
            RetryCategory::Read => decrement(&mut next.read),
            RetryCategory::Status => decrement(&mut next.status),
            RetryCategory::Redirect => decrement(&mut next.redirect),
            RetryCategory::Other => decrement(&mut next.other),
        };
        let total_ok = decrement(&mut next.total);
        next.history.push(RetryEvent {
            attempt,
            category,
            detail,
        });

        if !category_ok || !total_ok {
            return Err(Error::MaxRetry {
                url: url.clone(),
                reason: Box::new(reason),
            });
        }
        Ok(next)
    }

    /// `sleep = min(backoff_max, backoff_factor * 2^(attempt-1)) + uniform(0, backoff_jitter)`.
    /// `attempt` is 1-indexed (the first retry has `attempt == 1`).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor * 2f64.powi(attempt.saturating_sub(1) as i32);
        let base = Duration::from_secs_f64(exp.max(0.0)).min(self.backoff_max);
        if self.backoff_jitter.is_zero() {
            return base;
        }
        let jitter_secs = rand::thread_rng().gen_range(0.0..self.backoff_jitter.as_secs_f64());
        base + Duration::from_secs_f64(jitter_secs)
    }

    /// Parse `Retry-After` as integer seconds or an HTTP-date. Invalid or
    /// negative values are treated as absent. A date already in the past
    /// resolves to a zero-length wait rather than being rejected (open
    /// question 3).
    pub fn parse_retry_after(&self, value: &str) -> Option<Duration> {
        let value = value.trim();
        if let Ok(secs) = value.parse::<i64>() {
            return if secs < 0 {
                None
            } else {
                Some(Duration::from_secs(secs as u64).min(self.backoff_max * 2))
            };
        }
        let target = parse_http_date(value)?;
        let now = SystemTime::now();
        let wait = target
            .duration_since(now)
            .unwrap_or(Duration::ZERO);
        Some(wait.min(self.backoff_max * 2))
    }
}

fn decrement(counter: &mut Option<u32>) -> bool {
    match counter {
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
        None => true,
    }
}

/// Minimal RFC 7231 IMF-fixdate parser: `"Sun, 06 Nov 1994 08:49:37 GMT"`.
/// Obsolete RFC 850 / asctime forms are not accepted — servers sending
/// `Retry-After` as a date overwhelmingly use IMF-fixdate in practice.
fn parse_http_date(s: &str) -> Option<SystemTime> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() != 6 || parts[5] != "GMT" {
        return None;
    }
    let day: i64 = parts[1].parse().ok()?;
    let month = month_number(parts[2])?;
    let year: i64 = parts[3].parse().ok()?;
    let mut time_parts = parts[4].split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    let secs = days * 86_400 + hour * 3600 + minute * 60 + second;
    if secs < 0 {
        Some(UNIX_EPOCH - Duration::from_secs((-secs) as u64))
    } else {
        Some(UNIX_EPOCH + Duration::from_secs(secs as u64))
    }
}

fn month_number(name: &str) -> Option<i64> {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS.iter().position(|m| *m == name).map(|i| i as i64 + 1)
}

/// Howard Hinnant's days-from-civil algorithm: days since the Unix epoch
/// for a given proleptic Gregorian (year, month, day).
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
