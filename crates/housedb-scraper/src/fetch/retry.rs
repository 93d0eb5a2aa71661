//! Backoff schedule and retry classification for page fetches.

use std::time::Duration;

use reqwest::StatusCode;

/// Wait before retry number `retry` (0-based): `base * 2^retry` jittered by
/// ±25 %, never more than `max`.
///
/// | Retry | Sleep with `base = 1 s`  |
/// |-------|--------------------------|
/// | 0     | 1 s × 2⁰ ± 25 %          |
/// | 1     | 1 s × 2¹ ± 25 %          |
/// | 2     | 1 s × 2² ± 25 %          |
#[must_use]
pub fn backoff_delay(retry: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let computed = base_ms.saturating_mul(1u64 << retry.min(20));
    let capped = computed.min(max_ms);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    Duration::from_millis(delay_ms.min(max_ms))
}

/// 429 and every 5xx are worth another attempt. Other non-success codes
/// would come back the same.
pub(crate) fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

/// Interstitial pages served with a 200 instead of the requested content.
#[must_use]
pub fn looks_like_bot_challenge(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    let has_cloudflare_banner = lowered.contains("attention required! | cloudflare");
    let has_challenge_platform = lowered.contains("/cdn-cgi/challenge-platform/");
    let has_just_a_moment = lowered.contains("just a moment...");
    let has_cookie_gate = lowered.contains("please enable cookies");
    let has_cf_chl = lowered.contains("cf-chl-");

    has_cloudflare_banner
        || has_challenge_platform
        || (has_just_a_moment && has_cookie_gate)
        || (has_just_a_moment && has_cf_chl)
}
