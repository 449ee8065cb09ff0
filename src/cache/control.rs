/// `Cache-Control` directives attached to served images.
///
/// Browser lifetime comes from `browser_max_age_days`; the server-side cache
/// lifetime (`max_cache_days`) never leaks into response headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheControl {
    /// Browser cache time-to-live in seconds (via max-age directive).
    pub max_age: u64,

    /// Enable public caching by intermediaries (CDNs, proxies).
    pub public: bool,

    /// Revalidate with the origin once `max_age` has elapsed.
    pub must_revalidate: bool,
}

impl Default for CacheControl {
    fn default() -> Self {
        Self::for_days(crate::config::DEFAULT_BROWSER_MAX_AGE_DAYS)
    }
}

impl CacheControl {
    pub fn for_days(days: u32) -> Self {
        Self {
            max_age: u64::from(days) * 24 * 60 * 60,
            public: true,
            must_revalidate: true,
        }
    }

    /// Generates RFC 7234 compliant Cache-Control header value.
    pub fn header_value(&self) -> String {
        if self.max_age == 0 {
            return "no-store, no-cache, must-revalidate".to_string();
        }

        let mut parts = Vec::new();
        parts.push(if self.public { "public" } else { "private" }.to_string());
        parts.push(format!("max-age={}", self.max_age));
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        parts.join(", ")
    }
}
