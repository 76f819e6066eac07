//! Handshake limiter (pre-upgrade abuse guard).
//!
//! Fixed window per client key: the first request opens a window, and at
//! most `max_requests` upgrades are allowed until it expires. Rejections map
//! to HTTP 429.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

use signalroom_core::error::{Result, SignalError};

use crate::config::RateLimitSection;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// In-memory fixed-window limiter keyed by client address.
///
/// When more than `max_tracked_clients` keys are held, expired windows are
/// swept inline. Live windows are never dropped early.
#[derive(Debug)]
pub struct HandshakeLimiter {
    enabled: bool,
    window: Duration,
    max_requests: u32,
    max_tracked: usize,
    clients: DashMap<String, Window>,
}

impl HandshakeLimiter {
    pub fn new(cfg: &RateLimitSection) -> Self {
        Self {
            enabled: cfg.enabled,
            window: Duration::from_secs(cfg.window_secs),
            max_requests: cfg.max_requests.max(1),
            max_tracked: cfg.max_tracked_clients.max(1),
            clients: DashMap::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.clients.len()
    }

    pub fn check(&self, client: &str) -> Result<()> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let allowed = {
            let mut fresh = false;
            let mut w = self.clients.entry(client.to_string()).or_insert_with(|| {
                fresh = true;
                Window {
                    count: 0,
                    reset_at: now,
                }
            });

            if fresh || now > w.reset_at {
                *w = Window {
                    count: 1,
                    reset_at: now + self.window,
                };
                true
            } else if w.count >= self.max_requests {
                false
            } else {
                w.count += 1;
                true
            }
        };

        // Entry guard released above; sweeping while holding it would deadlock the shard.
        if self.clients.len() > self.max_tracked {
            self.clients.retain(|_, w| now <= w.reset_at);
            tracing::debug!(len = self.clients.len(), "handshake limiter swept expired windows");
        }

        if allowed {
            Ok(())
        } else {
            Err(SignalError::RateLimited)
        }
    }
}

/// Key a client by forwarded headers (when trusted) or its socket address.
pub fn client_key(headers: &HeaderMap, peer: SocketAddr, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let first_forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = first_forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(max: u32, tracked: usize) -> HandshakeLimiter {
        HandshakeLimiter::new(&RateLimitSection {
            enabled: true,
            window_secs: 60,
            max_requests: max,
            trust_forwarded_headers: true,
            max_tracked_clients: tracked,
        })
    }

    #[test]
    fn window_caps_then_resets() {
        let l = limiter(2, 100);
        let t0 = Instant::now();
        assert!(l.check_at("1.2.3.4", t0).is_ok());
        assert!(l.check_at("1.2.3.4", t0).is_ok());
        let err = l.check_at("1.2.3.4", t0 + Duration::from_secs(59)).unwrap_err();
        assert_eq!(err.client_code().as_str(), "RATE_LIMITED");

        // other clients are independent
        assert!(l.check_at("5.6.7.8", t0).is_ok());

        assert!(l.check_at("1.2.3.4", t0 + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn sweeps_only_expired_windows() {
        let l = limiter(5, 2);
        let t0 = Instant::now();
        l.check_at("a", t0).unwrap();
        l.check_at("b", t0).unwrap();
        let later = t0 + Duration::from_secs(120);
        l.check_at("c", later).unwrap();
        assert_eq!(l.tracked(), 1);
    }

    #[test]
    fn disabled_allows_everything() {
        let mut cfg = RateLimitSection::default();
        cfg.enabled = false;
        cfg.max_requests = 1;
        let l = HandshakeLimiter::new(&cfg);
        for _ in 0..10 {
            assert!(l.check("x").is_ok());
        }
        assert_eq!(l.tracked(), 0);
    }

    #[test]
    fn client_key_prefers_forwarded_headers() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut h = HeaderMap::new();
        assert_eq!(client_key(&h, peer, true), "10.0.0.9");

        h.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(client_key(&h, peer, true), "192.0.2.7");

        h.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.1 , 10.0.0.1"));
        assert_eq!(client_key(&h, peer, true), "198.51.100.1");

        assert_eq!(client_key(&h, peer, false), "10.0.0.9");
    }
}
