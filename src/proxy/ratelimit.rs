//! Admission control in front of the signing pipeline.
//!
//! A single process-wide token bucket guards pipeline entry. Denial is
//! immediate and synchronous: no queuing, no blocking, no retry — the
//! caller must re-send. A gate configured with a rate of zero (or less)
//! is disabled and admits everything.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket gate, safe for concurrent invocation from every in-flight
/// request. The mutex-guarded critical section is a bounded
/// read/refill/update of the token count.
#[derive(Debug)]
pub struct AdmissionGate {
    bucket: Option<Mutex<TokenBucket>>,
    rate: f64,
    capacity: f64,
}

impl AdmissionGate {
    /// `rate` is requests per second, `burst` the bucket capacity.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        if rate <= 0.0 {
            return Self {
                bucket: None,
                rate: 0.0,
                capacity: 0.0,
            };
        }
        let capacity = f64::from(burst);
        Self {
            bucket: Some(Mutex::new(TokenBucket {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            rate,
            capacity,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0.0, 0)
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };
        let mut bucket = bucket.lock().expect("admission gate mutex poisoned");

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_disables_the_gate() {
        let gate = AdmissionGate::new(0.0, 10);
        for _ in 0..1000 {
            assert!(gate.allow());
        }
    }

    #[test]
    fn negative_rate_disables_the_gate() {
        let gate = AdmissionGate::new(-1.0, 10);
        assert!(gate.allow());
    }

    #[test]
    fn burst_bounds_immediate_admissions() {
        let gate = AdmissionGate::new(1.0, 5);
        let admitted = (0..10).filter(|_| gate.allow()).count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn tokens_refill_over_time() {
        let gate = AdmissionGate::new(1000.0, 2);
        assert!(gate.allow());
        assert!(gate.allow());
        assert!(!gate.allow());

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(gate.allow());
    }

    #[test]
    fn zero_burst_with_positive_rate_denies() {
        let gate = AdmissionGate::new(5.0, 0);
        assert!(!gate.allow());
    }
}
