//! Adaptive pacing between navigations

use crate::config::TimingConfig;
use crate::evasion::PageKind;
use chrono::Timelike;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

/// Base delay multiplier for a local hour of day
pub fn time_of_day_multiplier(hour: u32) -> f64 {
    match hour {
        0..=5 => 1.4,
        6..=8 => 1.1,
        12..=13 => 1.3,
        22..=23 => 1.2,
        _ => 1.0,
    }
}

/// Delay drawn from a triangular distribution peaking halfway between bounds
pub fn triangular_delay<R: Rng + ?Sized>(min_ms: u64, max_ms: u64, rng: &mut R) -> u64 {
    let range = max_ms.saturating_sub(min_ms) as f64;
    let weight = (rng.gen::<f64>() + rng.gen::<f64>()) / 2.0;
    min_ms + (weight * range).floor() as u64
}

/// Spaces out requests for one run
///
/// The last-request instant belongs to the pacer, so two runs never share
/// burst state.
pub struct Pacer {
    config: TimingConfig,
    last_request: Option<Instant>,
    rng: StdRng,
}

impl Pacer {
    pub fn new(config: TimingConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: TimingConfig, rng: StdRng) -> Self {
        Self {
            config,
            last_request: None,
            rng,
        }
    }

    fn bounds(&self, kind: PageKind) -> (u64, u64) {
        match kind {
            PageKind::Detail => (self.config.detail_min_ms, self.config.detail_max_ms),
            PageKind::Search | PageKind::Warmup => {
                (self.config.search_min_ms, self.config.search_max_ms)
            }
        }
    }

    /// Computes the wait before the next request and records it as scheduled
    pub fn next_delay(&mut self, kind: PageKind, now: Instant, hour: u32) -> Duration {
        let (min_ms, max_ms) = self.bounds(kind);
        let mut delay_ms = triangular_delay(min_ms, max_ms, &mut self.rng);

        if self.config.time_of_day_aware {
            let variance = self.rng.gen::<f64>() * 0.2 + 0.9;
            let multiplier = time_of_day_multiplier(hour) * variance;
            delay_ms = (delay_ms as f64 * multiplier).floor() as u64;
        }

        let mut delay = Duration::from_millis(delay_ms);

        if self.config.burst_protection {
            let spacing = Duration::from_millis(self.config.min_spacing_ms);
            if let Some(last) = self.last_request {
                let since = now.saturating_duration_since(last);
                if since < spacing {
                    delay += spacing - since;
                }
            }
            self.last_request = Some(now + delay);
        }

        delay
    }

    /// Sleeps for the next delay
    pub async fn pace(&mut self, kind: PageKind) {
        let hour = chrono::Local::now().hour();
        let delay = self.next_delay(kind, Instant::now(), hour);
        tracing::debug!(?kind, "Pacing {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TimingConfig {
        TimingConfig {
            time_of_day_aware: false,
            burst_protection: false,
            ..TimingConfig::default()
        }
    }

    #[test]
    fn test_multiplier_bands() {
        assert_eq!(time_of_day_multiplier(3), 1.4);
        assert_eq!(time_of_day_multiplier(7), 1.1);
        assert_eq!(time_of_day_multiplier(12), 1.3);
        assert_eq!(time_of_day_multiplier(15), 1.0);
        assert_eq!(time_of_day_multiplier(19), 1.0);
        assert_eq!(time_of_day_multiplier(23), 1.2);
    }

    #[test]
    fn test_triangular_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let d = triangular_delay(2000, 5000, &mut rng);
            assert!((2000..=5000).contains(&d));
        }
    }

    #[test]
    fn test_detail_delays_use_detail_range() {
        let mut pacer = Pacer::with_rng(config(), StdRng::seed_from_u64(9));
        let now = Instant::now();

        for _ in 0..100 {
            let d = pacer.next_delay(PageKind::Detail, now, 15).as_millis() as u64;
            assert!((3000..=8000).contains(&d));

            let s = pacer.next_delay(PageKind::Search, now, 15).as_millis() as u64;
            assert!((2000..=5000).contains(&s));
        }
    }

    #[test]
    fn test_time_of_day_stretches_delay() {
        let mut cfg = config();
        cfg.time_of_day_aware = true;
        let mut pacer = Pacer::with_rng(cfg, StdRng::seed_from_u64(11));
        let now = Instant::now();

        for _ in 0..100 {
            let d = pacer.next_delay(PageKind::Search, now, 2).as_millis() as u64;
            // 2000 * 1.4 * 0.9 .. 5000 * 1.4 * 1.1
            assert!((2520..=7700).contains(&d), "delay {}", d);
        }
    }

    #[test]
    fn test_burst_protection_enforces_spacing() {
        let mut cfg = config();
        cfg.burst_protection = true;
        cfg.search_min_ms = 0;
        cfg.search_max_ms = 0;
        let mut pacer = Pacer::with_rng(cfg, StdRng::seed_from_u64(5));
        let now = Instant::now();

        assert_eq!(pacer.next_delay(PageKind::Search, now, 15), Duration::ZERO);

        let second = pacer.next_delay(PageKind::Search, now + Duration::from_millis(500), 15);
        assert_eq!(second, Duration::from_millis(1000));
    }

    #[test]
    fn test_pacers_do_not_share_state() {
        let mut cfg = config();
        cfg.burst_protection = true;
        cfg.search_min_ms = 0;
        cfg.search_max_ms = 0;
        let now = Instant::now();

        let mut first = Pacer::with_rng(cfg.clone(), StdRng::seed_from_u64(1));
        first.next_delay(PageKind::Search, now, 15);

        let mut second = Pacer::with_rng(cfg, StdRng::seed_from_u64(1));
        assert_eq!(second.next_delay(PageKind::Search, now, 15), Duration::ZERO);
    }
}
