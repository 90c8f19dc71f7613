//! Browser fingerprint bundles and rotation
//!
//! Each bundle is an internally consistent browser identity. Rotation state
//! lives in the store so that restarts do not reset it.

use crate::browser::{ContextOptions, ProxySettings, Viewport};
use crate::config::FingerprintRotation;
use crate::storage::{FingerprintUsage, Store, StoreResult};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A consistent browser identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub id: &'static str,
    pub user_agent: &'static str,
    pub viewport: Viewport,
    pub platform: &'static str,
    pub vendor: &'static str,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub color_depth: u32,
    pub language: &'static str,
    pub languages: &'static [&'static str],
    pub timezone: &'static str,
}

const CHROME_131_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const CHROME_130_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";
const SAFARI_17_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15";
const CHROME_131_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const CHROME_130_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// The bundle library, in rotation order
pub const FINGERPRINTS: [Fingerprint; 6] = [
    Fingerprint {
        id: "mac_chrome_131_16gb",
        user_agent: CHROME_131_MAC,
        viewport: Viewport {
            width: 1920,
            height: 1080,
        },
        platform: "MacIntel",
        vendor: "Google Inc.",
        hardware_concurrency: 8,
        device_memory: 16,
        color_depth: 30,
        language: "en-CA",
        languages: &["en-CA", "en-US", "en", "fr"],
        timezone: "America/Montreal",
    },
    Fingerprint {
        id: "mac_chrome_130_8gb",
        user_agent: CHROME_130_MAC,
        viewport: Viewport {
            width: 1680,
            height: 1050,
        },
        platform: "MacIntel",
        vendor: "Google Inc.",
        hardware_concurrency: 4,
        device_memory: 8,
        color_depth: 24,
        language: "en-CA",
        languages: &["en-CA", "en-US", "en"],
        timezone: "America/Toronto",
    },
    Fingerprint {
        id: "mac_safari_17_16gb",
        user_agent: SAFARI_17_MAC,
        viewport: Viewport {
            width: 1440,
            height: 900,
        },
        platform: "MacIntel",
        vendor: "Apple Computer, Inc.",
        hardware_concurrency: 8,
        device_memory: 16,
        color_depth: 24,
        language: "en-CA",
        languages: &["en-CA", "en"],
        timezone: "America/Montreal",
    },
    Fingerprint {
        id: "win_chrome_131_16gb",
        user_agent: CHROME_131_WIN,
        viewport: Viewport {
            width: 1920,
            height: 1080,
        },
        platform: "Win32",
        vendor: "Google Inc.",
        hardware_concurrency: 12,
        device_memory: 16,
        color_depth: 24,
        language: "en-US",
        languages: &["en-US", "en"],
        timezone: "America/New_York",
    },
    Fingerprint {
        id: "win_chrome_130_8gb",
        user_agent: CHROME_130_WIN,
        viewport: Viewport {
            width: 1366,
            height: 768,
        },
        platform: "Win32",
        vendor: "Google Inc.",
        hardware_concurrency: 8,
        device_memory: 8,
        color_depth: 24,
        language: "en-US",
        languages: &["en-US", "en"],
        timezone: "America/Chicago",
    },
    Fingerprint {
        id: "mac_chrome_131_8gb_2k",
        user_agent: CHROME_131_MAC,
        viewport: Viewport {
            width: 2560,
            height: 1440,
        },
        platform: "MacIntel",
        vendor: "Google Inc.",
        hardware_concurrency: 8,
        device_memory: 8,
        color_depth: 30,
        language: "en-CA",
        languages: &["en-CA", "en-US", "en"],
        timezone: "America/Montreal",
    },
];

impl Fingerprint {
    /// Bundle #1, used when rotation is off or every bundle is exhausted
    pub fn primary() -> &'static Fingerprint {
        &FINGERPRINTS[0]
    }

    pub fn by_id(id: &str) -> Option<&'static Fingerprint> {
        FINGERPRINTS.iter().find(|fp| fp.id == id)
    }

    /// True for Chromium-family bundles, which send client hint headers
    pub fn is_chromium(&self) -> bool {
        self.vendor == "Google Inc."
    }

    /// Context options carrying this identity
    pub fn context_options(
        &self,
        extra_headers: Vec<(String, String)>,
        proxy: Option<ProxySettings>,
    ) -> ContextOptions {
        ContextOptions {
            user_agent: self.user_agent.to_string(),
            viewport: self.viewport,
            locale: self.language.to_string(),
            timezone: self.timezone.to_string(),
            extra_headers,
            proxy,
        }
    }
}

/// Use ceiling and window for the least-recently-used policies
fn usage_limits(policy: FingerprintRotation) -> Option<(u32, Duration)> {
    match policy {
        FingerprintRotation::Conservative => Some((20, Duration::hours(24))),
        FingerprintRotation::Moderate => Some((5, Duration::hours(1))),
        FingerprintRotation::Off | FingerprintRotation::Aggressive => None,
    }
}

/// Picks bundles according to the configured rotation policy
pub struct FingerprintRotator {
    policy: FingerprintRotation,
    rng: StdRng,
}

impl FingerprintRotator {
    pub fn new(policy: FingerprintRotation) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    pub fn with_rng(policy: FingerprintRotation, rng: StdRng) -> Self {
        Self { policy, rng }
    }

    /// Selects a bundle for a new browser context
    ///
    /// With a least-recently-used policy a bundle is ineligible while its use
    /// count is at the ceiling and its last use falls inside the window.
    /// Never-used bundles come first, then the oldest. When nothing is
    /// eligible the usage history is cleared and bundle #1 is returned.
    pub fn select<S: Store>(
        &mut self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> StoreResult<&'static Fingerprint> {
        let (max_uses, max_age) = match self.policy {
            FingerprintRotation::Off => return Ok(Fingerprint::primary()),
            FingerprintRotation::Aggressive => {
                let index = self.rng.gen_range(0..FINGERPRINTS.len());
                return Ok(&FINGERPRINTS[index]);
            }
            policy => match usage_limits(policy) {
                Some(limits) => limits,
                None => return Ok(Fingerprint::primary()),
            },
        };

        let usage = store.load_fingerprint_usage()?;

        let mut eligible: Vec<(&'static Fingerprint, Option<DateTime<Utc>>)> = FINGERPRINTS
            .iter()
            .filter_map(|fp| match usage.get(fp.id) {
                None => Some((fp, None)),
                Some(record) => {
                    let recent = record
                        .last_used_at
                        .is_some_and(|last| now.signed_duration_since(last) < max_age);
                    if record.use_count >= max_uses && recent {
                        None
                    } else {
                        Some((fp, record.last_used_at))
                    }
                }
            })
            .collect();

        if eligible.is_empty() {
            tracing::warn!("All fingerprints exhausted, resetting usage tracking");
            store.clear_fingerprint_usage()?;
            return Ok(Fingerprint::primary());
        }

        // None sorts before Some, so never-used bundles win
        eligible.sort_by_key(|(_, last_used)| *last_used);

        Ok(eligible[0].0)
    }

    /// Records one use of a bundle and its outcome
    pub fn record_use<S: Store>(
        store: &mut S,
        id: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut usage = store
            .load_fingerprint_usage()?
            .remove(id)
            .unwrap_or_default();

        usage.use_count += 1;
        if success {
            usage.success_count += 1;
        } else {
            usage.failure_count += 1;
        }
        usage.last_used_at = Some(now);

        store.save_fingerprint_usage(id, &usage)?;

        if usage.use_count >= 5 {
            let rate = usage.success_count as f64 / usage.use_count as f64;
            if rate < 0.5 {
                tracing::warn!(
                    fingerprint = id,
                    "Fingerprint has low success rate: {:.1}% ({}/{})",
                    rate * 100.0,
                    usage.success_count,
                    usage.use_count
                );
            }
        }

        Ok(())
    }

    /// Usage statistics for every bundle that has been used
    pub fn stats<S: Store>(store: &S) -> StoreResult<FingerprintStats> {
        let usage = store.load_fingerprint_usage()?;

        let mut entries: Vec<FingerprintStat> = usage
            .iter()
            .map(|(id, usage)| FingerprintStat::from_usage(id, usage))
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(FingerprintStats {
            total: FINGERPRINTS.len(),
            used: entries.len(),
            entries,
        })
    }
}

/// Usage summary across the library
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintStats {
    pub total: usize,
    pub used: usize,
    pub entries: Vec<FingerprintStat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintStat {
    pub id: String,
    pub uses: u32,
    pub success_rate: f64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl FingerprintStat {
    fn from_usage(id: &str, usage: &FingerprintUsage) -> Self {
        let success_rate = if usage.use_count > 0 {
            usage.success_count as f64 / usage.use_count as f64
        } else {
            0.0
        };

        Self {
            id: id.to_string(),
            uses: usage.use_count,
            success_rate,
            last_used_at: usage.last_used_at,
        }
    }
}
