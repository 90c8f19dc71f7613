//! Free-text heuristics shared by the detail extractors

use crate::extract::DetailRecord;
use regex::Regex;
use std::sync::LazyLock;

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[A-Z]\d[A-Z]\s?\d[A-Z]\d\b").unwrap());

/// A comma-separated segment that is the province itself
static PROVINCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\(?(?:QC|Qu[ée]bec)\b").unwrap());

/// A segment ending with an inline province, e.g. `Laval (QC)`
static INLINE_PROVINCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(?(?:QC|Qu[ée]bec)\)?(?:\s|$)").unwrap());

static TIME_ON_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Time on REALTOR\.ca[:\s]+(\d+)\s+(hour|day|week|month)s?").unwrap()
});

/// Canadian postal code, normalized to `A1A 1A1`
pub fn postal_code(text: &str) -> Option<String> {
    let raw = POSTAL_CODE.find(text)?.as_str().to_uppercase().replace(' ', "");
    let (forward, local) = raw.split_at(raw.char_indices().nth(3)?.0);
    Some(format!("{} {}", forward, local))
}

/// Municipality name appearing right before a `QC`/`Quebec` token
pub fn municipality(address: &str) -> Option<String> {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    for (i, part) in parts.iter().enumerate() {
        if PROVINCE.is_match(part) {
            return i
                .checked_sub(1)
                .map(|prev| parts[prev])
                .filter(|p| looks_like_place(p))
                .map(str::to_string);
        }
        if let Some(caps) = INLINE_PROVINCE.captures(part) {
            let name = caps[1].trim();
            if looks_like_place(name) {
                return Some(name.to_string());
            }
        }
    }

    None
}

fn looks_like_place(text: &str) -> bool {
    text.chars().next().is_some_and(|c| !c.is_ascii_digit())
}

/// Days on market from a "Time on REALTOR.ca: N unit" phrase
pub fn days_on_market(body_text: &str) -> Option<i64> {
    let caps = TIME_ON_SITE.captures(body_text)?;
    let value: i64 = caps[1].parse().ok()?;
    let days = match caps[2].to_lowercase().as_str() {
        "hour" => value / 24,
        "day" => value,
        "week" => value * 7,
        "month" => value * 30,
        _ => return None,
    };
    Some(days)
}

/// Sets the amenity flags from keywords in the page body
pub fn apply_amenities(body_text: &str, detail: &mut DetailRecord) {
    let lower = body_text.to_lowercase();
    detail.has_garage = lower.contains("garage");
    detail.has_basement = lower.contains("basement") || lower.contains("sous-sol");
    detail.has_pool = lower.contains("pool") || lower.contains("piscine");
    detail.has_ac = lower.contains("air conditioning")
        || lower.contains("central air")
        || lower.contains("climatis");
    detail.has_fireplace = lower.contains("fireplace") || lower.contains("foyer");
}
