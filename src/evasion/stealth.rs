//! Init script and request headers that mask automation

use crate::evasion::fingerprint::Fingerprint;

/// Accept-Language sent by every context
pub const ACCEPT_LANGUAGE: &str = "en-CA,en-US;q=0.9,en;q=0.8,fr;q=0.7";

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

const BASE_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });

window.chrome = { runtime: {}, loadTimes: function () {}, csi: function () {}, app: {} };

const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => {
  if (parameters.name === 'notifications') {
    return Promise.resolve({ state: 'prompt', onchange: null });
  }
  return originalQuery(parameters);
};

Object.defineProperty(navigator, 'plugins', {
  get: () => [
    {
      0: { type: 'application/x-google-chrome-pdf', suffixes: 'pdf', description: 'Portable Document Format' },
      description: 'Portable Document Format',
      filename: 'internal-pdf-viewer',
      length: 1,
      name: 'Chrome PDF Plugin',
    },
    {
      0: { type: 'application/pdf', suffixes: 'pdf', description: 'Portable Document Format' },
      description: 'Portable Document Format',
      filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai',
      length: 1,
      name: 'Chrome PDF Viewer',
    },
  ],
});

delete window.__playwright;
delete window.__pw_manual;
delete window.__PW_inspect;
"#;

/// Builds the init script for a context using `fingerprint`
pub fn stealth_script(fingerprint: &Fingerprint) -> String {
    let languages = serde_json::to_string(fingerprint.languages).unwrap_or_else(|_| "[]".into());

    format!(
        r#"{base}
Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
Object.defineProperty(navigator, 'vendor', {{ get: () => '{vendor}' }});
Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {concurrency} }});
Object.defineProperty(navigator, 'deviceMemory', {{ get: () => {memory} }});
Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
Object.defineProperty(navigator, 'language', {{ get: () => '{language}' }});
Object.defineProperty(screen, 'colorDepth', {{ get: () => {depth} }});
Object.defineProperty(screen, 'pixelDepth', {{ get: () => {depth} }});
"#,
        base = BASE_SCRIPT,
        platform = fingerprint.platform,
        vendor = fingerprint.vendor,
        concurrency = fingerprint.hardware_concurrency,
        memory = fingerprint.device_memory,
        languages = languages,
        language = fingerprint.language,
        depth = fingerprint.color_depth,
    )
}

/// Navigation headers matching `fingerprint`
///
/// Client hints are only sent for Chromium bundles.
pub fn stealth_headers(fingerprint: &Fingerprint) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Accept".to_string(), ACCEPT.to_string()),
        ("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()),
        ("DNT".to_string(), "1".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Site".to_string(), "none".to_string()),
        ("Sec-Fetch-User".to_string(), "?1".to_string()),
        ("Cache-Control".to_string(), "max-age=0".to_string()),
    ];

    if fingerprint.is_chromium() {
        let platform = if fingerprint.platform == "Win32" {
            "\"Windows\""
        } else {
            "\"macOS\""
        };
        headers.push((
            "sec-ch-ua".to_string(),
            r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#.to_string(),
        ));
        headers.push(("sec-ch-ua-mobile".to_string(), "?0".to_string()));
        headers.push(("sec-ch-ua-platform".to_string(), platform.to_string()));
    }

    headers
}

/// Headers for families crawled without the evasion toolkit
pub fn basic_headers() -> Vec<(String, String)> {
    vec![
        ("Accept".to_string(), ACCEPT.to_string()),
        ("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()),
    ]
}
