// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Anti-detection profile applied to every browser the pool launches.

use rand::Rng;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

/// Injected before any page script runs.
pub const INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthProfile {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
}

impl StealthProfile {
    /// Pick a common desktop user agent and viewport at random.
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        let ua = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];
        let (width, height) = VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())];
        Self {
            user_agent: ua.to_string(),
            viewport_width: width,
            viewport_height: height,
            locale: "en-US".to_string(),
        }
    }

    /// Command-line flags for the browser process.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            format!("--window-size={},{}", self.viewport_width, self.viewport_height),
            format!("--lang={}", self.locale),
            "--disable-blink-features=AutomationControlled".to_string(),
        ]
    }
}
