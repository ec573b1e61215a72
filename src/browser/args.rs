//! Launch arguments for a headless browser slot.

use std::path::{Path, PathBuf};

use super::BrowserConfig;

const BASE_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=site-per-process,Translate,BlinkGenPropertyTrees",
    "--disable-font-subpixel-positioning",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--enable-automation",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--font-render-hinting=none",
    "--force-color-profile=srgb",
    "--headless",
    "--hide-scrollbars",
    "--metrics-recording-only",
    "--mute-audio",
    "--no-default-browser-check",
    "--no-first-run",
    "--no-sandbox",
    "--password-store=basic",
    "--safebrowsing-disable-auto-update",
    "--use-mock-keychain",
];

/// Remote debugging port of a slot: `base_port + id`, `base_port - 1` for the warm-up slot.
pub fn debug_port(base_port: u16, id: i32) -> u16 {
    if id < 0 {
        base_port.saturating_sub(1)
    } else {
        let offset = u16::try_from(id).unwrap_or(u16::MAX);
        base_port.saturating_add(offset)
    }
}

/// Private profile directory of a slot.
pub fn data_dir(root: &Path, id: i32) -> PathBuf {
    if id < 0 {
        root.join("browser-init")
    } else {
        root.join(format!("browser-{id}"))
    }
}

/// Full, deterministic argument list for slot `id`, ending with the start page.
pub fn launch_args(config: &BrowserConfig, id: i32) -> Vec<String> {
    let mut args: Vec<String> = BASE_ARGS.iter().map(|a| (*a).to_string()).collect();
    args.push(format!(
        "--remote-debugging-port={}",
        debug_port(config.base_port, id)
    ));
    args.push(format!(
        "--user-data-dir={}",
        data_dir(&config.data_dir, id).display()
    ));
    args.push("about:blank".to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WARMUP_SLOT;

    #[test]
    fn ports_and_dirs_follow_slot_id() {
        assert_eq!(debug_port(5050, 0), 5050);
        assert_eq!(debug_port(5050, 2), 5052);
        assert_eq!(debug_port(5050, WARMUP_SLOT), 5049);
        assert_eq!(data_dir(Path::new("/tmp"), 1), PathBuf::from("/tmp/browser-1"));
        assert_eq!(
            data_dir(Path::new("/tmp"), WARMUP_SLOT),
            PathBuf::from("/tmp/browser-init")
        );
    }

    #[test]
    fn args_are_deterministic_and_end_with_blank_page() {
        let cfg = BrowserConfig::default();
        let a = launch_args(&cfg, 1);
        assert_eq!(a, launch_args(&cfg, 1));
        assert_eq!(a.last().map(String::as_str), Some("about:blank"));
        assert!(a.contains(&"--headless".to_string()));
        assert!(a.contains(&"--remote-debugging-port=5051".to_string()));
        assert!(a.contains(&"--user-data-dir=/tmp/browser-1".to_string()));
    }
}
