//! # chrome-auto
//!
//! Locate an installed Chrome or Chromium binary and launch it headless, so
//! that users of `headless_chrome` do not need to know where the browser
//! lives on each platform.
//!
//! ## How it works
//!
//! [`locate_chrome`] checks, in order (first hit wins):
//!
//! 1. An explicit path passed by the caller (e.g. from a config file).
//! 2. The `MD2PDF_CHROME_PATH` environment variable.
//! 3. Well-known executable names on `PATH` (`google-chrome`, `chromium`, …).
//! 4. Well-known install locations for the current platform.
//! 5. Chrome-for-Testing builds cached by puppeteer under
//!    `~/.cache/puppeteer/chrome/` (newest build first).
//!
//! Nothing is downloaded: if every step misses, [`ChromeAutoError::NotFound`]
//! carries install guidance for the caller to show.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_auto::{launch_from_path, locate_chrome, LaunchSettings};
//!
//! let path = locate_chrome(None).expect("Chrome unavailable");
//! let browser = launch_from_path(&path, &LaunchSettings::default()).expect("launch failed");
//! let tab = browser.new_tab().expect("tab");
//! ```
//!
//! ## Environment variable overrides
//!
//! - `MD2PDF_CHROME_PATH`: path to a Chrome/Chromium executable.
//! - `PUPPETEER_CACHE_DIR`: override the puppeteer cache root that is scanned
//!   for Chrome-for-Testing builds.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions};
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit Chrome executable.
pub const ENV_CHROME_PATH: &str = "MD2PDF_CHROME_PATH";

/// Environment variable puppeteer uses for its browser cache root.
pub const ENV_PUPPETEER_CACHE_DIR: &str = "PUPPETEER_CACHE_DIR";

/// Printed with [`ChromeAutoError::NotFound`].
pub const INSTALL_HINT: &str = "\
Install Google Chrome or Chromium, or point MD2PDF_CHROME_PATH at an existing
executable. A Chrome-for-Testing build can be fetched with:
  npx @puppeteer/browsers install chrome@stable";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-auto operations.
#[derive(Error, Debug)]
pub enum ChromeAutoError {
    /// Every search location missed.
    #[error("No Chrome or Chromium executable found ({searched} locations searched)\n{hint}", hint = INSTALL_HINT)]
    NotFound { searched: usize },

    /// The browser process could not be started or connected to.
    #[error("Failed to launch Chrome from '{path}': {reason}")]
    Launch { path: PathBuf, reason: String },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Executable names looked up on `PATH`.
    executable_names: &'static [&'static str],
    /// Absolute install locations.
    install_paths: &'static [&'static str],
    /// Binary path inside one puppeteer `chrome/<platform>-<version>/` directory.
    testing_binary: &'static str,
}

fn detect_platform() -> PlatformInfo {
    match std::env::consts::OS {
        "macos" => PlatformInfo {
            executable_names: &["google-chrome", "chromium", "chrome"],
            install_paths: &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            ],
            testing_binary: if std::env::consts::ARCH == "aarch64" {
                "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"
            } else {
                "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"
            },
        },
        "windows" => PlatformInfo {
            executable_names: &["chrome.exe", "msedge.exe"],
            install_paths: &[
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files\Chromium\Application\chrome.exe",
            ],
            testing_binary: "chrome-win64/chrome.exe",
        },
        _ => PlatformInfo {
            executable_names: &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
                "chrome",
            ],
            install_paths: &[
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
                "/opt/google/chrome/chrome",
            ],
            testing_binary: "chrome-linux64/chrome",
        },
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the directory puppeteer stores Chrome-for-Testing builds in.
///
/// Default: `~/.cache/puppeteer/chrome/`. Override the root with
/// `PUPPETEER_CACHE_DIR`.
pub fn puppeteer_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var(ENV_PUPPETEER_CACHE_DIR) {
        return PathBuf::from(override_dir).join("chrome");
    }

    let base = dirs::home_dir()
        .map(|h| h.join(".cache"))
        .unwrap_or_else(std::env::temp_dir);

    base.join("puppeteer").join("chrome")
}

/// Finds the newest Chrome-for-Testing binary below `cache_dir`.
///
/// Build directories are named `<platform>-<version>`; sorting names in
/// descending order puts the newest version first for equal platforms.
pub fn find_cached_chrome(cache_dir: &Path) -> Option<PathBuf> {
    let info = detect_platform();
    let mut builds: Vec<PathBuf> = std::fs::read_dir(cache_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    builds.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    builds
        .into_iter()
        .map(|dir| dir.join(info.testing_binary))
        .find(|p| p.is_file())
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if a Chrome executable can be found without launching it.
pub fn is_chrome_available(configured: Option<&Path>) -> bool {
    locate_chrome(configured).is_ok()
}

/// Lists every location [`locate_chrome`] would probe, in order.
///
/// `PATH` lookups are reported by executable name.
pub fn candidate_paths(configured: Option<&Path>) -> Vec<PathBuf> {
    let info = detect_platform();
    let mut out = Vec::new();
    if let Some(p) = configured {
        out.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(ENV_CHROME_PATH) {
        out.push(PathBuf::from(p));
    }
    out.extend(info.executable_names.iter().map(PathBuf::from));
    out.extend(info.install_paths.iter().map(PathBuf::from));
    out.push(puppeteer_cache_dir().join("*").join(info.testing_binary));
    out
}

/// Resolves the Chrome executable to launch.
///
/// - If `configured` is given and exists, it is used.
/// - Otherwise `MD2PDF_CHROME_PATH`, `PATH`, install locations and the
///   puppeteer cache are tried in that order.
///
/// A configured path that does not exist is reported on stderr and the
/// search continues with the remaining locations.
pub fn locate_chrome(configured: Option<&Path>) -> Result<PathBuf, ChromeAutoError> {
    let info = detect_platform();

    // 1. Caller-supplied path.
    if let Some(p) = configured {
        if p.is_file() {
            return Ok(p.to_path_buf());
        }
        eprintln!(
            "chrome-auto: configured executable '{}' not found; searching …",
            p.display()
        );
    }

    // 2. Environment variable override.
    if let Ok(env_path) = std::env::var(ENV_CHROME_PATH) {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        eprintln!(
            "chrome-auto: {ENV_CHROME_PATH} '{}' not found; searching …",
            p.display()
        );
    }

    // 3. PATH.
    for name in info.executable_names {
        if let Ok(p) = which::which(name) {
            return Ok(p);
        }
    }

    // 4. Install locations.
    if let Some(p) = info
        .install_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
    {
        return Ok(p);
    }

    // 5. Puppeteer cache.
    if let Some(p) = find_cached_chrome(&puppeteer_cache_dir()) {
        return Ok(p);
    }

    Err(ChromeAutoError::NotFound {
        searched: candidate_paths(configured).len(),
    })
}

/// Launch-time knobs forwarded to `headless_chrome`.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// UI language passed as `--lang=`.
    pub lang: String,
    /// How long the browser may sit idle between CDP calls before
    /// `headless_chrome` gives up on it.
    pub idle_timeout: Duration,
    /// Initial window size in CSS pixels.
    pub window_size: Option<(u32, u32)>,
    /// Additional raw command-line switches.
    pub extra_args: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            idle_timeout: Duration::from_secs(30),
            window_size: Some((800, 600)),
            extra_args: Vec::new(),
        }
    }
}

/// Launches a headless browser from an explicit `path`.
///
/// The sandbox is always disabled (`--no-sandbox`,
/// `--disable-setuid-sandbox`) so the browser starts inside containers and
/// under root.
pub fn launch_from_path(path: &Path, settings: &LaunchSettings) -> Result<Browser, ChromeAutoError> {
    let launch_err = |reason: String| ChromeAutoError::Launch {
        path: path.to_path_buf(),
        reason,
    };

    let lang = OsString::from(format!("--lang={}", settings.lang));
    let extra: Vec<OsString> = settings.extra_args.iter().map(OsString::from).collect();

    let mut args: Vec<&OsStr> = vec![lang.as_os_str(), OsStr::new("--disable-setuid-sandbox")];
    args.extend(extra.iter().map(|a| a.as_os_str()));

    let options = LaunchOptions::default_builder()
        .path(Some(path.to_path_buf()))
        .headless(true)
        .sandbox(false)
        .window_size(settings.window_size)
        .idle_browser_timeout(settings.idle_timeout)
        .args(args)
        .build()
        .map_err(|e| launch_err(e.to_string()))?;

    Browser::new(options).map_err(|e| launch_err(format!("{e:#}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
