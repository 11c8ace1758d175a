use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{AxbridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserType {
    Chrome,
    Brave,
    Edge,
    Arc,
    Chromium,
}

impl BrowserType {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "Google Chrome",
            BrowserType::Brave => "Brave",
            BrowserType::Edge => "Microsoft Edge",
            BrowserType::Arc => "Arc",
            BrowserType::Chromium => "Chromium",
        }
    }

    /// Executable names looked up on `PATH` when no install path matches
    fn binary_names(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
            BrowserType::Brave => &["brave-browser", "brave"],
            BrowserType::Edge => &["microsoft-edge", "msedge"],
            BrowserType::Arc => &[],
            BrowserType::Chromium => &["chromium", "chromium-browser"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub browser_type: BrowserType,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl BrowserInfo {
    pub fn new(browser_type: BrowserType, path: PathBuf) -> Self {
        Self {
            browser_type,
            path,
            version: None,
        }
    }

    pub fn with_version(mut self) -> Self {
        self.version = detect_version(&self.path);
        self
    }
}

/// First browser found, in preference order
pub fn discover_browser() -> Result<BrowserInfo> {
    candidate_paths()
        .into_iter()
        .find_map(|(browser_type, path)| {
            path.exists().then(|| BrowserInfo::new(browser_type, path))
        })
        .or_else(find_on_path)
        .ok_or(AxbridgeError::BrowserNotFound)
}

/// Every installed browser, one per type, with its version
pub fn discover_all_browsers() -> Vec<BrowserInfo> {
    let mut found: Vec<BrowserInfo> = Vec::new();

    for (browser_type, path) in candidate_paths() {
        if found.iter().any(|b| b.browser_type == browser_type) || !path.exists() {
            continue;
        }
        found.push(BrowserInfo::new(browser_type, path).with_version());
    }

    found
}

fn find_on_path() -> Option<BrowserInfo> {
    PREFERENCE.iter().find_map(|browser_type| {
        browser_type
            .binary_names()
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| BrowserInfo::new(*browser_type, path))
    })
}

const PREFERENCE: [BrowserType; 5] = [
    BrowserType::Chrome,
    BrowserType::Brave,
    BrowserType::Edge,
    BrowserType::Arc,
    BrowserType::Chromium,
];

fn candidate_paths() -> Vec<(BrowserType, PathBuf)> {
    install_locations()
        .iter()
        .flat_map(|(browser_type, paths)| {
            paths
                .iter()
                .map(move |p| (*browser_type, PathBuf::from(shellexpand::tilde(p).to_string())))
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn install_locations() -> &'static [(BrowserType, &'static [&'static str])] {
    &[
        (
            BrowserType::Chrome,
            &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ],
        ),
        (
            BrowserType::Brave,
            &[
                "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
                "~/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            ],
        ),
        (
            BrowserType::Edge,
            &["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
        ),
        (BrowserType::Arc, &["/Applications/Arc.app/Contents/MacOS/Arc"]),
        (
            BrowserType::Chromium,
            &["/Applications/Chromium.app/Contents/MacOS/Chromium"],
        ),
    ]
}

#[cfg(target_os = "linux")]
fn install_locations() -> &'static [(BrowserType, &'static [&'static str])] {
    &[
        (
            BrowserType::Chrome,
            &[
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/opt/google/chrome/chrome",
            ],
        ),
        (BrowserType::Brave, &["/usr/bin/brave-browser", "/usr/bin/brave"]),
        (
            BrowserType::Edge,
            &["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
        ),
        (
            BrowserType::Chromium,
            &[
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ],
        ),
    ]
}

#[cfg(target_os = "windows")]
fn install_locations() -> &'static [(BrowserType, &'static [&'static str])] {
    &[
        (
            BrowserType::Chrome,
            &[
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ],
        ),
        (
            BrowserType::Brave,
            &[r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe"],
        ),
        (
            BrowserType::Edge,
            &[
                r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ],
        ),
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn install_locations() -> &'static [(BrowserType, &'static [&'static str])] {
    &[]
}

/// `chrome --version` prints e.g. "Google Chrome 120.0.6099.109"
fn detect_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }

    parse_version(&String::from_utf8_lossy(&output.stdout))
}

fn parse_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .rev()
        .find(|word| word.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_from_banner() {
        assert_eq!(
            parse_version("Google Chrome 120.0.6099.109 \n").as_deref(),
            Some("120.0.6099.109")
        );
        assert_eq!(
            parse_version("Chromium 119.0.6045.159 snap").as_deref(),
            Some("119.0.6045.159")
        );
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn candidate_paths_are_tilde_expanded() {
        assert!(candidate_paths()
            .iter()
            .all(|(_, path)| !path.to_string_lossy().starts_with('~')));
    }

    #[test]
    fn discovery_lists_each_browser_type_once() {
        let browsers = discover_all_browsers();
        for (i, browser) in browsers.iter().enumerate() {
            assert!(browsers[i + 1..]
                .iter()
                .all(|other| other.browser_type != browser.browser_type));
        }
    }
}
