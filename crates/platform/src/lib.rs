//! Static registry of supported platforms.
//!
//! Each platform carries a capture strategy (real device-log subprocess or
//! synthetic generator) and a connectivity class. The registry is immutable
//! after construction; all mutable per-platform state lives with the capture
//! supervisor.

use serde::{Deserialize, Serialize};

/// How log lines are obtained for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Stream stdout of an external log command.
    DeviceLog {
        /// Log stream command, e.g. `adb` / `idevicesyslog`.
        command: String,
        args: Vec<String>,
        /// Optional device-side buffer clear invoked before streaming,
        /// e.g. `adb logcat -c`. Best-effort.
        clear: Option<(String, Vec<String>)>,
    },
    /// Generate one line per tick. Used for platforms without a device tool.
    Synthetic,
}

/// Grouping of platforms that share a device-presence detection mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityClass {
    /// Presence via `adb devices` (Android, Amazon Fire).
    AndroidLike,
    /// Presence via `idevice_id -l`.
    IosLike,
    /// Trivially present; no device required.
    AlwaysOn,
}

impl ConnectivityClass {
    /// Returns `true` if presence is determined by an external probe.
    pub fn is_probed(self) -> bool {
        self != ConnectivityClass::AlwaysOn
    }
}

/// A supported target platform. Immutable after registry construction.
#[derive(Debug, Clone)]
pub struct Platform {
    pub name: String,
    pub strategy: CaptureStrategy,
    pub class: ConnectivityClass,
}

impl Platform {
    /// Lowercase name used as the log directory component.
    pub fn log_dir_component(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Immutable list of supported platforms.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    platforms: Vec<Platform>,
}

impl PlatformRegistry {
    /// Builds a registry from an explicit platform list.
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self { platforms }
    }

    /// The built-in platform set: Android, iOS and Amazon stream real
    /// device logs; WebGL and Standalone use the synthetic generator.
    pub fn standard() -> Self {
        Self::standard_with_tools("adb", "idevicesyslog")
    }

    /// [`standard`](Self::standard) with explicit device tool paths, for
    /// installs where the tools are not on `PATH`.
    pub fn standard_with_tools(adb: &str, idevicesyslog: &str) -> Self {
        Self::new(vec![
            Platform {
                name: "Android".into(),
                strategy: adb_strategy(adb),
                class: ConnectivityClass::AndroidLike,
            },
            Platform {
                name: "iOS".into(),
                strategy: CaptureStrategy::DeviceLog {
                    command: idevicesyslog.into(),
                    args: vec![],
                    clear: None,
                },
                class: ConnectivityClass::IosLike,
            },
            Platform {
                name: "Amazon".into(),
                strategy: adb_strategy(adb),
                class: ConnectivityClass::AndroidLike,
            },
            Platform {
                name: "WebGL".into(),
                strategy: CaptureStrategy::Synthetic,
                class: ConnectivityClass::AlwaysOn,
            },
            Platform {
                name: "Standalone".into(),
                strategy: CaptureStrategy::Synthetic,
                class: ConnectivityClass::AlwaysOn,
            },
        ])
    }

    /// Looks up a platform by name (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// Iterates all platforms in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter()
    }

    /// All platform names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name.clone()).collect()
    }

    /// Connectivity classes that need a device probe, deduplicated.
    pub fn probed_classes(&self) -> Vec<ConnectivityClass> {
        let mut classes = Vec::new();
        for p in &self.platforms {
            if p.class.is_probed() && !classes.contains(&p.class) {
                classes.push(p.class);
            }
        }
        classes
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

fn adb_strategy(adb: &str) -> CaptureStrategy {
    CaptureStrategy::DeviceLog {
        command: adb.into(),
        args: vec!["logcat".into(), "-v".into(), "time".into()],
        clear: Some((adb.into(), vec!["logcat".into(), "-c".into()])),
    }
}
