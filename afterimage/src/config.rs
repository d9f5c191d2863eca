//! Afterimage configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::TuningConfig;

/// Profile used when none is named
pub const DEFAULT_PROFILE: &str = "reserved";

/// Main Afterimage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Name of the tuning profile to run
    pub profile: String,

    /// Router timing
    pub router: RouterConfig,

    /// Display timing and image
    pub display: DisplayConfig,

    /// Sensor polling
    pub sensors: SensorConfig,

    /// Channel capacities
    pub channels: ChannelConfig,

    /// Shutdown bounds
    pub shutdown: ShutdownConfig,

    /// Extra or overriding tuning profiles
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            profile: DEFAULT_PROFILE.to_string(),
            router: RouterConfig::default(),
            display: DisplayConfig::default(),
            sensors: SensorConfig::default(),
            channels: ChannelConfig::default(),
            shutdown: ShutdownConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks every profile's tuning bounds and the numeric settings that would
    /// otherwise stall the display or the routers.
    pub fn validate(&self) -> Result<()> {
        if self.router.cooldown_factor < 0.0 || !self.router.cooldown_factor.is_finite() {
            return Err(eyre::eyre!("router.cooldown-factor must be a non-negative number"));
        }
        if self.router.receive_timeout_ms == 0 {
            return Err(eyre::eyre!("router.receive-timeout-ms must be greater than 0"));
        }
        if self.display.reinforcement_divisor <= 0.0 || !self.display.reinforcement_divisor.is_finite() {
            return Err(eyre::eyre!("display.reinforcement-divisor must be greater than 0"));
        }
        if self.display.tick_interval_ms == 0 {
            return Err(eyre::eyre!("display.tick-interval-ms must be greater than 0"));
        }
        for (name, profile) in self.all_profiles() {
            profile.validate().context(format!("Invalid profile '{}'", name))?;
        }
        self.profile(&self.profile)?;
        Ok(())
    }

    /// Built-in profiles overlaid with the ones from the config file
    pub fn all_profiles(&self) -> BTreeMap<String, Profile> {
        let mut profiles = Profile::builtin();
        profiles.extend(self.profiles.clone());
        profiles
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<Profile> {
        let profiles = self.all_profiles();
        profiles.get(name).cloned().ok_or_else(|| {
            let known: Vec<_> = profiles.keys().map(String::as_str).collect();
            eyre::eyre!("Unknown profile '{}' (available: {})", name, known.join(", "))
        })
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .afterimage.yml
        let local_config = PathBuf::from(".afterimage.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/afterimage/afterimage.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".afterimage.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };
        candidates
            .into_iter()
            .find(|path| path.exists())
            .and_then(|path| Self::load_from_file(path).ok())
            .and_then(|config| config.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("afterimage").join("afterimage.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Router timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Receive window before tuning relaxes, in milliseconds
    #[serde(rename = "receive-timeout-ms")]
    pub receive_timeout_ms: u64,

    /// Share of the tuning duration to sleep after forwarding
    #[serde(rename = "cooldown-factor")]
    pub cooldown_factor: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 30_000,
            cooldown_factor: 0.9,
        }
    }
}

impl RouterConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Display timing and image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Image to degrade; a generated test pattern when unset
    #[serde(rename = "image-path", skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    /// Test pattern width in pixels
    #[serde(rename = "pattern-width")]
    pub pattern_width: u32,

    /// Test pattern height in pixels
    #[serde(rename = "pattern-height")]
    pub pattern_height: u32,

    /// Time between state machine ticks
    #[serde(rename = "tick-interval-ms")]
    pub tick_interval_ms: u64,

    /// Capacity of the internal frame channel
    #[serde(rename = "frame-buffer")]
    pub frame_buffer: usize,

    /// Divisor for requests that arrive while already restoring
    #[serde(rename = "reinforcement-divisor")]
    pub reinforcement_divisor: f64,

    /// How long the motor runs per stage pulse
    #[serde(rename = "pulse-duration-ms")]
    pub pulse_duration_ms: u64,

    /// Write PNG snapshots here instead of rendering headless
    #[serde(rename = "snapshot-dir", skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    /// Write every Nth frame
    #[serde(rename = "snapshot-every")]
    pub snapshot_every: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            image_path: None,
            pattern_width: 320,
            pattern_height: 240,
            tick_interval_ms: 50,
            frame_buffer: 4,
            reinforcement_divisor: 2.0,
            pulse_duration_ms: 2_000,
            snapshot_dir: None,
            snapshot_every: 20,
        }
    }
}

/// Sensor polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Time between distance and face readings
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Overrides the profile's ultrasonic threshold (centimetres)
    #[serde(rename = "ultrasonic-threshold", skip_serializing_if = "Option::is_none")]
    pub ultrasonic_threshold: Option<f64>,

    /// Seed for the simulated devices
    #[serde(rename = "simulation-seed")]
    pub simulation_seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            ultrasonic_threshold: None,
            simulation_seed: 7,
        }
    }
}

/// Channel capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of every incoming and outgoing channel
    #[serde(rename = "buffer-size")]
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// Shutdown bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long each task gets to stop
    #[serde(rename = "join-timeout-ms")]
    pub join_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { join_timeout_ms: 5_000 }
    }
}

/// Named set of tuning values for the whole installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display degrade rate per tick
    #[serde(rename = "display-level-step")]
    pub display_level_step: f64,

    /// Ultrasonic trigger distance in centimetres
    #[serde(rename = "ultrasonic-threshold")]
    pub ultrasonic_threshold: f64,

    pub face: TuningConfig,
    pub ultrasonic: TuningConfig,

    #[serde(default = "Profile::touch_tuning")]
    pub touch: TuningConfig,
}

impl Profile {
    /// The profiles the installation ships with
    pub fn builtin() -> BTreeMap<String, Profile> {
        BTreeMap::from([
            ("normal".to_string(), Self::normal()),
            ("open".to_string(), Self::open()),
            ("reserved".to_string(), Self::reserved()),
        ])
    }

    /// Generic defaults
    pub fn normal() -> Self {
        Self {
            display_level_step: 5.0,
            ultrasonic_threshold: 100.0,
            face: TuningConfig::default(),
            ultrasonic: TuningConfig::default(),
            touch: Self::touch_tuning(),
        }
    }

    /// Strong reactions for a busy, open space
    pub fn open() -> Self {
        Self {
            display_level_step: 5.0,
            ultrasonic_threshold: 300.0,
            face: tuning((100.0, 80.0, 100.0, 10.0), (20.0, 10.0, 30.0, 5.0)),
            ultrasonic: tuning((80.0, 50.0, 100.0, 10.0), (5.0, 1.0, 10.0, 1.0)),
            touch: Self::touch_tuning(),
        }
    }

    /// Gentle reactions for a quiet room
    pub fn reserved() -> Self {
        Self {
            display_level_step: 10.0,
            ultrasonic_threshold: 50.0,
            face: tuning((10.0, 0.0, 100.0, 4.0), (4.0, 1.0, 10.0, 1.0)),
            ultrasonic: tuning((0.1, 0.1, 1.0, 0.1), (0.5, 0.1, 1.0, 0.1)),
            touch: Self::touch_tuning(),
        }
    }

    /// Touch restores at full strength in every profile
    pub fn touch_tuning() -> TuningConfig {
        tuning((100.0, 100.0, 100.0, 0.0), (24.0, 20.0, 30.0, 2.0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.display_level_step <= 0.0 || !self.display_level_step.is_finite() {
            return Err(eyre::eyre!("display-level-step must be greater than 0"));
        }
        if self.ultrasonic_threshold <= 0.0 || !self.ultrasonic_threshold.is_finite() {
            return Err(eyre::eyre!("ultrasonic-threshold must be greater than 0"));
        }
        for (name, tuning) in [("face", &self.face), ("ultrasonic", &self.ultrasonic), ("touch", &self.touch)] {
            tuning.validate().map_err(|e| eyre::eyre!("{}: {}", name, e))?;
        }
        Ok(())
    }
}

/// (value, min, max, step) for strength, then for duration
fn tuning(strength: (f64, f64, f64, f64), duration: (f64, f64, f64, f64)) -> TuningConfig {
    TuningConfig {
        strength: strength.0,
        strength_min: strength.1,
        strength_max: strength.2,
        strength_step: strength.3,
        duration: duration.0,
        duration_min: duration.1,
        duration_max: duration.2,
        duration_step: duration.3,
        stage: None,
        should_sleep_after_send: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DisplayStage;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.profile, "reserved");
        assert_eq!(config.router.receive_timeout(), Duration::from_secs(30));
        assert_eq!(config.router.cooldown_factor, 0.9);
        assert_eq!(config.shutdown.join_timeout_ms, 5_000);
        assert_eq!(config.display.reinforcement_divisor, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builtin_profiles_are_valid() {
        for (name, profile) in Profile::builtin() {
            assert!(profile.validate().is_ok(), "profile {} invalid", name);
        }

        let reserved = Profile::reserved();
        assert_eq!(reserved.face.strength_step, 4.0);
        assert_eq!(reserved.ultrasonic_threshold, 50.0);
        assert_eq!(reserved.touch.strength, 100.0);
        assert_eq!(Profile::open().ultrasonic.strength, 80.0);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
profile: gallery

router:
  receive-timeout-ms: 10000
  cooldown-factor: 0.5

display:
  tick-interval-ms: 40
  reinforcement-divisor: 3

channels:
  buffer-size: 16

profiles:
  gallery:
    display-level-step: 8
    ultrasonic-threshold: 120
    face:
      strength: 10
      strength-max: 50
      strength-min: 0
      strength-step: 5
      duration: 4
      duration-max: 8
      duration-min: 1
      duration-step: 1
      stage: BLURRY
      should-sleep-after-send: true
    ultrasonic:
      strength: 1
      strength-max: 2
      strength-min: 0.5
      strength-step: 0.5
      duration: 1
      duration-max: 2
      duration-min: 0.5
      duration-step: 0.5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.router.receive_timeout_ms, 10_000);
        assert_eq!(config.display.tick_interval_ms, 40);
        assert_eq!(config.channels.buffer_size, 16);

        let gallery = config.profile("gallery").unwrap();
        assert_eq!(gallery.face.stage, Some(DisplayStage::Blurry));
        assert!(gallery.face.should_sleep_after_send);
        assert_eq!(gallery.touch, Profile::touch_tuning());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
display:
  pattern-width: 64
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.display.pattern_width, 64);
        assert_eq!(config.display.pattern_height, 240);
        assert_eq!(config.router.receive_timeout_ms, 30_000);
        assert_eq!(config.profile, "reserved");
    }

    #[test]
    fn test_unknown_profile() {
        let config = Config {
            profile: "disco".to_string(),
            ..Default::default()
        };
        let err = config.profile("disco").unwrap_err().to_string();
        assert!(err.contains("disco"));
        assert!(err.contains("reserved"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut config = Config::default();
        let mut broken = Profile::reserved();
        broken.face.strength = 500.0;
        config.profiles.insert("broken".to_string(), broken);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("afterimage.yml");
        fs::write(&path, "log-level: warn\nprofile: open\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.profile, "open");
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));

        let missing = dir.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_serialized_config_round_trips() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("receive-timeout-ms"));
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.profile, "reserved");
    }
}
