use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub display: DisplayConfig,
	pub playback: PlaybackConfig,
}

impl Config {
	pub fn validate(&mut self) {
		self.display.validate();
		self.playback.validate();
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
	/// Pixels around and between channel bands.
	pub padding: f32,
	pub default_scale: usize,
	pub max_scale: usize,
}

impl Default for DisplayConfig {
	fn default() -> Self {
		DisplayConfig {
			padding: 10.0,
			default_scale: 1,
			max_scale: 500,
		}
	}
}

impl DisplayConfig {
	pub fn validate(&mut self) {
		self.padding = if self.padding.is_finite() { self.padding.clamp(0.0, 100.0) } else { 10.0 };
		self.max_scale = self.max_scale.max(1);
		self.default_scale = self.default_scale.clamp(1, self.max_scale);
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
	/// 0-100
	pub volume: u8,
	pub waveform_refresh_ms: u64,
	pub timecode_refresh_ms: u64,
}

impl Default for PlaybackConfig {
	fn default() -> Self {
		PlaybackConfig {
			volume: 50,
			waveform_refresh_ms: 16,
			timecode_refresh_ms: 1000,
		}
	}
}

impl PlaybackConfig {
	pub fn validate(&mut self) {
		self.volume = self.volume.min(100);
		self.waveform_refresh_ms = self.waveform_refresh_ms.max(1);
		self.timecode_refresh_ms = self.timecode_refresh_ms.max(1);
	}

	pub fn waveform_refresh(&self) -> Duration {
		Duration::from_millis(self.waveform_refresh_ms)
	}

	pub fn timecode_refresh(&self) -> Duration {
		Duration::from_millis(self.timecode_refresh_ms)
	}
}



/// `<config dir>/wavcut/config.yaml`, or the working directory if there is no config dir.
pub fn default_config_path() -> PathBuf {
	dirs::config_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("wavcut")
		.join("config.yaml")
}


// Never fails: anything unusable falls back to the defaults.
pub fn load_config(path: &Path) -> Config {
	if !path.exists() {
		log::info!("No settings at {:?}, starting with defaults", path);
		return Config::default();
	}

	match read_config(path) {
		Ok(config) => {
			log::info!("Settings read from {:?}", path);
			config
		}

		Err(err) => {
			log::warn!("Ignoring settings file: {err:#}");
			Config::default()
		}
	}
}

fn read_config(path: &Path) -> Result<Config> {
	let contents = std::fs::read_to_string(path)
		.with_context(|| format!("Couldn't read {:?}", path))?;

	let mut config: Config = serde_yaml::from_str(&contents)
		.with_context(|| format!("{:?} is not valid settings YAML", path))?;

	config.validate();
	Ok(config)
}


pub fn save_config(config: &Config, path: &Path) -> Result<()> {
	if let Some(dir) = path.parent() {
		std::fs::create_dir_all(dir)
			.with_context(|| format!("Couldn't create {:?}", dir))?;
	}

	let yaml = serde_yaml::to_string(config)?;
	std::fs::write(path, yaml)
		.with_context(|| format!("Couldn't write {:?}", path))?;

	log::info!("Settings written to {:?}", path);
	Ok(())
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = Config::default();
		assert_eq!(config.display.padding, 10.0);
		assert_eq!(config.display.max_scale, 500);
		assert_eq!(config.playback.volume, 50);
		assert_eq!(config.playback.waveform_refresh(), Duration::from_millis(16));
	}

	#[test]
	fn test_validation_clamps_values() {
		let mut config = Config {
			display: DisplayConfig {
				padding: -4.0,
				default_scale: 900,
				max_scale: 0,
			},
			playback: PlaybackConfig {
				volume: 250,
				waveform_refresh_ms: 0,
				timecode_refresh_ms: 0,
			},
		};
		config.validate();

		assert_eq!(config.display.padding, 0.0);
		assert_eq!(config.display.max_scale, 1);
		assert_eq!(config.display.default_scale, 1);
		assert_eq!(config.playback.volume, 100);
		assert_eq!(config.playback.waveform_refresh_ms, 1);
		assert_eq!(config.playback.timecode_refresh_ms, 1);
	}

	#[test]
	fn test_partial_yaml_keeps_defaults() {
		let config: Config = serde_yaml::from_str("display:\n  max_scale: 64\n").unwrap();

		assert_eq!(config.display.max_scale, 64);
		assert_eq!(config.display.padding, 10.0);
		assert_eq!(config.playback, PlaybackConfig::default());
	}

	#[test]
	fn test_save_then_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("config.yaml");

		let mut config = Config::default();
		config.display.default_scale = 12;
		config.playback.volume = 80;

		save_config(&config, &path).unwrap();
		assert_eq!(load_config(&path), config);
	}

	#[test]
	fn test_invalid_yaml_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		std::fs::write(&path, "display: [not, a, map").unwrap();

		assert_eq!(load_config(&path), Config::default());
		assert_eq!(load_config(&dir.path().join("missing.yaml")), Config::default());
	}
}
