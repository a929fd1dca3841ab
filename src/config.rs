// src/config.rs

//! Preferências do usuário, persistidas em RON.
//!
//! Carregadas uma vez na inicialização e gravadas de forma síncrona no
//! encerramento do interpretador.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::Palette;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Preferências inválidas em {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("Falha ao serializar preferências: {0}")]
    Serialize(#[from] ron::Error),
}

/// Preferências persistidas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fator de ampliação da janela (cada pixel AGI vira 2*scale x scale).
    pub window_scale: usize,
    pub sound_enabled: bool,
    /// Frequência do relógio interno, em Hz.
    pub tick_rate: u32,
    pub saved_games_root: PathBuf,
    pub last_game_id: Option<String>,
    pub palette: Palette,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_scale: 3,
            sound_enabled: true,
            tick_rate: 60,
            saved_games_root: PathBuf::from("saves"),
            last_game_id: None,
            palette: Palette::Ega,
        }
    }
}

impl Config {
    /// Lê as preferências de `path`. Arquivo inexistente resulta nos padrões.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path: &Path = path.as_ref();
        let text: String = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No preferences at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }
}

/// Preferências em uso, com o caminho onde devem ser gravadas.
#[derive(Debug)]
pub struct Preferences {
    config: Config,
    path: PathBuf,
    dirty: bool,
}

impl Preferences {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config,
            path,
            dirty: false,
        }
    }

    /// Carrega de `path` (ou usa os padrões).
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let config: Config = Config::load(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Altera as preferências e marca para gravação.
    pub fn update<F: FnOnce(&mut Config)>(&mut self, change: F) {
        let before: Config = self.config.clone();
        change(&mut self.config);
        if self.config != before {
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Grava as preferências se houver mudanças. Síncrono.
    pub fn flush(&mut self) -> Result<(), ConfigError> {
        if !self.dirty {
            return Ok(());
        }

        let text: String = self.config.to_ron()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.dirty = false;
        debug!("Preferences written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("agistrife_cfg_{}_{}", name, std::process::id()))
            .join("prefs.ron")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(temp_path("missing")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tick_rate, 60);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "(window_scale: 5, palette: Grayscale)").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.window_scale, 5);
        assert_eq!(config.palette, Palette::Grayscale);
        assert!(config.sound_enabled);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let path = temp_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "(window_scale: \"big\")").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_flush_only_when_dirty() {
        let path = temp_path("flush");
        let mut prefs = Preferences::load(path.clone()).unwrap();

        prefs.flush().unwrap();
        assert!(!path.exists());

        prefs.update(|c| c.last_game_id = Some("KQ1".into()));
        assert!(prefs.is_dirty());
        prefs.flush().unwrap();
        assert!(!prefs.is_dirty());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.last_game_id.as_deref(), Some("KQ1"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_update_without_change_stays_clean() {
        let mut prefs = Preferences::new(Config::default(), temp_path("clean"));
        prefs.update(|c| c.tick_rate = 60);
        assert!(!prefs.is_dirty());
    }
}
