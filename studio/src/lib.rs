use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, ensure, eyre},
};
use flux_engine::{
    BflClient, Controller, Model,
    api::bfl::DEFAULT_BASE_URL,
    controller::{DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub mod cli;
pub mod render;

pub const API_KEY_VAR: &str = "API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: Model,
    pub base_url: String,
    pub poll_interval_secs: u64,
    /// `None` polls until the task finishes
    pub max_polls: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: Model::default(),
            base_url: DEFAULT_BASE_URL.into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_polls: Some(DEFAULT_MAX_POLLS),
        }
    }
}

impl Config {
    pub fn client(&self, model: Option<Model>) -> BflClient {
        BflClient::new(model.unwrap_or(self.model)).with_base_url(&self.base_url)
    }

    pub fn controller(&self, model: Option<Model>) -> Controller<BflClient> {
        Controller::new(self.client(model))
            .with_poll_interval(self.poll_interval())
            .with_max_polls(self.max_polls())
    }

    /// At least one second, so a zero in the file can't hammer the service.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// `Some(0)` means no bound, same as `configure --max-polls 0`.
    pub fn max_polls(&self) -> Option<u32> {
        self.max_polls.filter(|&max| max > 0)
    }
}

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn save_ron_file<T: Serialize>(path: &Path, x: &T) -> Result<()> {
    let src = ron::ser::to_string_pretty(x, ron::ser::PrettyConfig::default())?;
    Ok(fs::write(path, src)?)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join("image_studio.ron"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        Ok(Config::default())
    } else {
        load_ron_file(path).wrap_err_with(|| format!("Couldn't read config {}", path.display()))
    }
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    save_ron_file(path, cfg)
}

/// Loads `.env` into the environment, from `path` or the usual lookup when `None`.
/// `Ok(None)` if there is no such file.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).wrap_err("Couldn't load .env"),
    }
}

/// Picks the first non-blank key from the flag, the environment and the config file, and
/// falls back to asking the user.
pub fn resolve_api_key(
    flag: Option<String>,
    env: Option<String>,
    cfg: &Config,
    prompt: impl FnOnce() -> Result<String>,
) -> Result<String> {
    let key = match [flag, env, cfg.api_key.clone()]
        .into_iter()
        .flatten()
        .map(|k| k.trim().to_string())
        .find(|k| !k.is_empty())
    {
        Some(key) => key,
        None => prompt()?.trim().to_string(),
    };

    ensure!(
        !key.is_empty(),
        "Please provide an API key to generate images."
    );
    Ok(key)
}

#[cfg(test)]
mod test {
    use color_eyre::eyre::bail;

    use super::*;

    #[test]
    fn missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("nope.ron")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.ron");
        fs::write(&path, "(model: Flux2Pro, max_polls: None)").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model, Model::Flux2Pro);
        assert_eq!(cfg.max_polls, None);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.poll_interval_secs, 5);
    }

    #[test]
    fn zero_poll_settings_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.ron");
        fs::write(&path, "(poll_interval_secs: 0, max_polls: Some(0))").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.max_polls(), None);

        let cfg = Config {
            poll_interval_secs: 7,
            max_polls: Some(3),
            ..Default::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(7));
        assert_eq!(cfg.max_polls(), Some(3));
    }

    #[test]
    fn saved_config_lands_in_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.ron");
        let cfg = Config {
            api_key: Some("secret".into()),
            ..Default::default()
        };

        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn env_file_missing_or_broken() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(".env");
        assert_eq!(load_env_file(Some(&missing)).unwrap(), None);

        let broken = dir.path().join("broken.env");
        fs::write(&broken, "IMAGE_STUDIO_TEST_BROKEN='unterminated\n").unwrap();
        assert!(load_env_file(Some(&broken)).is_err());

        let good = dir.path().join("good.env");
        fs::write(&good, "IMAGE_STUDIO_TEST_GOOD=yes\n").unwrap();
        assert_eq!(load_env_file(Some(&good)).unwrap(), Some(good.clone()));
        assert_eq!(std::env::var("IMAGE_STUDIO_TEST_GOOD").unwrap(), "yes");
    }

    #[test]
    fn api_key_precedence() {
        let cfg = Config {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        let no_prompt = || -> Result<String> { bail!("should not prompt") };

        let key = resolve_api_key(Some("flag".into()), Some("env".into()), &cfg, no_prompt);
        assert_eq!(key.unwrap(), "flag");

        let key = resolve_api_key(None, Some("env".into()), &cfg, no_prompt);
        assert_eq!(key.unwrap(), "env");

        let key = resolve_api_key(Some("  ".into()), None, &cfg, no_prompt);
        assert_eq!(key.unwrap(), "from-config");
    }

    #[test]
    fn api_key_falls_back_to_prompt() {
        let cfg = Config::default();

        let key = resolve_api_key(None, None, &cfg, || Ok("typed\n".into()));
        assert_eq!(key.unwrap(), "typed");

        assert!(resolve_api_key(None, Some("".into()), &cfg, || Ok("\n".into())).is_err());
    }
}
