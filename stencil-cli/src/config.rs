use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use clap::ArgMatches;
use serde::Deserialize;
use stencil::{Environment, FileSystemStore, Value};

/// The config file that is picked up from the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "stencil.toml";

/// Holds in-memory config state for the execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    templates: PathBuf,
    extension: String,
    format: String,
    newline: bool,
    fragment_marker: Option<String>,
    globals: BTreeMap<String, toml::Value>,
    #[serde(skip)]
    defines: BTreeMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates: PathBuf::from("."),
            extension: String::new(),
            format: "auto".to_string(),
            newline: true,
            fragment_marker: None,
            globals: Default::default(),
            defines: Default::default(),
        }
    }
}

impl Config {
    /// Loads the config from the explicit path or the default config file.
    pub fn load(explicit: Option<&Path>) -> Result<Config, Error> {
        match explicit {
            Some(path) => Config::load_from_toml(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Config::load_from_toml(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_toml(p: &Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(p)
            .with_context(|| format!("unable to read config file '{}'", p.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("invalid config file '{}'", p.display()))?;
        tracing::debug!(path = %p.display(), "loaded config file");
        Ok(cfg)
    }

    pub fn update_from_matches(&mut self, matches: &ArgMatches) -> Result<(), Error> {
        if let Some(templates) = matches.get_one::<PathBuf>("templates") {
            self.templates = templates.clone();
        }
        if let Some(extension) = matches.get_one::<String>("extension") {
            self.extension = extension.clone();
        }
        if let Some(format) = matches.get_one::<String>("format") {
            self.format = format.clone();
        }
        if matches.get_flag("no-newline") {
            self.newline = false;
        }
        self.add_defines_from_matches(matches)?;
        Ok(())
    }

    pub fn newline(&self) -> bool {
        self.newline
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn defines(&self) -> Value {
        Value::from(self.defines.clone())
    }

    /// The store templates are loaded from.
    pub fn store(&self) -> FileSystemStore {
        FileSystemStore::new(&self.templates).with_extension(&self.extension)
    }

    pub fn apply_to_env(&self, env: &mut Environment) {
        env.set_store(self.store());
        env.set_globals(&self.globals);
        if let Some(ref marker) = self.fragment_marker {
            let marker = marker.clone();
            env.set_fragment_error_formatter(move |err| {
                let mut detail = err.to_string();
                let mut source = std::error::Error::source(err);
                while let Some(cause) = source {
                    detail.push_str(": ");
                    detail.push_str(&cause.to_string());
                    source = cause.source();
                }
                marker.replace("{error}", &detail)
            });
        }
    }

    fn add_defines_from_matches(&mut self, matches: &ArgMatches) -> Result<(), Error> {
        if let Some(items) = matches.get_many::<String>("define") {
            for item in items {
                if let Some((key, raw_value)) = item.split_once(":=") {
                    self.defines
                        .insert(key.to_string(), interpret_raw_value(raw_value)?);
                } else if let Some((key, string_value)) = item.split_once('=') {
                    self.defines
                        .insert(key.to_string(), Value::from(string_value));
                } else {
                    self.defines.insert(item.to_string(), Value::from(true));
                }
            }
        }
        Ok(())
    }
}

fn interpret_raw_value(s: &str) -> Result<Value, Error> {
    let value: serde_json::Value = serde_json::from_str(s)
        .with_context(|| format!("invalid raw value '{}' (not valid JSON)", s))?;
    Ok(Value::from_serialize(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file() {
        let cfg: Config = toml::from_str(
            r#"
            templates = "views"
            extension = "tpl"
            fragment-marker = "<!-- {error} -->"

            [globals]
            site = "Example"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.templates, PathBuf::from("views"));
        assert_eq!(cfg.format(), "auto");
        assert!(cfg.newline());

        let mut env = Environment::new();
        cfg.apply_to_env(&mut env);
        assert_eq!(env.get_global("site"), Some(Value::from("Example")));
        assert_eq!(
            env.render_str("[{{include 'missing'}}]", ()).unwrap(),
            "[<!-- could not render fragment: include \"missing\": template not found: \
             template \"missing\" does not exist (looked in views/missing.tpl) -->]"
        );
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(interpret_raw_value("42").unwrap(), Value::from(42));
        assert!(interpret_raw_value("nope").is_err());
    }
}
