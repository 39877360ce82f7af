// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Collects configuration variables from the process environment.
///
/// A `.env` file is applied first when requested; variables already present
/// in the process environment are never overwritten by it.
#[derive(Debug, Default)]
pub struct EnvLoader {
    dotenv: Option<DotenvSource>,
}

#[derive(Debug)]
enum DotenvSource {
    Discover,
    Path(PathBuf),
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for a `.env` file in the working directory and its parents.
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = Some(DotenvSource::Discover);
        self
    }

    /// Read a specific `.env` file, which must exist.
    pub fn with_dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Some(DotenvSource::Path(path.into()));
        self
    }

    /// Load all environment variables
    pub fn load(&self) -> Result<HashMap<String, String>> {
        match &self.dotenv {
            Some(DotenvSource::Discover) => {
                if let Err(e) = dotenvy::dotenv() {
                    if !e.not_found() {
                        return Err(ConfigError::LoadError(e.to_string()));
                    }
                    tracing::debug!("No .env file found");
                }
            }
            Some(DotenvSource::Path(path)) => {
                dotenvy::from_path(path).map_err(|e| {
                    ConfigError::LoadError(format!("{}: {}", path.display(), e))
                })?;
            }
            None => {}
        }

        Ok(env::vars().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_includes_path() {
        let vars = EnvLoader::new().load().unwrap();
        if std::env::var("PATH").is_ok() {
            assert!(vars.contains_key("PATH"));
        }
    }

    #[test]
    fn test_missing_dotenv_path_is_error() {
        let loader = EnvLoader::new().with_dotenv_path("/nonexistent/sprocket/.env");
        assert!(matches!(loader.load(), Err(ConfigError::LoadError(_))));
    }
}
