//! Application configuration

use std::env;
use std::fmt;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone)]
pub struct AppConfig {
    /// Port for the HTTP API
    pub port: u16,

    /// Directory holding one sub-folder of passthrough files per solution
    pub solutions_dir: PathBuf,

    /// Docker proxy host used when a single-model request omits it
    pub proxy_host: Option<String>,

    /// Docker proxy port used when a single-model request omits it
    pub proxy_port: Option<String>,

    /// Shared data service credentials, embedded into environment descriptors
    pub common_data_user: Option<String>,
    pub common_data_url: Option<String>,
    pub common_data_password: Option<String>,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("KUBE_BUNDLER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),

            solutions_dir: env::var("KUBE_BUNDLER_SOLUTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./solutions")),

            proxy_host: optional("KUBE_BUNDLER_PROXY_HOST"),
            proxy_port: optional("KUBE_BUNDLER_PROXY_PORT"),

            common_data_user: optional("KUBE_BUNDLER_COMMON_DATA_USER"),
            common_data_url: optional("KUBE_BUNDLER_COMMON_DATA_URL"),
            common_data_password: optional("KUBE_BUNDLER_COMMON_DATA_PASSWORD"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("solutions_dir", &self.solutions_dir)
            .field("proxy_host", &self.proxy_host)
            .field("proxy_port", &self.proxy_port)
            .field("common_data_user", &self.common_data_user)
            .field("common_data_url", &self.common_data_url)
            .field("common_data_password", &self.common_data_password.as_ref().map(|_| "***"))
            .finish()
    }
}
