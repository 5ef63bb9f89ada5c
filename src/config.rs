#![cfg(feature = "web")]
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server settings, read from the command line or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "website")]
#[command(author, version, about = "Instant analysis server: upload a table, get charts", long_about = None)]
pub struct Config {
    /// Folder where uploaded files are kept
    #[arg(long, env = "DATA_FOLDER", default_value = "./data")]
    pub data_folder: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Upper bound on suggestions returned per file
    #[arg(long, env = "MAX_SUGGESTIONS", default_value_t = 6)]
    pub max_suggestions: usize,

    /// Key for a language-model suggestion engine
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_folder: PathBuf::from("./data"),
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_upload_bytes: 20 * 1024 * 1024,
            max_suggestions: 6,
            openai_api_key: None,
        }
    }
}
