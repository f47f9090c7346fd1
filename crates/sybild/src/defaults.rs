use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_SYBIL_HOME: &str = ".sybil";

pub fn default_node_dir() -> Utf8PathBuf {
    home_dir()
        .as_deref()
        .and_then(Utf8Path::from_path)
        .map_or_else(Utf8PathBuf::default, |home| home.join(DEFAULT_SYBIL_HOME))
}
