//! `config.txt`: plain `key:value` lines next to the executable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReconError, ReconResult};

pub const CONFIG_FILE_NAME: &str = "config.txt";

const HOTEL_NAME_KEY: &str = "hotelname";
const SHEET_TITLE_KEY: &str = "Sheet_tittle";

/// Written on first run. The cell-address keys are read by the sibling
/// confirmation-letter tool and ignored here.
pub const DEFAULT_CONFIG: &str = "B2:海口索菲特大酒店
D2:海南省海口市龙华区滨海大道105号
E2:符小瑜 0898-31289999
B32:abbyfu@hksft.com
hotelname:海口索菲特大酒店
Sheet_tittle:供货明细表";

/// Hotel name and report title shown above every statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleBlock {
    pub hotel_name: String,
    pub sheet_title: String,
}

pub fn parse_config(text: &str) -> TitleBlock {
    let mut title = TitleBlock::default();
    for line in text.trim_start_matches('\u{feff}').lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            HOTEL_NAME_KEY => title.hotel_name = value.trim().to_string(),
            SHEET_TITLE_KEY => title.sheet_title = value.trim().to_string(),
            _ => {}
        }
    }
    title
}

/// `None` when the file does not exist.
pub fn load_title_block(path: &Path) -> ReconResult<Option<TitleBlock>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| ReconError::io(path, e))?;
    Ok(Some(parse_config(&text)))
}

/// Directory of the running executable, or the working directory.
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_path() -> PathBuf {
    base_dir().join(CONFIG_FILE_NAME)
}

/// Create the default config file if it is missing. Returns true when created.
pub fn ensure_default_config(path: &Path) -> ReconResult<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ReconError::io(parent, e))?;
    }
    fs::write(path, DEFAULT_CONFIG).map_err(|e| ReconError::io(path, e))?;
    tracing::info!(path = %path.display(), "created default config");
    Ok(true)
}
