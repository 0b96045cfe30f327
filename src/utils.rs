// utils.rs
// Description: Helpers for artifact paths, atomic file writes, random sources and log level
//              parsing.
// History:
// - 2026-02-01: Consolidate project into 6 files: main, layer, train, math, tokenizer, utils.
// - 2026-02-03: Binary artifacts with fixed suffixes instead of json checkpoints.
// Author: Marcus Schlieper

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::Level;

use crate::error::{NetworkError, Result};

pub fn entropy_rng() -> StdRng {
    StdRng::from_os_rng()
}

/// `<s_name><s_suffix>`. The suffix is always appended, so save and load agree.
pub fn artifact_path(s_name: &str, s_suffix: &str) -> Result<PathBuf> {
    if s_name.trim().is_empty() {
        return Err(NetworkError::InvalidArgument("artifact_name_empty".to_string()));
    }
    Ok(PathBuf::from(format!("{}{}", s_name, s_suffix)))
}

// Write to a sibling temp file, then rename over the target.
pub fn write_file_atomic(path: &Path, v_bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut s_tmp = path.as_os_str().to_os_string();
    s_tmp.push(".tmp");
    let tmp_path = PathBuf::from(s_tmp);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(v_bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Level names as accepted by NQ_LOG. Unknown or missing values fall back to INFO.
pub fn parse_log_level(opt_level: Option<&str>) -> Level {
    match opt_level.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("error") => Level::ERROR,
        Some("warn") => Level::WARN,
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    }
}
