//! Config discovery and output file naming
//!
//! Config lookup order:
//! 1. `./uiharness.toml`
//! 2. The platform config dir (`~/.config/uiharness/uiharness.toml` on Linux)

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File name searched for in the working directory and config dir
pub const CONFIG_FILE_NAME: &str = "uiharness.toml";

const APP_NAME: &str = "uiharness";

/// Get the platform configuration directory
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Find the config file to use when none was given explicitly
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// `<reports_dir>/Report_<yyyy-MM-dd_HH-mm-ss>.html`
pub fn default_report_path(reports_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    reports_dir.join(format!("Report_{}.html", stamp))
}

/// Create each output directory if it doesn't exist
pub fn ensure_dirs<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> io::Result<()> {
    for dir in dirs {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// Sanitize a test name for use in file names
pub fn sanitize_file_stem(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Create `<dir>/<stem>.<ext>` without overwriting anything. When the name is
/// taken (two failures in the same second, or parallel writers) a numeric
/// suffix is added: `<stem>_2.<ext>`, `<stem>_3.<ext>`, ...
pub fn create_unique_file(dir: &Path, stem: &str, ext: &str) -> io::Result<(PathBuf, File)> {
    let mut n = 1u32;
    loop {
        let name = if n == 1 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, n, ext)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && n < 10_000 => n += 1,
            Err(e) => return Err(e),
        }
    }
}
