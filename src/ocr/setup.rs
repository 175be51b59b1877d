use anyhow::{anyhow, Result};
use log::{debug, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::OcrConfig;
use crate::paths;

const EXE_NAME: &str = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };

const COMMON_EXECUTABLES: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

const SYSTEM_TESSDATA: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Resolved Tesseract installation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract use its compiled-in default
    pub tessdata: Option<PathBuf>,
}

/// Returns the per-user directory for a private Tesseract copy
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("menu-scan")
        .join("tesseract")
}

fn on_path() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Finds the Tesseract executable: `TESSERACT_CMD`, the private copies
/// (user data dir, next to the executable), `PATH`, then common install
/// locations.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    if let Ok(cmd) = env::var("TESSERACT_CMD") {
        let p = PathBuf::from(cmd);
        if p.exists() {
            return Ok(p);
        }
        debug!("TESSERACT_CMD points to missing {}", p.display());
    }

    for dir in [get_tesseract_dir(), paths::get_tesseract_dir()] {
        let local_exe = dir.join(EXE_NAME);
        if local_exe.exists() {
            return Ok(local_exe);
        }
    }

    if on_path() {
        return Ok(PathBuf::from("tesseract"));
    }

    COMMON_EXECUTABLES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// First directory in `candidates` holding `<language>.traineddata`.
pub fn first_tessdata_dir<I>(candidates: I, language: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let file = format!("{}.traineddata", language);
    candidates.into_iter().find(|dir| dir.join(&file).exists())
}

/// Finds a tessdata directory with the requested language.
/// Returns `None` when Tesseract's own default should be used.
pub fn find_tessdata_dir(language: &str) -> Option<PathBuf> {
    let mut candidates = vec![
        get_tesseract_dir().join("tessdata"),
        paths::get_tesseract_dir().join("tessdata"),
    ];
    if let Ok(prefix) = env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }
    candidates.extend(SYSTEM_TESSDATA.iter().map(PathBuf::from));

    first_tessdata_dir(candidates, language)
}

/// Resolves executable and tessdata, honoring explicit config paths.
pub fn locate_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = match &config.executable {
        Some(path) if path.exists() => path.clone(),
        Some(path) => {
            return Err(anyhow!(
                "Configured Tesseract executable not found: {}",
                path.display()
            ))
        }
        None => find_tesseract_executable()?,
    };
    let tessdata = config
        .tessdata_dir
        .clone()
        .or_else(|| find_tessdata_dir(&config.language));

    info!(
        "Tesseract: {} (tessdata: {})",
        executable.display(),
        tessdata
            .as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "default".to_string())
    );

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_first_tessdata_dir_requires_language_file() {
        let empty = tempdir().unwrap();
        let with_chi = tempdir().unwrap();
        fs::write(with_chi.path().join("chi_sim.traineddata"), b"").unwrap();

        let candidates = vec![empty.path().to_path_buf(), with_chi.path().to_path_buf()];
        assert_eq!(
            first_tessdata_dir(candidates.clone(), "chi_sim"),
            Some(with_chi.path().to_path_buf())
        );
        assert_eq!(first_tessdata_dir(candidates, "eng"), None);
    }

    #[test]
    fn test_configured_paths_win() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join(EXE_NAME);
        fs::write(&exe, b"").unwrap();

        let config = OcrConfig {
            executable: Some(exe.clone()),
            tessdata_dir: Some(dir.path().to_path_buf()),
            ..OcrConfig::default()
        };
        let found = locate_tesseract(&config).unwrap();
        assert_eq!(found.executable, exe);
        assert_eq!(found.tessdata.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_missing_configured_executable_is_error() {
        let dir = tempdir().unwrap();
        let config = OcrConfig {
            executable: Some(dir.path().join("nope")),
            ..OcrConfig::default()
        };
        assert!(locate_tesseract(&config).is_err());
    }

    #[test]
    fn test_private_dir_is_per_user() {
        assert!(get_tesseract_dir().ends_with("menu-scan/tesseract"));
    }
}
