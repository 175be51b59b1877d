use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the bundled tesseract directory: `<exe_dir>/tesseract/`
pub fn get_tesseract_dir() -> PathBuf {
    get_exe_dir().join("tesseract")
}

/// Returns the default config location: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}
