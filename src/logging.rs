use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub const DEBUG_ENV: &str = "POKEDEX_TUI_DEBUG";
pub const DEBUG_LOG_ENV: &str = "POKEDEX_TUI_DEBUG_LOG";

fn debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var(DEBUG_ENV)
            .map(|val| env_flag(&val))
            .unwrap_or(false)
    })
}

fn env_flag(val: &str) -> bool {
    let trimmed = val.trim();
    !(trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("0")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("off"))
}

fn log_path() -> Option<PathBuf> {
    std::env::var(DEBUG_LOG_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("pokedex-tui").join("debug.log")))
}

fn debug_writer() -> Option<&'static Mutex<File>> {
    static WRITER: OnceCell<Option<Mutex<File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            let path = log_path()?;
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Mutex::new)
                .ok()
        })
        .as_ref()
}

/// Appends a line to the debug log when `POKEDEX_TUI_DEBUG` is set.
///
/// The terminal belongs to the UI, so nothing is ever printed to stderr here.
pub fn debug_log(message: impl AsRef<str>) {
    if !debug_enabled() {
        return;
    }
    if let Some(writer) = debug_writer() {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let _ = writeln!(writer.lock(), "[{millis}] {}", message.as_ref());
    }
}
