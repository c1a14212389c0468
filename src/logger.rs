//! Session log for the editor.  `log_info!` / `log_warn!` / `log_err!` do
//! nothing until the host calls [`init`] or [`init_at`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static PANIC_HOOK: Once = Once::new();

pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: &str, msg: &str) {
    if LOG_FILE.get().is_none() {
        return;
    }
    write_line(&format_line(&timestamp(), level, msg));
}

/// `[HH:MM:SS] [LEVEL] message`
pub(crate) fn format_line(ts: &str, level: &str, msg: &str) -> String {
    format!("[{}] [{}] {}", ts, level, msg)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*));
    };
}

/// `FusionEditor/fusion_editor.log` under the platform data directory.
pub fn init() {
    let path = default_log_path();
    if let Err(e) = init_at(&path) {
        eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
    }
}

/// Truncates `path`.  The first successful call wins.
pub fn init_at(path: &Path) -> std::io::Result<()> {
    if LOG_FILE.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    let _ = LOG_PATH.set(path.to_path_buf());
    let _ = LOG_FILE.set(Mutex::new(file));

    let opened = unix_secs().map_or_else(|| "at unknown time".to_string(), |s| format!("at unix {}", s));
    write_line(&format!("=== Fusion editor log opened {} ===", opened));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    // Chain to the host's hook.
    PANIC_HOOK.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            write_line(&format_line(&timestamp(), "PANIC", &info.to_string()));
            prev(info);
        }));
    });
    Ok(())
}

fn default_log_path() -> PathBuf {
    data_dir().join("FusionEditor").join("fusion_editor.log")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_secs() -> Option<u64> {
    SystemTime::now().duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// UTC `HH:MM:SS`.
fn timestamp() -> String {
    let Some(secs) = unix_secs() else { return "??:??:??".to_string() };
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, day % 3600 / 60, day % 60)
}
