//! Log rotation cleanup tests
//!
//! - Old rotated files are removed
//! - Recent rotated files and the live log are kept
//! - Edge cases (empty directory, non-existent directory)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use taskcal::logging::{cleanup_old_logs, log_dir, server_log_path};
use tempfile::TempDir;

/// Create a log file whose modification time is `age_days` in the past
fn create_log_file(dir: &Path, name: &str, age_days: u64) -> PathBuf {
    fs::create_dir_all(dir).expect("Failed to create log directory");

    let file_path = dir.join(name);
    let mut file = File::create(&file_path).expect("Failed to create log file");
    writeln!(file, "Test log content").expect("Failed to write to log file");

    let mtime = SystemTime::now() - Duration::from_secs(age_days * 24 * 60 * 60);
    filetime::set_file_mtime(&file_path, filetime::FileTime::from_system_time(mtime))
        .expect("Failed to set mtime");

    file_path
}

#[test]
fn test_cleanup_removes_only_old_rotated_files() {
    let temp = TempDir::new().unwrap();
    let dir = log_dir(temp.path());

    let old = create_log_file(&dir, "server.log.2026-09-01", 45);
    let recent = create_log_file(&dir, "server.log.2026-10-14", 2);
    let live = create_log_file(&dir, "server.log", 30);
    let unrelated = create_log_file(&dir, "notes.txt", 30);

    cleanup_old_logs(&dir, 7).unwrap();

    assert!(!old.exists(), "old rotated log should be removed");
    assert!(recent.exists(), "recent rotated log should be kept");
    assert!(live.exists(), "the live log is never removed");
    assert!(unrelated.exists(), "non-log files are left alone");
}

#[test]
fn test_cleanup_respects_retention_period() {
    let temp = TempDir::new().unwrap();
    let dir = log_dir(temp.path());

    let ten_days = create_log_file(&dir, "server.log.2026-10-06", 10);

    cleanup_old_logs(&dir, 30).unwrap();
    assert!(ten_days.exists());

    cleanup_old_logs(&dir, 5).unwrap();
    assert!(!ten_days.exists());
}

#[test]
fn test_cleanup_missing_directory_is_ok() {
    let temp = TempDir::new().unwrap();
    assert!(cleanup_old_logs(&temp.path().join("nope"), 7).is_ok());
}

#[test]
fn test_cleanup_empty_directory_is_ok() {
    let temp = TempDir::new().unwrap();
    let dir = log_dir(temp.path());
    fs::create_dir_all(&dir).unwrap();
    assert!(cleanup_old_logs(&dir, 7).is_ok());
}

#[test]
fn test_server_log_path_lives_under_data_dir() {
    let temp = TempDir::new().unwrap();
    let path = server_log_path(temp.path());

    assert_eq!(path, temp.path().join("logs").join("server.log"));
    assert!(path.parent().unwrap().is_dir());
}
