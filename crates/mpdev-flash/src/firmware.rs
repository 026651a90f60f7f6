//! Firmware image discovery and chip-id output parsing

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static MAC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)MAC:\s*([0-9a-f]{2}(?::[0-9a-f]{2}){5})").expect("valid MAC regex")
});

/// Most recently modified `*.bin` in `dir`, if any
pub fn find_latest_firmware(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_bin = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("bin"))
            .unwrap_or(false);
        if !is_bin || !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            newest = Some((modified, path));
        }
    }

    if let Some((_, path)) = &newest {
        log::debug!("Newest firmware in {}: {}", dir.display(), path.display());
    }
    Ok(newest.map(|(_, p)| p))
}

/// MAC address printed by chip identification, upper-cased
pub fn extract_mac(output: &str) -> Option<String> {
    MAC_LINE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// First line naming the chip (`Chip is ESP32-S3 ...`)
pub fn extract_chip(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("Chip is ").map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_newest_bin_wins() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (name, age) in [("old.bin", 60), ("new.bin", 1), ("notes.txt", 0)] {
            let path = dir.path().join(name);
            fs::write(&path, b"fw").unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(now - Duration::from_secs(age))
                .unwrap();
        }
        let found = find_latest_firmware(dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "new.bin");
    }

    #[test]
    fn test_no_firmware() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), b"").unwrap();
        assert!(find_latest_firmware(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_chip_id_output() {
        let out = "esptool.py v4.7.0\nChip is ESP32-S3 (QFN56) (revision v0.2)\n\
                   MAC: 7c:df:a1:0a:bb:cc\nChip ID: 0x0000\n";
        assert_eq!(extract_mac(out).as_deref(), Some("7C:DF:A1:0A:BB:CC"));
        assert_eq!(
            extract_chip(out).as_deref(),
            Some("ESP32-S3 (QFN56) (revision v0.2)")
        );
        assert_eq!(extract_mac("no mac here"), None);
    }
}
