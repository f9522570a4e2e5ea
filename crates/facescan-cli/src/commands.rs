//! Non-scanning modes: stats, list, cleanup, export.

use anyhow::{Context, Result};
use chrono::Local;
use facescan_core::scan_log::default_export_name;
use facescan_core::{DataLayout, MissingFilePolicy, ScanLog};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn stats(log: &ScanLog, layout: &DataLayout, out: &mut impl Write) -> Result<()> {
    let stats = log.stats();
    writeln!(out, "Scanning Statistics:")?;
    writeln!(out, "  total_scans: {}", stats.total_scans)?;
    writeln!(out, "  unique_faces: {}", stats.unique_faces)?;
    writeln!(out, "  scanned_faces_dir: {}", layout.faces_dir().display())?;
    writeln!(out, "  log_file: {}", log.path().display())?;
    Ok(())
}

pub fn list_faces(log: &ScanLog, out: &mut impl Write) -> Result<()> {
    let scans = log.all();
    writeln!(out, "Found {} scanned faces:", scans.len())?;
    for scan in scans {
        writeln!(out, "  {} - {}", scan.face_id, scan.timestamp)?;
    }
    Ok(())
}

pub fn cleanup(
    log: &mut ScanLog,
    days: u64,
    policy: MissingFilePolicy,
    out: &mut impl Write,
) -> Result<usize> {
    let removed = log
        .cleanup(days, policy)
        .with_context(|| format!("cleanup of faces older than {days} days failed"))?;
    if removed > 0 {
        writeln!(out, "Cleaned up {removed} old face images")?;
    } else {
        writeln!(out, "No face images older than {days} days")?;
    }
    Ok(removed)
}

pub fn export(log: &ScanLog, path: Option<&Path>, out: &mut impl Write) -> Result<PathBuf> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(default_export_name(Local::now())));
    log.export(&path)
        .with_context(|| format!("failed to export scan log to {}", path.display()))?;
    writeln!(out, "Scan log exported to {}", path.display())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facescan_core::ScanEvent;
    use tempfile::TempDir;

    fn populated() -> (TempDir, DataLayout, ScanLog) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        layout.ensure().unwrap();
        let mut log = ScanLog::open_or_empty(layout.log_file());
        for (n, id) in ["face_aaaaaaaa_1", "face_aaaaaaaa_1", "face_bbbbbbbb_2"]
            .iter()
            .enumerate()
        {
            let path = layout.faces_dir().join(format!("{id}.jpg"));
            std::fs::write(&path, b"jpeg").unwrap();
            log.append(ScanEvent::new(*id, &path, None, n as u64 + 1)).unwrap();
        }
        (tmp, layout, log)
    }

    #[test]
    fn test_stats_output() {
        let (_tmp, layout, log) = populated();
        let mut out = Vec::new();
        stats(&log, &layout, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Scanning Statistics:\n"));
        assert!(text.contains("  total_scans: 3\n"));
        assert!(text.contains("  unique_faces: 2\n"));
        assert!(text.contains("scan_log.json"));
    }

    #[test]
    fn test_list_faces_output() {
        let (_tmp, _layout, log) = populated();
        let mut out = Vec::new();
        list_faces(&log, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Found 3 scanned faces:");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("  face_bbbbbbbb_2 - "));
    }

    #[test]
    fn test_cleanup_reports_nothing_removed() {
        let (_tmp, _layout, mut log) = populated();
        let mut out = Vec::new();
        let removed = cleanup(&mut log, 30, MissingFilePolicy::Keep, &mut out).unwrap();

        assert_eq!(removed, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "No face images older than 30 days\n");
    }

    #[test]
    fn test_export_to_explicit_path() {
        let (tmp, _layout, log) = populated();
        let target = tmp.path().join("out.csv");
        let mut out = Vec::new();

        let written = export(&log, Some(&target), &mut out).unwrap();
        assert_eq!(written, target);
        let csv = std::fs::read_to_string(&target).unwrap();
        assert!(csv.starts_with("face_id,timestamp,filepath,confidence\n"));
        assert_eq!(csv.lines().count(), 4);
    }
}
