use sphgrid_core::{GpuParticle, POINT_FILE_HEADER};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StorageError;

/// Which particles a "save points" action writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSet {
    All,
    Surface,
}

impl PointSet {
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::All => "points",
            Self::Surface => "surface",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportFilter {
    All,
    /// Drop particles whose density is below `min_density`
    MinDensity(f32),
}

impl ExportFilter {
    #[inline]
    pub fn keeps(&self, p: &GpuParticle) -> bool {
        match *self {
            Self::All => true,
            Self::MinDensity(min) => p.density >= min,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub vertex_count: usize,
}

/// Write the point file: header token, `<count> 0 0`, then `x y z` per kept
/// particle. Returns the number of vertex lines written, which always equals
/// the count in the header.
pub fn write_points<W: Write>(
    mut writer: W,
    particles: &[GpuParticle],
    filter: ExportFilter,
) -> io::Result<usize> {
    let count = particles.iter().filter(|p| filter.keeps(p)).count();
    writeln!(writer, "{POINT_FILE_HEADER}")?;
    writeln!(writer, "{count} 0 0")?;

    let mut written = 0;
    for p in particles.iter().filter(|p| filter.keeps(p)) {
        let [x, y, z] = p.position;
        writeln!(writer, "{x} {y} {z}")?;
        written += 1;
    }
    writer.flush()?;
    debug_assert_eq!(written, count);
    Ok(written)
}

pub fn save_points(
    path: &Path,
    particles: &[GpuParticle],
    filter: ExportFilter,
) -> Result<usize, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| StorageError::io(path, e))?;
    write_points(BufWriter::new(file), particles, filter).map_err(|e| StorageError::io(path, e))
}

/// Write a uniquely named point file into `dir`.
pub fn export_to_dir(
    dir: &Path,
    set: PointSet,
    particles: &[GpuParticle],
    filter: ExportFilter,
) -> Result<ExportSummary, StorageError> {
    let path = dir.join(format!("{}-{}.off", set.file_prefix(), Uuid::new_v4()));
    let vertex_count = save_points(&path, particles, filter)?;
    Ok(ExportSummary { path, vertex_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_particles() -> Vec<GpuParticle> {
        (0..10)
            .map(|i| {
                let density = if i % 3 == 0 && i > 0 { 10.0 } else { 80.0 };
                GpuParticle::with_density([i as f32, 0.5, -1.25], density)
            })
            .collect()
    }

    #[test]
    fn test_surface_export_skips_low_density() {
        let particles = ten_particles();
        assert_eq!(particles.iter().filter(|p| p.density < 50.0).count(), 3);

        let mut out = Vec::new();
        let written = write_points(&mut out, &particles, ExportFilter::MinDensity(50.0)).unwrap();
        assert_eq!(written, 7);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "COFF");
        assert_eq!(lines[1], "7 0 0");
        assert_eq!(lines.len(), 2 + 7);
        assert_eq!(lines[2], "0 0.5 -1.25");
        assert!(!lines.contains(&"3 0.5 -1.25"));
    }

    #[test]
    fn test_full_export_writes_every_particle() {
        let particles = ten_particles();
        let mut out = Vec::new();
        assert_eq!(write_points(&mut out, &particles, ExportFilter::All).unwrap(), 10);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().nth(1), Some("10 0 0"));
        assert_eq!(text.lines().count(), 12);
    }

    #[test]
    fn test_empty_export() {
        let mut out = Vec::new();
        assert_eq!(write_points(&mut out, &[], ExportFilter::All).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "COFF\n0 0 0\n");
    }

    #[test]
    fn test_export_to_dir_and_unwritable_path() {
        let dir = std::env::temp_dir().join(format!("sphgrid-export-{}", Uuid::new_v4()));
        let summary =
            export_to_dir(&dir, PointSet::Surface, &ten_particles(), ExportFilter::MinDensity(50.0))
                .unwrap();
        assert_eq!(summary.vertex_count, 7);
        assert!(summary.path.file_name().unwrap().to_string_lossy().starts_with("surface-"));
        let text = fs::read_to_string(&summary.path).unwrap();
        assert!(text.starts_with("COFF\n7 0 0\n"));

        // a regular file where a directory is expected
        let blocked = summary.path.join("nested.off");
        let err = save_points(&blocked, &ten_particles(), ExportFilter::All).unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }
}
