// io.rs - Loading initial grids and writing snapshots

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use conway::Grid;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: not a binary PGM image: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
    #[error("no image named {0}")]
    Missing(String),
    #[error(transparent)]
    Grid(#[from] conway::Error),
}

/// Where initial grids come from and snapshots go.
pub trait ImageIo: Send + Sync {
    fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, IoError>;
    fn save(&self, name: &str, grid: &Grid) -> Result<(), IoError>;
}

/// Binary PGM (P5) files: reads `{input}/{name}.pgm`, writes `{output}/{name}.pgm`.
#[derive(Debug, Clone)]
pub struct PgmIo {
    input: PathBuf,
    output: PathBuf,
}

impl PgmIo {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output.join(format!("{name}.pgm"))
    }
}

impl ImageIo for PgmIo {
    fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, IoError> {
        let path = self.input.join(format!("{name}.pgm"));
        let bytes = fs::read(&path).map_err(|source| IoError::Io {
            path: path.clone(),
            source,
        })?;
        let (w, h, pixels) = parse_pgm(&bytes).map_err(|reason| IoError::Format {
            path: path.clone(),
            reason,
        })?;
        if (w, h) != (width, height) {
            return Err(IoError::Format {
                path,
                reason: format!("image is {w}x{h}, expected {width}x{height}"),
            });
        }
        debug!(path = %path.display(), width, height, "loaded image");
        Ok(Grid::from_bytes(width, height, pixels)?)
    }

    fn save(&self, name: &str, grid: &Grid) -> Result<(), IoError> {
        let path = self.output_path(name);
        let io_err = |source| IoError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.output).map_err(io_err)?;
        let mut data = format!("P5\n{} {}\n255\n", grid.width(), grid.height()).into_bytes();
        data.extend(grid.to_bytes());
        fs::write(&path, data).map_err(io_err)?;
        debug!(path = %path.display(), "wrote image");
        Ok(())
    }
}

/// Splits a P5 file into width, height and pixel bytes.
fn parse_pgm(bytes: &[u8]) -> Result<(usize, usize, &[u8]), String> {
    let mut pos = 0;
    let mut fields = [0usize; 3];

    let magic = next_token(bytes, &mut pos).ok_or("missing magic number")?;
    if magic != b"P5" {
        return Err(format!("bad magic number {:?}", String::from_utf8_lossy(magic)));
    }
    for (field, label) in fields.iter_mut().zip(["width", "height", "maxval"]) {
        let token = next_token(bytes, &mut pos).ok_or(format!("missing {label}"))?;
        *field = std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or(format!("bad {label}"))?;
    }
    let [width, height, maxval] = fields;
    if maxval == 0 || maxval > 255 {
        return Err(format!("unsupported maxval {maxval}"));
    }

    let pixels = width
        .checked_mul(height)
        .ok_or(format!("{width}x{height} is too large"))?;
    // exactly one whitespace byte separates the header from the raster
    let start = pos + 1;
    match start.checked_add(pixels) {
        Some(end) if end <= bytes.len() => Ok((width, height, &bytes[start..end])),
        _ => Err(format!("expected {pixels} pixels, file is too short")),
    }
}

fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    (*pos > start).then(|| &bytes[start..*pos])
}

/// Images kept in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryIo {
    images: Mutex<HashMap<String, Grid>>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, grid: Grid) {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), grid);
    }

    pub fn get(&self, name: &str) -> Option<Grid> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl ImageIo for MemoryIo {
    fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, IoError> {
        let grid = self.get(name).ok_or_else(|| IoError::Missing(name.to_owned()))?;
        if (grid.width(), grid.height()) != (width, height) {
            return Err(conway::Error::Dimensions {
                width,
                height,
                expected: width * height,
                found: grid.width() * grid.height(),
            }
            .into());
        }
        Ok(grid)
    }

    fn save(&self, name: &str, grid: &Grid) -> Result<(), IoError> {
        self.insert(name, grid.clone());
        Ok(())
    }
}

impl<T: ImageIo + ?Sized> ImageIo for std::sync::Arc<T> {
    fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, IoError> {
        (**self).load(name, width, height)
    }

    fn save(&self, name: &str, grid: &Grid) -> Result<(), IoError> {
        (**self).save(name, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conway::{Coord, patterns};

    #[test]
    fn test_pgm_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let io = PgmIo::new(dir.path(), dir.path());
        let grid = patterns::random_grid(16, 12, 9);

        io.save("12x16", &grid).unwrap();
        assert!(io.output_path("12x16").exists());
        assert_eq!(io.load("12x16", 16, 12).unwrap(), grid);
    }

    #[test]
    fn test_pgm_header_may_carry_comments() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = b"P5\n# made by hand\n3 2\n255\n".to_vec();
        data.extend([255, 0, 0, 0, 0, 255]);
        fs::write(dir.path().join("2x3.pgm"), data).unwrap();

        let io = PgmIo::new(dir.path(), dir.path());
        let grid = io.load("2x3", 3, 2).unwrap();
        assert_eq!(grid.alive_cells(), vec![Coord::new(0, 0), Coord::new(2, 1)]);
    }

    #[test]
    fn test_pgm_rejects_wrong_dimensions_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let io = PgmIo::new(dir.path(), dir.path());
        io.save("4x4", &Grid::new(4, 4)).unwrap();
        assert!(matches!(io.load("4x4", 5, 4), Err(IoError::Format { .. })));

        fs::write(dir.path().join("short.pgm"), b"P5\n4 4\n255\n\0\0").unwrap();
        assert!(matches!(io.load("short", 4, 4), Err(IoError::Format { .. })));
        assert!(matches!(io.load("absent", 4, 4), Err(IoError::Io { .. })));
    }

    #[test]
    fn test_pgm_huge_header_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let io = PgmIo::new(dir.path(), dir.path());
        fs::write(dir.path().join("huge.pgm"), b"P5\n4294967296 4294967296\n255\n\0").unwrap();
        assert!(matches!(io.load("huge", 4, 4), Err(IoError::Format { .. })));

        let tall = format!("P5\n{} 1\n255\n\0", usize::MAX);
        fs::write(dir.path().join("tall.pgm"), tall).unwrap();
        assert!(matches!(io.load("tall", 4, 4), Err(IoError::Format { .. })));
    }

    #[test]
    fn test_memory_io_checks_dimensions() {
        let io = MemoryIo::new();
        io.insert("8x8", Grid::new(8, 8));
        assert!(io.load("8x8", 8, 8).is_ok());
        assert!(matches!(io.load("8x8", 4, 8), Err(IoError::Grid(_))));
        assert!(matches!(io.load("nope", 8, 8), Err(IoError::Missing(_))));
    }
}
