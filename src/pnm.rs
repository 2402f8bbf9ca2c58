//! Binary PGM/PPM dumps of converted frames for debugging.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::convert::{LumaImage, RgbImage};
use crate::traits::Result;

const MAX_CHANNEL_VALUE: u8 = 255;

/// Write `image` as a binary PGM (`P5`). Row padding is not written.
pub fn write_pgm<W: Write>(mut out: W, image: &LumaImage) -> Result<()> {
    let (width, height) = (image.width(), image.height());
    writeln!(out, "P5\n{width} {height}\n{MAX_CHANNEL_VALUE}")?;
    for row in image.rows() {
        out.write_all(row)?;
    }
    out.flush()?;
    Ok(())
}

/// Write `image` as a binary PPM (`P6`).
pub fn write_ppm<W: Write>(mut out: W, image: &RgbImage) -> Result<()> {
    let (width, height) = (image.width(), image.height());
    writeln!(out, "P6\n{width} {height}\n{MAX_CHANNEL_VALUE}")?;
    out.write_all(image.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Save `image` to `path` as PGM.
pub fn save_pgm<P: AsRef<Path>>(path: P, image: &LumaImage) -> Result<()> {
    let path = path.as_ref();
    write_pgm(BufWriter::new(File::create(path)?), image)?;
    debug!(path = %path.display(), "wrote luma frame");
    Ok(())
}

/// Save `image` to `path` as PPM.
pub fn save_ppm<P: AsRef<Path>>(path: P, image: &RgbImage) -> Result<()> {
    let path = path.as_ref();
    write_ppm(BufWriter::new(File::create(path)?), image)?;
    debug!(path = %path.display(), "wrote rgb frame");
    Ok(())
}
