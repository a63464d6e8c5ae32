//! MetaImage (`.mhd` header + `.raw` data) export of reconstructed volumes.

use crate::volume::Volume;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Write `volume` as `<path>.mhd` and `<path>.raw`, replacing any extension
/// on `path`. Returns the paths of the header and the data file.
///
/// Voxels are stored as native-endian `MET_FLOAT`, x varying fastest.
pub fn write_meta_image(volume: &Volume, path: impl AsRef<Path>) -> io::Result<(PathBuf, PathBuf)> {
    let header_path = path.as_ref().with_extension("mhd");
    let raw_path = path.as_ref().with_extension("raw");
    let raw_name = raw_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "volume path has no file name"))?;

    let data = volume.data().as_standard_layout();
    let voxels = data
        .as_slice()
        .ok_or_else(|| io::Error::other("volume data is not contiguous"))?;
    fs::write(&raw_path, bytemuck::cast_slice::<f32, u8>(voxels))?;
    fs::write(&header_path, header(volume, raw_name))?;

    Ok((header_path, raw_path))
}

fn header(volume: &Volume, raw_name: &str) -> String {
    let (depth, height, width) = volume.dim();
    let origin = volume.origin();
    let spacing = volume.spacing();
    let msb = if cfg!(target_endian = "big") { "True" } else { "False" };
    format!(
        "ObjectType = Image\n\
         NDims = 3\n\
         BinaryData = True\n\
         BinaryDataByteOrderMSB = {msb}\n\
         CompressedData = False\n\
         Offset = {} {} {}\n\
         ElementSpacing = {} {} {}\n\
         DimSize = {width} {height} {depth}\n\
         ElementType = MET_FLOAT\n\
         ElementDataFile = {raw_name}\n",
        origin.x, origin.y, origin.z, spacing.x, spacing.y, spacing.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use ndarray::Array3;

    #[test]
    fn writes_header_and_raw_data() {
        let volume = Volume {
            data: Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as f32),
            origin: Point3::new(1.5, -2.0, 0.0),
            spacing: Vector3::new(0.5, 0.5, 2.0),
            resolution: 1.0,
        };
        let dir = tempfile::tempdir().unwrap();
        let (header_path, raw_path) = write_meta_image(&volume, dir.path().join("scan")).unwrap();

        let header = fs::read_to_string(header_path).unwrap();
        assert!(header.starts_with("ObjectType = Image\nNDims = 3\nBinaryData = True\n"));
        assert!(header.contains("DimSize = 4 3 2\n"));
        assert!(header.contains("Offset = 1.5 -2 0\n"));
        assert!(header.contains("ElementSpacing = 0.5 0.5 2\n"));
        assert!(header.contains("ElementDataFile = scan.raw\n"));

        let raw = fs::read(raw_path).unwrap();
        assert_eq!(raw.len(), 24 * 4);
        let voxels: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(voxels, (0..24).map(|v| v as f32).collect::<Vec<_>>());
    }
}
