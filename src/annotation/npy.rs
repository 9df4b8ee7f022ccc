//! Label arrays on disk as NumPy `.npy` files.
//!
//! Masks are written as `|u1` in C order. The reader also takes the wider
//! integer dtypes NumPy produces for prediction arrays, as long as every
//! value fits in a label byte.

use crate::error::{Result, SegmarkError};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy, ReadNpyError, ReadableElement, WriteNpyError};
use std::fmt::Display;
use std::path::Path;

pub fn write<P: AsRef<Path>>(path: P, array: &Array2<u8>) -> Result<()> {
    let path = path.as_ref();
    write_npy(path, array).map_err(|e| match e {
        WriteNpyError::Io(source) => SegmarkError::io(path, source),
        other => format_error(path, other),
    })
}

/// Read a 2-D integer array and narrow it to labels, in C order.
pub fn read<P: AsRef<Path>>(path: P) -> Result<Array2<u8>> {
    let path = path.as_ref();
    let readers: [fn(&Path) -> Result<Option<Array2<u8>>>; 8] = [
        read_narrowed::<u8>,
        read_narrowed::<i8>,
        read_narrowed::<u16>,
        read_narrowed::<i16>,
        read_narrowed::<u32>,
        read_narrowed::<i32>,
        read_narrowed::<u64>,
        read_narrowed::<i64>,
    ];
    for reader in readers {
        if let Some(labels) = reader(path)? {
            return Ok(labels);
        }
    }
    Err(format_error(path, "unsupported dtype, expected an integer array"))
}

/// `Ok(None)` when the file holds another dtype than `T`.
fn read_narrowed<T>(path: &Path) -> Result<Option<Array2<u8>>>
where
    T: ReadableElement + Copy + Display + TryInto<u8>,
{
    let wide: Array2<T> = match read_npy(path) {
        Ok(array) => array,
        Err(ReadNpyError::WrongDescriptor(_)) => return Ok(None),
        Err(ReadNpyError::Io(source)) => return Err(SegmarkError::io(path, source)),
        Err(e) => return Err(format_error(path, e)),
    };

    let mut labels = Vec::with_capacity(wide.len());
    for &value in wide.iter() {
        let label = value
            .try_into()
            .map_err(|_| format_error(path, format!("value {} does not fit a label", value)))?;
        labels.push(label);
    }
    Array2::from_shape_vec(wide.dim(), labels)
        .map(Some)
        .map_err(|e| format_error(path, e))
}

fn format_error(path: &Path, reason: impl Display) -> SegmarkError {
    SegmarkError::MaskFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m_mask.npy");
        let mask = array![[0u8, 1, 2], [3, 0, 255]];
        write(&path, &mask).unwrap();
        assert_eq!(read(&path).unwrap(), mask);
    }

    #[test]
    fn test_reads_int64_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_pred.npy");
        write_npy(&path, &array![[2i64, 5], [0, 1]]).unwrap();
        assert_eq!(read(&path).unwrap(), array![[2u8, 5], [0, 1]]);
    }

    #[test]
    fn test_reads_fortran_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.npy");
        let c = array![[1u8, 2, 3], [4, 5, 6]];
        let f = c.t().to_owned().reversed_axes();
        assert!(f.t().is_standard_layout());
        write_npy(&path, &f).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded, c);
        assert!(loaded.is_standard_layout());
    }

    #[test]
    fn test_rejects_out_of_range_and_bad_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let wide = dir.path().join("wide.npy");
        write_npy(&wide, &array![[300i32]]).unwrap();
        assert!(matches!(read(&wide), Err(SegmarkError::MaskFormat { .. })));

        let flat = dir.path().join("flat.npy");
        write_npy(&flat, &Array1::<u8>::zeros(4)).unwrap();
        assert!(matches!(read(&flat), Err(SegmarkError::MaskFormat { .. })));

        let garbage = dir.path().join("garbage.npy");
        std::fs::write(&garbage, b"not an array").unwrap();
        assert!(matches!(read(&garbage), Err(SegmarkError::MaskFormat { .. })));

        let floats = dir.path().join("floats.npy");
        write_npy(&floats, &array![[0.5f32]]).unwrap();
        assert!(matches!(read(&floats), Err(SegmarkError::MaskFormat { .. })));

        assert!(matches!(
            read(dir.path().join("missing.npy")),
            Err(SegmarkError::Persistence { .. })
        ));
    }
}
