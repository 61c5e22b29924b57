//! Reading `.npy` files produced by numpy into `ndarray` arrays.
//!
//! Embedding and ground-truth files are usually `float32`, but `float64` files
//! are common too, so readers retry with the wider dtype before giving up.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use annbench_error::{BenchError, ErrorCodes};
use ndarray::{Array, Dimension};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NpyError {
    #[error("cannot open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read `{path}` as a floating-point .npy array: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
}

impl BenchError for NpyError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Data
    }
}

fn open(path: &Path) -> Result<BufReader<File>, NpyError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| NpyError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Read an array of dimensionality `D`, narrowing `float64` data to `f32`.
pub fn read_f32<D: Dimension>(path: &Path) -> Result<Array<f32, D>, NpyError> {
    let first_err = match Array::<f32, D>::read_npy(open(path)?) {
        Ok(array) => return Ok(array),
        Err(err) => err,
    };
    match Array::<f64, D>::read_npy(open(path)?) {
        Ok(array) => Ok(array.mapv(|v| v as f32)),
        Err(_) => Err(NpyError::Read {
            path: path.to_path_buf(),
            source: first_err,
        }),
    }
}

/// Read an array of dimensionality `D`, widening `float32` data to `f64`.
pub fn read_f64<D: Dimension>(path: &Path) -> Result<Array<f64, D>, NpyError> {
    let first_err = match Array::<f64, D>::read_npy(open(path)?) {
        Ok(array) => return Ok(array),
        Err(err) => err,
    };
    match Array::<f32, D>::read_npy(open(path)?) {
        Ok(array) => Ok(array.mapv(f64::from)),
        Err(_) => Err(NpyError::Read {
            path: path.to_path_buf(),
            source: first_err,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Ix2, Ix3};
    use ndarray_npy::WriteNpyExt;

    #[test]
    fn test_read_f32_from_f64_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.npy");
        let wide = array![[1.0f64, 2.0], [3.0, 4.5]];
        wide.write_npy(File::create(&path).unwrap()).unwrap();

        let narrow = read_f32::<Ix2>(&path).unwrap();
        assert_eq!(narrow, array![[1.0f32, 2.0], [3.0, 4.5]]);
    }

    #[test]
    fn test_read_wrong_ndim_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.npy");
        array![[1.0f32, 2.0]]
            .write_npy(File::create(&path).unwrap())
            .unwrap();

        let err = read_f64::<Ix3>(&path).unwrap_err();
        assert!(matches!(err, NpyError::Read { .. }));
        assert_eq!(err.code(), ErrorCodes::Data);
    }

    #[test]
    fn test_missing_file() {
        let err = read_f32::<Ix2>(Path::new("/definitely/not/here.npy")).unwrap_err();
        assert!(matches!(err, NpyError::Open { .. }));
    }
}
