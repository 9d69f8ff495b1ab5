//! Functions for loading tensor data stored externally to the main model file.
//!
//! This is used for ONNX models when `TensorProto`s reference external data
//! files.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use oml_onnx::onnx::StringStringEntryProto;

use super::load_error::{LoadError, LoadErrorImpl, load_error};

/// Specifies the location of tensor data which is stored externally from the
/// main model file.
///
/// See <https://onnx.ai/onnx/repo-docs/ExternalData.html#external-data-field>.
#[derive(Clone, Debug, PartialEq)]
pub struct DataLocation {
    /// Name of the external data file.
    pub path: String,

    /// Offset of the start of the tensor data in bytes.
    pub offset: u64,

    /// Length of the tensor data in bytes, or `None` to read until the end of
    /// the file.
    pub length: Option<u64>,
}

impl DataLocation {
    /// Parse the location from a `TensorProto.external_data` field.
    ///
    /// `name` is the name of the tensor, used for error reporting.
    pub(crate) fn from_entries(
        name: Option<&str>,
        entries: &[StringStringEntryProto],
    ) -> Result<DataLocation, LoadError> {
        let mut path = None;
        let mut offset = None;
        let mut length = None;

        for entry in entries {
            let key = entry.key.as_deref().unwrap_or_default();
            let value = entry.value.as_deref().unwrap_or_default();

            match key {
                "location" => path = Some(value.to_string()),
                "offset" => {
                    offset = Some(value.parse::<u64>().map_err(|_| {
                        load_error!(ExternalDataError, name, "invalid external data offset")
                    })?);
                }
                "length" => {
                    length = Some(value.parse::<u64>().map_err(|_| {
                        load_error!(ExternalDataError, name, "invalid external data length")
                    })?);
                }
                "checksum" => {}
                _ => {
                    return Err(load_error!(
                        ExternalDataError,
                        name,
                        "unsupported external data key {}",
                        key
                    ));
                }
            }
        }

        let path = path
            .ok_or_else(|| load_error!(ExternalDataError, name, "missing external data location"))?;

        Ok(DataLocation {
            path,
            offset: offset.unwrap_or(0),
            length,
        })
    }
}

/// Errors reading tensor data from an external file.
#[derive(Debug)]
pub enum ExternalDataError {
    /// An IO error occurred when accessing the external file.
    IoError(std::io::Error),

    /// The length of the external data is too large.
    InvalidLength,

    /// An invalid path was specified.
    InvalidPath(PathBuf),

    /// External data is not supported by the loader in use.
    NotSupported,

    /// The length of the external data file is too short for the offset and
    /// length of the external data.
    TooShort {
        /// Minimum length the file would need to be in bytes.
        required_len: u64,
        /// Actual number of bytes that could be read.
        actual_len: u64,
    },

    /// The external data file path is disallowed.
    DisallowedPath(PathBuf),
}

impl std::fmt::Display for ExternalDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(err) => write!(f, "io error: {}", err),
            Self::InvalidLength => write!(f, "invalid data length"),
            Self::InvalidPath(path) => write!(f, "invalid path \"{}\"", path.display()),
            Self::NotSupported => write!(f, "external data not supported"),
            Self::TooShort {
                required_len,
                actual_len,
            } => write!(
                f,
                "file too short. required {} actual {}",
                required_len, actual_len
            ),
            Self::DisallowedPath(path) => {
                write!(f, "disallowed path \"{}\"", path.display())
            }
        }
    }
}

impl std::error::Error for ExternalDataError {}

impl From<std::io::Error> for ExternalDataError {
    fn from(val: std::io::Error) -> Self {
        Self::IoError(val)
    }
}

impl From<ExternalDataError> for LoadError {
    fn from(err: ExternalDataError) -> LoadError {
        LoadErrorImpl::ExternalDataError(Box::new(err)).into()
    }
}

/// Trait for loading data from an external file.
pub trait DataLoader {
    /// Load data from the file and offset specified by `location`.
    fn load(&self, location: &DataLocation) -> Result<Vec<u8>, ExternalDataError>;
}

/// Data loader for models that are loaded from a buffer, where there is no
/// directory to resolve external data files against.
pub struct NoExternalData;

impl DataLoader for NoExternalData {
    fn load(&self, _location: &DataLocation) -> Result<Vec<u8>, ExternalDataError> {
        Err(ExternalDataError::NotSupported)
    }
}

/// Check if `path` is an allowed path for external data files for a given
/// model path.
///
/// Data loaded from an external data file is written into the converted
/// document or side-car file. Hence some measures are taken to prevent loading
/// of data from files not intended for this. The ONNX documentation states
/// that the only restriction is that parent directory components ("..") are
/// disallowed. This implementation imposes additional restrictions:
///
///  - The file must have one of the known extensions used for tensor data
///    ("data", "onnx_data", "onnx_data_N" etc.)
///  - The file must be a relative path with only a filename component (ie. it
///    must be located in the same directory as the model)
fn is_allowed_external_data_path(path: &Path) -> bool {
    let mut components = path.components();
    let Some(Component::Normal(_)) = components.next() else {
        return false;
    };
    if components.next().is_some() {
        return false;
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.starts_with("data") => true,
        Some(ext) if ext.starts_with("onnx_data") => true,
        _ => false,
    }
}

/// External data loader that uses standard file IO.
pub struct FileLoader {
    /// Path to directory containing external data.
    dir_path: PathBuf,

    /// Map of external data file name to open file.
    files: RefCell<HashMap<PathBuf, File>>,
}

impl FileLoader {
    /// Create an external data loader which loads data for the model file
    /// specified by `model_path`.
    ///
    /// Data file paths will be resolved relative to the directory containing
    /// `model_path`.
    pub fn new(model_path: &Path) -> Result<Self, ExternalDataError> {
        let dir_path = dir_path_from_model_path(model_path)?;

        Ok(Self {
            dir_path,
            files: HashMap::new().into(),
        })
    }

    fn read(&self, location: &DataLocation) -> Result<Vec<u8>, ExternalDataError> {
        let data_path = Path::new(&location.path);
        if !is_allowed_external_data_path(data_path) {
            return Err(ExternalDataError::DisallowedPath(data_path.into()));
        }

        let mut files = self.files.borrow_mut();
        if !files.contains_key(data_path) {
            let file = File::open(self.dir_path.join(data_path))?;
            files.insert(data_path.into(), file);
        }
        let Some(file) = files.get_mut(data_path) else {
            return Err(ExternalDataError::InvalidPath(data_path.into()));
        };
        file.seek(SeekFrom::Start(location.offset))?;

        let mut buf = Vec::new();
        match location.length {
            Some(length) => {
                if usize::try_from(length).is_err() {
                    return Err(ExternalDataError::InvalidLength);
                }
                file.by_ref().take(length).read_to_end(&mut buf)?;
                if (buf.len() as u64) < length {
                    return Err(ExternalDataError::TooShort {
                        required_len: location.offset.saturating_add(length),
                        actual_len: location.offset.saturating_add(buf.len() as u64),
                    });
                }
            }
            None => {
                file.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }
}

impl DataLoader for FileLoader {
    fn load(&self, location: &DataLocation) -> Result<Vec<u8>, ExternalDataError> {
        self.read(location)
    }
}

fn dir_path_from_model_path(model_path: &Path) -> Result<PathBuf, ExternalDataError> {
    // Resolve the path now to avoid the possibility of loading data from
    // an unexpected location if `model_path` is relative and the current
    // working directory changes before a data file is loaded.
    let model_path = model_path.canonicalize()?;
    if !model_path.is_file() {
        return Err(ExternalDataError::InvalidPath(model_path));
    }
    match model_path.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Err(ExternalDataError::InvalidPath(model_path)),
    }
}
