use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::document::MAX_TENSOR_RANK;
use crate::dtype::DataType;
use crate::model::LoadError;
use crate::validate::ValidationError;

/// Errors that abort a conversion.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConvertError {
    /// The combination of options is invalid. This is reported before any
    /// input is read.
    InvalidOptions(String),

    /// The input model could not be loaded.
    Load(LoadError),

    /// The input model failed structural validation.
    Validation(ValidationError),

    /// Graphs were nested more deeply than [`MAX_GRAPH_DEPTH`](crate::MAX_GRAPH_DEPTH).
    NestingTooDeep {
        /// Name of the graph at which the limit was exceeded.
        graph: String,
    },

    /// Writing to the side-car file failed.
    SideCarWrite(std::io::Error),

    /// A payload was appended at an offset other than the end of the
    /// side-car stream.
    OffsetMismatch { expected: u64, actual: u64 },

    /// Creating or writing an output file failed.
    Output(std::io::Error),

    /// Serializing the JSON document failed.
    Json(serde_json::Error),
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOptions(msg) => write!(f, "invalid options: {}", msg),
            Self::Load(err) => write!(f, "failed to load model: {}", err),
            Self::Validation(err) => write!(f, "model validation failed: {}", err),
            Self::NestingTooDeep { graph } => {
                write!(f, "graph nesting too deep at graph \"{}\"", graph)
            }
            Self::SideCarWrite(err) => write!(f, "failed to write side-car file: {}", err),
            Self::OffsetMismatch { expected, actual } => write!(
                f,
                "side-car offset mismatch. expected {} actual {}",
                expected, actual
            ),
            Self::Output(err) => write!(f, "failed to write output: {}", err),
            Self::Json(err) => write!(f, "failed to serialize JSON: {}", err),
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::SideCarWrite(err) => Some(err),
            Self::Output(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidOptions(_) | Self::NestingTooDeep { .. } | Self::OffsetMismatch { .. } => {
                None
            }
        }
    }
}

impl From<LoadError> for ConvertError {
    fn from(val: LoadError) -> Self {
        Self::Load(val)
    }
}

impl From<ValidationError> for ConvertError {
    fn from(val: ValidationError) -> Self {
        Self::Validation(val)
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(val: serde_json::Error) -> Self {
        if val.is_io() {
            Self::Output(val.into())
        } else {
            Self::Json(val)
        }
    }
}

/// Reasons why a single tensor's payload could not be converted.
///
/// These errors are recorded in the output document rather than aborting the
/// conversion.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// Payloads of this element type cannot be decoded.
    UnsupportedDataType(DataType),

    /// A dimension size is negative.
    NegativeDim(i64),

    /// The tensor has more dims than can be nested in the document.
    RankTooLarge(usize),

    /// The product of the dimensions overflows.
    ShapeTooLarge,

    /// The payload length is not a multiple of the element size.
    InvalidLength { len: usize, elem_size: usize },

    /// The number of elements in the payload does not match the dimensions.
    LengthMismatch { expected: usize, actual: usize },
}

impl Display for TensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedDataType(dtype) => write!(f, "unsupported data type {}", dtype),
            Self::NegativeDim(dim) => write!(f, "invalid dimension size {}", dim),
            Self::RankTooLarge(rank) => write!(
                f,
                "tensor has {} dims, more than the maximum of {}",
                rank, MAX_TENSOR_RANK
            ),
            Self::ShapeTooLarge => write!(f, "element count overflows"),
            Self::InvalidLength { len, elem_size } => write!(
                f,
                "data length {} is not a multiple of element size {}",
                len, elem_size
            ),
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "element count {} does not match dims (expected {})",
                actual, expected
            ),
        }
    }
}

impl Error for TensorError {}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{ConvertError, TensorError};
    use crate::dtype::DataType;

    #[test]
    fn test_error_messages() {
        let err = TensorError::LengthMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "element count 3 does not match dims (expected 4)"
        );

        let err = TensorError::UnsupportedDataType(DataType::STRING);
        assert_eq!(err.to_string(), "unsupported data type STRING");

        let err = ConvertError::OffsetMismatch {
            expected: 16,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "side-car offset mismatch. expected 16 actual 8"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_source() {
        let io_err = std::io::Error::other("disk full");
        let err = ConvertError::SideCarWrite(io_err);
        assert_eq!(err.source().unwrap().to_string(), "disk full");
    }
}
