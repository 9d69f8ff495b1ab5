use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that occur when loading a model.
#[derive(Debug)]
pub struct LoadError {
    inner: LoadErrorImpl,
    node: Option<String>,
}

impl LoadError {
    pub(crate) fn new(kind: LoadErrorImpl) -> Self {
        Self {
            inner: kind,
            node: None,
        }
    }

    pub(crate) fn for_node(node: Option<&str>, kind: LoadErrorImpl) -> Self {
        Self {
            inner: kind,
            node: node.filter(|n| !n.is_empty()).map(|n| n.to_string()),
        }
    }

    /// The name of the graph node or tensor that this error relates to.
    ///
    /// This can be `None` if the error is not about a specific node, or if that
    /// node doesn't have a name.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Return the category of error.
    pub fn kind(&self) -> LoadErrorKind {
        self.inner.kind()
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(node) = self.node.as_deref() {
            write!(f, "in node \"{}\": {}", node, self.inner)
        } else {
            self.inner.fmt(f)
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl From<LoadErrorImpl> for LoadError {
    fn from(val: LoadErrorImpl) -> Self {
        Self::new(val)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(val: std::io::Error) -> Self {
        Self::new(LoadErrorImpl::ReadFailed(val))
    }
}

/// Categories of error when loading a model.
///
/// See [`LoadError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum LoadErrorKind {
    /// An I/O error occurred reading the model file.
    IoError,

    /// An error occurred parsing the model file.
    ParseError,

    /// The model file type was unrecognized.
    UnknownFileType,

    /// There was a problem with the graph structure.
    GraphError,

    /// A node attribute has a type that cannot be represented.
    AttributeError,

    /// There was a problem loading tensor data from an external file.
    ExternalDataError,
}

/// The internal implementation of [`LoadError`].
#[derive(Debug)]
pub(crate) enum LoadErrorImpl {
    /// An error occurred reading the file from disk.
    ReadFailed(std::io::Error),

    /// An error occurred parsing the Protocol Buffers data describing the
    /// model.
    ParseFailed(Box<dyn Error + Send + Sync>),

    /// The data does not look like an ONNX model.
    UnknownFileType,

    /// The model is missing its graph, or part of the graph is invalid.
    GraphError(Box<dyn Error + Send + Sync>),

    /// An attribute is invalid or has an unsupported type.
    AttributeError(Box<dyn Error + Send + Sync>),

    /// An error occurred reading tensor data stored externally.
    ExternalDataError(Box<dyn Error + Send + Sync>),
}

impl LoadErrorImpl {
    fn kind(&self) -> LoadErrorKind {
        type Kind = LoadErrorKind;

        match self {
            Self::ReadFailed(_) => Kind::IoError,
            Self::ParseFailed(_) => Kind::ParseError,
            Self::UnknownFileType => Kind::UnknownFileType,
            Self::GraphError(_) => Kind::GraphError,
            Self::AttributeError(_) => Kind::AttributeError,
            Self::ExternalDataError(_) => Kind::ExternalDataError,
        }
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReadFailed(err) => Some(err),
            Self::ParseFailed(err) => Some(err.as_ref()),
            Self::UnknownFileType => None,
            Self::GraphError(err) => Some(err.as_ref()),
            Self::AttributeError(err) => Some(err.as_ref()),
            Self::ExternalDataError(err) => Some(err.as_ref()),
        }
    }
}

impl Display for LoadErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(e) => write!(f, "read error: {e}"),
            Self::ParseFailed(e) => write!(f, "parse error: {e}"),
            Self::UnknownFileType => write!(f, "unknown model file type"),
            Self::GraphError(e) => write!(f, "graph error: {e}"),
            Self::AttributeError(e) => write!(f, "attribute error: {e}"),
            Self::ExternalDataError(e) => write!(f, "external data error: {e}"),
        }
    }
}

/// Create a [`LoadError`] that relates to a specific graph node or tensor.
macro_rules! load_error {
    ($kind:ident, $node_name:expr, $format_str:literal, $($arg:tt)*) => {{
        let err = format!($format_str, $($arg)*);
        LoadError::for_node($node_name, LoadErrorImpl::$kind(err.into()))
    }};

    ($kind:ident, $node_name:expr, $err:expr) => {{
        LoadError::for_node($node_name, LoadErrorImpl::$kind($err.into()))
    }}
}

pub(crate) use load_error;

#[cfg(test)]
mod tests {
    use super::{LoadError, LoadErrorImpl, LoadErrorKind};

    #[test]
    fn test_load_error_display() {
        let err = load_error!(AttributeError, Some("conv_1"), "unsupported type {}", 11);
        assert_eq!(err.kind(), LoadErrorKind::AttributeError);
        assert_eq!(err.node(), Some("conv_1"));
        assert_eq!(
            err.to_string(),
            "in node \"conv_1\": attribute error: unsupported type 11"
        );

        // Empty names are treated as missing.
        let err = load_error!(GraphError, Some(""), "model has no graph");
        assert_eq!(err.node(), None);
        assert_eq!(err.to_string(), "graph error: model has no graph");

        let err = LoadError::from(LoadErrorImpl::UnknownFileType);
        assert_eq!(err.kind(), LoadErrorKind::UnknownFileType);
    }
}
