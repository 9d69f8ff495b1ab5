use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use tempfile::NamedTempFile;

use crate::env::compression_level_from_env;
use crate::error::ConvertError;
use crate::model::{LoadError, Model};
use crate::sidecar::{DEFAULT_COMPRESSION_LEVEL, SideCar};
use crate::validate::check_model;
use crate::walker::convert_model;

/// Options which customize how a model is converted.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertOptions {
    separate_weights: bool,
    compress_weights: bool,
    compression_level: u32,
    validate: bool,
    pretty: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            separate_weights: false,
            compress_weights: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            validate: false,
            pretty: true,
        }
    }
}

impl ConvertOptions {
    /// Create options with default settings: tensor data embedded in the
    /// document, indented output and no validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create default options, then apply settings from environment
    /// variables.
    ///
    /// `OML_COMPRESSION_LEVEL` sets the compression level.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(level) = compression_level_from_env() {
            options.compression_level = level;
        }
        options
    }

    /// Store tensor data in a side-car file instead of the document.
    pub fn separate_weights(&mut self, enable: bool) -> &mut Self {
        self.separate_weights = enable;
        self
    }

    /// Compress tensor data in the side-car file.
    ///
    /// This requires [`separate_weights`](ConvertOptions::separate_weights).
    pub fn compress_weights(&mut self, enable: bool) -> &mut Self {
        self.compress_weights = enable;
        self
    }

    /// Set the zlib compression level (0-9) used for side-car data.
    pub fn compression_level(&mut self, level: u32) -> &mut Self {
        self.compression_level = level;
        self
    }

    /// Check the model's structure before converting it.
    pub fn validate(&mut self, enable: bool) -> &mut Self {
        self.validate = enable;
        self
    }

    /// Set whether the JSON document is indented.
    pub fn pretty(&mut self, enable: bool) -> &mut Self {
        self.pretty = enable;
        self
    }

    /// Check that the combination of options is valid.
    pub fn check(&self) -> Result<(), ConvertError> {
        if self.compress_weights && !self.separate_weights {
            return Err(ConvertError::InvalidOptions(
                "compressing weights requires separate weights".into(),
            ));
        }
        if self.compression_level > 9 {
            return Err(ConvertError::InvalidOptions(format!(
                "compression level {} is outside the range 0-9",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Convert a model file. See [`convert_file`].
    pub fn convert_file(
        &self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<ConversionReport, ConvertError> {
        convert_file(input, output, self)
    }
}

/// Return the default JSON output path for a model file.
pub fn json_path_for(input: &Path) -> PathBuf {
    input.with_extension("json")
}

/// Return the side-car path that accompanies a JSON document.
pub fn sidecar_path_for(json_path: &Path) -> PathBuf {
    json_path.with_extension("nnp")
}

/// Convert a model to a JSON document written to `json`.
///
/// If `sidecar` is present, tensor payloads are appended to it instead of
/// being embedded in the document. Returns the side-car offset after the
/// last payload.
pub fn write_document(
    model: &Model,
    mut json: impl Write,
    sidecar: Option<&mut SideCar<'_>>,
    pretty: bool,
) -> Result<u64, ConvertError> {
    let (document, offset) = convert_model(model, sidecar)?;
    if pretty {
        serde_json::to_writer_pretty(&mut json, &document)?;
    } else {
        serde_json::to_writer(&mut json, &document)?;
    }
    json.flush().map_err(ConvertError::Output)?;
    Ok(offset)
}

/// Convert the ONNX model at `input` to a JSON document and optional side-car
/// file.
///
/// The document is written to `output`, or next to the input with a `.json`
/// extension. The side-car file has the document's path with a `.nnp`
/// extension.
///
/// Both files are written to temporary files in their destination directory
/// and moved into place once complete, the side-car first. If conversion
/// fails, neither file is created.
pub fn convert_file(
    input: &Path,
    output: Option<&Path>,
    options: &ConvertOptions,
) -> Result<ConversionReport, ConvertError> {
    options.check()?;

    let json_path = output.map_or_else(|| json_path_for(input), Path::to_path_buf);
    let sidecar_path = options
        .separate_weights
        .then(|| sidecar_path_for(&json_path));

    if json_path == input || sidecar_path.as_deref() == Some(input) {
        return Err(ConvertError::InvalidOptions(format!(
            "output would overwrite the input file \"{}\"",
            input.display()
        )));
    }
    if sidecar_path.as_deref() == Some(json_path.as_path()) {
        return Err(ConvertError::InvalidOptions(format!(
            "output path \"{}\" is also the side-car path",
            json_path.display()
        )));
    }

    info!("Loading ONNX model from {}", input.display());
    let input_size = std::fs::metadata(input).map_err(LoadError::from)?.len();
    let model = Model::load_file(input)?;

    if options.validate {
        info!("Validating model");
        check_model(&model)?;
    }

    let mut json_file = NamedTempFile::new_in(parent_dir(&json_path)).map_err(ConvertError::Output)?;
    let mut sidecar_file = match &sidecar_path {
        Some(path) => {
            let compression_info = if options.compress_weights {
                " (compressed)"
            } else {
                ""
            };
            info!("Creating weights file {}{}", path.display(), compression_info);
            Some(NamedTempFile::new_in(parent_dir(path)).map_err(ConvertError::SideCarWrite)?)
        }
        None => None,
    };

    info!("Writing JSON to {}", json_path.display());
    let mut json_writer = BufWriter::new(json_file.as_file_mut());
    let mut sidecar_writer = sidecar_file
        .as_mut()
        .map(|file| BufWriter::new(file.as_file_mut()));

    let payload_size = {
        let mut sidecar = sidecar_writer.as_mut().map(|writer| {
            let sidecar = SideCar::new(writer);
            if options.compress_weights {
                sidecar.with_compression(options.compression_level)
            } else {
                sidecar
            }
        });
        write_document(&model, &mut json_writer, sidecar.as_mut(), options.pretty)?;
        sidecar.as_ref().map_or(0, |sidecar| sidecar.payload_bytes())
    };

    sidecar_writer
        .map(finish_file)
        .transpose()
        .map_err(ConvertError::SideCarWrite)?;
    finish_file(json_writer).map_err(ConvertError::Output)?;

    let json_size = file_size(json_file.as_file()).map_err(ConvertError::Output)?;
    let sidecar_size = match &sidecar_file {
        Some(file) => Some(file_size(file.as_file()).map_err(ConvertError::SideCarWrite)?),
        None => None,
    };

    // The side-car is moved into place first, so a document is never visible
    // without the data it references.
    if let (Some(file), Some(path)) = (sidecar_file, &sidecar_path) {
        file.persist(path)
            .map_err(|err| ConvertError::SideCarWrite(err.error))?;
    }
    if let Err(err) = json_file.persist(&json_path) {
        if let Some(path) = &sidecar_path {
            let _ = std::fs::remove_file(path);
        }
        return Err(ConvertError::Output(err.error));
    }

    info!("Converted {} to {}", input.display(), json_path.display());

    Ok(ConversionReport {
        input_path: input.to_path_buf(),
        json_path,
        sidecar_path,
        input_size,
        json_size,
        sidecar_size,
        payload_size,
        compressed: options.separate_weights && options.compress_weights,
    })
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn finish_file(mut writer: BufWriter<&mut File>) -> std::io::Result<()> {
    writer.flush()?;
    writer.get_ref().sync_all()
}

fn file_size(file: &File) -> std::io::Result<u64> {
    Ok(file.metadata()?.len())
}

/// Sizes of the files read and written by a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionReport {
    pub input_path: PathBuf,
    pub json_path: PathBuf,
    pub sidecar_path: Option<PathBuf>,

    /// Size of the input model file in bytes.
    pub input_size: u64,
    pub json_size: u64,

    /// Size of the side-car file, if one was written.
    pub sidecar_size: Option<u64>,

    /// Total size of the tensor payloads written to the side-car, before
    /// compression.
    pub payload_size: u64,
    pub compressed: bool,
}

impl ConversionReport {
    /// Return the combined size of the files written.
    pub fn total_size(&self) -> u64 {
        self.json_size + self.sidecar_size.unwrap_or(0)
    }

    /// Return the ratio of the output size to the input size.
    pub fn overall_ratio(&self) -> f64 {
        ratio(self.total_size(), self.input_size)
    }

    /// Return the ratio of the compressed side-car size to the size of the
    /// uncompressed payloads, if the side-car was compressed.
    pub fn weights_compression_ratio(&self) -> Option<f64> {
        if !self.compressed {
            return None;
        }
        self.sidecar_size
            .map(|sidecar_size| ratio(sidecar_size, self.payload_size))
    }
}

fn ratio(size: u64, base: u64) -> f64 {
    if base == 0 {
        1.0
    } else {
        size as f64 / base as f64
    }
}

/// Format a byte count with thousands separators.
fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(ch);
    }
    formatted
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversion Summary:")?;
        writeln!(f, "Input file size:  {} bytes", format_count(self.input_size))?;
        writeln!(f, "JSON file size:   {} bytes", format_count(self.json_size))?;

        match self.sidecar_size {
            Some(sidecar_size) => {
                writeln!(f, "Weights file size: {} bytes", format_count(sidecar_size))?;
                writeln!(f, "Total output size: {} bytes", format_count(self.total_size()))?;
                if let Some(ratio) = self.weights_compression_ratio() {
                    writeln!(f, "Weights compression ratio: {:.2}x", ratio)?;
                }
                write!(f, "Overall compression ratio: {:.2}x", self.overall_ratio())
            }
            None => write!(f, "Compression ratio: {:.2}x", self.overall_ratio()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use oml_testing::TestCases;
    use oml_testing::proto::MessageWriter;

    use super::{
        ConversionReport, ConvertOptions, convert_file, format_count, json_path_for,
        sidecar_path_for,
    };
    use crate::error::ConvertError;

    #[test]
    fn test_format_count() {
        #[derive(Debug)]
        struct Case {
            count: u64,
            expected: &'static str,
        }

        let cases = [
            Case {
                count: 0,
                expected: "0",
            },
            Case {
                count: 999,
                expected: "999",
            },
            Case {
                count: 1000,
                expected: "1,000",
            },
            Case {
                count: 1234567,
                expected: "1,234,567",
            },
        ];

        cases.test_each(|case| {
            assert_eq!(format_count(case.count), case.expected);
        })
    }

    #[test]
    fn test_check_options() {
        let mut options = ConvertOptions::new();
        assert!(options.check().is_ok());

        options.compress_weights(true);
        assert!(matches!(
            options.check(),
            Err(ConvertError::InvalidOptions(_))
        ));

        options.separate_weights(true);
        assert!(options.check().is_ok());

        options.compression_level(10);
        assert!(matches!(
            options.check(),
            Err(ConvertError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_output_paths() {
        let json_path = json_path_for(Path::new("models/resnet.onnx"));
        assert_eq!(json_path, PathBuf::from("models/resnet.json"));
        assert_eq!(
            sidecar_path_for(&json_path),
            PathBuf::from("models/resnet.nnp")
        );
    }

    #[test]
    fn test_report_display() {
        let report = ConversionReport {
            input_path: "model.onnx".into(),
            json_path: "model.json".into(),
            sidecar_path: Some("model.nnp".into()),
            input_size: 10_000,
            json_size: 2_000,
            sidecar_size: Some(3_000),
            payload_size: 6_000,
            compressed: true,
        };
        assert_eq!(report.total_size(), 5_000);
        assert_eq!(report.weights_compression_ratio(), Some(0.5));
        assert_eq!(
            report.to_string(),
            "Conversion Summary:
Input file size:  10,000 bytes
JSON file size:   2,000 bytes
Weights file size: 3,000 bytes
Total output size: 5,000 bytes
Weights compression ratio: 0.50x
Overall compression ratio: 0.50x"
        );

        let report = ConversionReport {
            sidecar_path: None,
            sidecar_size: None,
            payload_size: 0,
            compressed: false,
            ..report
        };
        assert_eq!(report.weights_compression_ratio(), None);
        assert!(report.to_string().ends_with("Compression ratio: 0.20x"));
    }

    fn weights_model() -> Vec<u8> {
        let tensor = MessageWriter::new()
            .packed_ints(1, &[2])
            .int(2, 1)
            .string(8, "w")
            .bytes(9, &[0, 0, 128, 63, 0, 0, 0, 64]);
        MessageWriter::new()
            .int(1, 8)
            .message(7, MessageWriter::new().string(2, "g").message(5, tensor))
            .message(8, MessageWriter::new().string(1, "").int(2, 17))
            .finish()
    }

    #[test]
    fn test_convert_file() {
        #[derive(Debug)]
        struct Case {
            separate_weights: bool,
            compress_weights: bool,
        }

        let cases = [
            Case {
                separate_weights: false,
                compress_weights: false,
            },
            Case {
                separate_weights: true,
                compress_weights: false,
            },
            Case {
                separate_weights: true,
                compress_weights: true,
            },
        ];

        cases.test_each(|case| {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("model.onnx");
            std::fs::write(&input, weights_model()).unwrap();

            let mut options = ConvertOptions::new();
            options
                .separate_weights(case.separate_weights)
                .compress_weights(case.compress_weights);
            let report = convert_file(&input, None, &options).unwrap();

            let json_path = dir.path().join("model.json");
            let sidecar_path = dir.path().join("model.nnp");
            assert_eq!(report.json_path, json_path);
            assert_eq!(
                std::fs::metadata(&json_path).unwrap().len(),
                report.json_size
            );

            if case.separate_weights {
                assert_eq!(report.sidecar_path.as_deref(), Some(sidecar_path.as_path()));
                assert_eq!(report.payload_size, 8);
                let sidecar = std::fs::read(&sidecar_path).unwrap();
                assert_eq!(report.sidecar_size, Some(sidecar.len() as u64));
                if !case.compress_weights {
                    assert_eq!(sidecar, [0, 0, 128, 63, 0, 0, 0, 64]);
                }
            } else {
                assert_eq!(report.sidecar_path, None);
                assert!(!sidecar_path.exists());
            }
        })
    }
}
