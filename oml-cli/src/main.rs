use std::collections::VecDeque;
use std::error::Error;
use std::path::PathBuf;

use oml_format::ConvertOptions;
use oml_format::env::verbose_from_env;

mod logger;

#[derive(Debug, PartialEq)]
struct Args {
    /// ONNX model to convert.
    input: PathBuf,

    /// Path of the JSON document. Defaults to the input path with a `.json`
    /// extension.
    output: Option<PathBuf>,

    /// Store tensor data in a side-car file.
    separate_weights: bool,

    /// Compress side-car data.
    compress_weights: bool,

    /// Check the model's structure before converting.
    validate: bool,

    /// Write JSON without indentation.
    compact: bool,

    /// Enable verbose logging.
    verbose: bool,
}

fn parse_args(mut parser: lexopt::Parser) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut separate_weights = false;
    let mut compress_weights = false;
    let mut validate = false;
    let mut compact = false;
    let mut verbose = false;

    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(PathBuf::from(val)),
            Short('s') | Long("separate-weights") => separate_weights = true,
            Short('c') | Long("compress-weights") => compress_weights = true,
            Long("validate") => validate = true,
            Long("compact") => compact = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                println!(
                    "Convert ONNX models to JSON.

Usage: {bin_name} [OPTIONS] <input> [output]

  -s, --separate-weights  Store tensor data in a .nnp side-car file
  -c, --compress-weights  Compress side-car data (requires --separate-weights)
      --validate          Run structural validation before converting
      --compact           Write JSON without indentation
  -v, --verbose           Enable verbose logging
  -h, --help              Print help

Environment variables:

  OML_COMPRESSION_LEVEL   zlib compression level (0-9, default 6)
  OML_VERBOSE             Enable verbose logging
",
                    bin_name = parser.bin_name().unwrap_or("oml")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let input = values.pop_front().ok_or("missing `<input>` arg")?;
    let output = values.pop_front();
    if let Some(extra) = values.pop_front() {
        return Err(format!("unexpected argument \"{}\"", extra.display()).into());
    }

    if compress_weights && !separate_weights {
        return Err("--compress-weights requires --separate-weights".into());
    }

    Ok(Args {
        input,
        output,
        separate_weights,
        compress_weights,
        validate,
        compact,
        verbose,
    })
}

/// Convert an ONNX model to a JSON document, optionally with tensor data in
/// a separate `.nnp` file.
///
/// ```text
/// oml model.onnx
/// oml --separate-weights --compress-weights model.onnx out/model.json
/// ```
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args(lexopt::Parser::from_env())?;
    logger::init(args.verbose || verbose_from_env())?;

    let mut options = ConvertOptions::from_env();
    options
        .separate_weights(args.separate_weights)
        .compress_weights(args.compress_weights)
        .validate(args.validate)
        .pretty(!args.compact);

    let report = options.convert_file(&args.input, args.output.as_deref())?;

    println!();
    println!("{}", report);

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use oml_testing::TestCases;

    use super::{Args, parse_args};

    #[test]
    fn test_parse_args() {
        #[derive(Debug)]
        struct Case {
            args: &'static [&'static str],
            expected: Result<Args, &'static str>,
        }

        let cases = [
            Case {
                args: &["model.onnx"],
                expected: Ok(Args {
                    input: PathBuf::from("model.onnx"),
                    output: None,
                    separate_weights: false,
                    compress_weights: false,
                    validate: false,
                    compact: false,
                    verbose: false,
                }),
            },
            Case {
                args: &["-s", "-c", "--validate", "model.onnx", "out.json"],
                expected: Ok(Args {
                    input: PathBuf::from("model.onnx"),
                    output: Some(PathBuf::from("out.json")),
                    separate_weights: true,
                    compress_weights: true,
                    validate: true,
                    compact: false,
                    verbose: false,
                }),
            },
            Case {
                args: &["--compact", "--verbose", "model.onnx"],
                expected: Ok(Args {
                    input: PathBuf::from("model.onnx"),
                    output: None,
                    separate_weights: false,
                    compress_weights: false,
                    validate: false,
                    compact: true,
                    verbose: true,
                }),
            },
            Case {
                args: &["--compress-weights", "model.onnx"],
                expected: Err("--compress-weights requires --separate-weights"),
            },
            Case {
                args: &[],
                expected: Err("missing `<input>` arg"),
            },
            Case {
                args: &["a.onnx", "b.json", "c.json"],
                expected: Err("unexpected argument \"c.json\""),
            },
            Case {
                args: &["--pretty", "model.onnx"],
                expected: Err("invalid option '--pretty'"),
            },
        ];

        cases.test_each(|case| {
            let parser = lexopt::Parser::from_args(case.args.iter().copied());
            let result = parse_args(parser).map_err(|err| err.to_string());
            match (&result, &case.expected) {
                (Ok(args), Ok(expected)) => assert_eq!(args, expected),
                (Err(err), Err(expected)) => assert_eq!(err, expected),
                (result, expected) => panic!("expected {:?}, got {:?}", expected, result),
            }
        })
    }
}
