use log::{debug, warn};

use crate::document::{
    EmbeddedTensor, FailedTensor, MAX_TENSOR_RANK, TensorData, TensorJson, TensorRef, element_count,
    type_tag,
};
use crate::dtype::decode_elements;
use crate::error::{ConvertError, TensorError};
use crate::model::Tensor;
use crate::sidecar::SideCar;

/// Convert a tensor to its JSON representation.
///
/// Without a side-car the elements are embedded in the document as a nested
/// array and `offset` is returned unchanged. With a side-car the payload is
/// appended at `offset` and the returned offset is the end of the appended
/// bytes.
///
/// A tensor whose payload does not match its data type and dims is converted
/// to an entry with an `error` field, and nothing is written. Only failures
/// to write the side-car are returned as errors.
pub fn convert_tensor(
    tensor: &Tensor,
    offset: u64,
    sink: Option<&mut SideCar<'_>>,
) -> Result<(TensorJson, u64), ConvertError> {
    let name = tensor.name.clone();
    let data_type = type_tag(tensor.data_type);
    let dims = tensor.dims.clone();

    let Some(raw_data) = tensor.raw_data.as_deref() else {
        let json = TensorJson::Embedded(EmbeddedTensor {
            name,
            data_type,
            dims,
            shape: None,
            data: None,
        });
        return Ok((json, offset));
    };

    let shape = match payload_shape(tensor, raw_data) {
        Ok(shape) => shape,
        Err(err) => return Ok((failed_tensor(tensor, err), offset)),
    };

    let Some(sink) = sink else {
        let data = match decode_elements(tensor.data_type, raw_data) {
            Ok(elements) => TensorData::new(elements, shape.clone()),
            Err(err) => return Ok((failed_tensor(tensor, err), offset)),
        };
        let json = TensorJson::Embedded(EmbeddedTensor {
            name,
            data_type,
            dims,
            shape: Some(shape),
            data,
        });
        return Ok((json, offset));
    };

    let extent = sink.append(offset, raw_data)?;
    debug!(
        "wrote tensor \"{}\" to side-car at offset {} ({} bytes)",
        tensor.name, extent.offset, extent.size
    );

    let json = TensorJson::SideCar(TensorRef {
        name,
        data_type,
        dims,
        shape,
        compressed: extent.original_size.is_some(),
        original_size: extent.original_size,
        weights_offset: extent.offset,
        weights_size: extent.size,
    });
    Ok((json, extent.offset + extent.size))
}

/// Check that a payload is consistent with a tensor's data type and dims,
/// and return the logical shape.
fn payload_shape(tensor: &Tensor, raw_data: &[u8]) -> Result<Vec<usize>, TensorError> {
    if tensor.dims.len() > MAX_TENSOR_RANK {
        return Err(TensorError::RankTooLarge(tensor.dims.len()));
    }

    let shape = tensor
        .dims
        .iter()
        .map(|&dim| usize::try_from(dim).map_err(|_| TensorError::NegativeDim(dim)))
        .collect::<Result<Vec<_>, _>>()?;

    let elem_size = tensor
        .data_type
        .elem_size()
        .ok_or(TensorError::UnsupportedDataType(tensor.data_type))?;
    if raw_data.len() % elem_size != 0 {
        return Err(TensorError::InvalidLength {
            len: raw_data.len(),
            elem_size,
        });
    }

    let expected = element_count(&shape).ok_or(TensorError::ShapeTooLarge)?;
    let actual = raw_data.len() / elem_size;
    if actual != expected {
        return Err(TensorError::LengthMismatch { expected, actual });
    }

    Ok(shape)
}

fn failed_tensor(tensor: &Tensor, err: TensorError) -> TensorJson {
    warn!("failed to convert tensor \"{}\": {}", tensor.name, err);
    TensorJson::Failed(FailedTensor {
        name: tensor.name.clone(),
        data_type: type_tag(tensor.data_type),
        dims: tensor.dims.clone(),
        error: format!("failed to convert tensor data: {}", err),
    })
}

#[cfg(test)]
mod tests {
    use oml_testing::TestCases;
    use serde_json::json;

    use super::convert_tensor;
    use crate::document::{MAX_TENSOR_RANK, TensorJson};
    use crate::dtype::DataType;
    use crate::model::Tensor;
    use crate::sidecar::{SideCar, read_payload};

    fn f32_bytes(vals: &[f32]) -> Vec<u8> {
        vals.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    #[test]
    fn test_convert_embedded() {
        #[derive(Debug)]
        struct Case {
            tensor: Tensor,
            expected: serde_json::Value,
        }

        let cases = [
            Case {
                tensor: Tensor::new(
                    "w",
                    DataType::FLOAT,
                    &[2, 2],
                    Some(f32_bytes(&[1., 2., 3., 4.])),
                ),
                expected: json!({
                    "name": "w",
                    "data_type": "1",
                    "dims": [2, 2],
                    "shape": [2, 2],
                    "data": [[1.0, 2.0], [3.0, 4.0]],
                }),
            },
            Case {
                tensor: Tensor::new("s", DataType::INT64, &[], Some(7i64.to_le_bytes().to_vec())),
                expected: json!({
                    "name": "s",
                    "data_type": "7",
                    "dims": [],
                    "shape": [],
                    "data": 7,
                }),
            },
            Case {
                tensor: Tensor::new("b", DataType::BOOL, &[3], Some(vec![1, 0, 1])),
                expected: json!({
                    "name": "b",
                    "data_type": "9",
                    "dims": [3],
                    "shape": [3],
                    "data": [true, false, true],
                }),
            },
            Case {
                tensor: Tensor::new("none", DataType::FLOAT, &[4], None),
                expected: json!({
                    "name": "none",
                    "data_type": "1",
                    "dims": [4],
                    "shape": null,
                    "data": null,
                }),
            },
        ];

        cases.test_each(|case| {
            let (json, offset) = convert_tensor(&case.tensor, 12, None).unwrap();
            assert_eq!(offset, 12);
            assert_eq!(serde_json::to_value(&json).unwrap(), case.expected);
        })
    }

    #[test]
    fn test_convert_invalid_tensor() {
        #[derive(Debug)]
        struct Case {
            tensor: Tensor,
            error: &'static str,
        }

        let cases = [
            Case {
                tensor: Tensor::new("a", DataType::FLOAT, &[2, 2], Some(f32_bytes(&[1., 2., 3.]))),
                error: "element count 3 does not match dims (expected 4)",
            },
            Case {
                tensor: Tensor::new("b", DataType::FLOAT, &[1], Some(vec![0; 3])),
                error: "data length 3 is not a multiple of element size 4",
            },
            Case {
                tensor: Tensor::new("c", DataType::FLOAT, &[-1], Some(vec![])),
                error: "invalid dimension size -1",
            },
            Case {
                tensor: Tensor::new("d", DataType::STRING, &[1], Some(vec![0])),
                error: "unsupported data type STRING",
            },
            Case {
                tensor: Tensor::new("e", DataType::COMPLEX64, &[1], Some(vec![0; 8])),
                error: "unsupported data type COMPLEX64",
            },
            Case {
                tensor: Tensor::new("f", DataType::UINT8, &vec![1; 200_000], Some(vec![7])),
                error: "tensor has 200000 dims, more than the maximum of 32",
            },
            Case {
                tensor: Tensor::new("g", DataType::FLOAT, &[0, 1 << 33, 1 << 33], Some(vec![])),
                error: "element count overflows",
            },
        ];

        cases.test_each(|case| {
            for use_sidecar in [false, true] {
                let mut buf = Vec::new();
                let mut sidecar = SideCar::new(&mut buf);
                let sink = use_sidecar.then_some(&mut sidecar);

                let (json, offset) = convert_tensor(&case.tensor, 0, sink).unwrap();
                assert_eq!(offset, 0);
                assert_eq!(
                    json.error(),
                    Some(format!("failed to convert tensor data: {}", case.error).as_str())
                );
                let value = serde_json::to_value(&json).unwrap();
                assert_eq!(value["name"], case.tensor.name.as_str());
                assert!(value.get("data").is_none());
                assert!(buf.is_empty());
            }
        })
    }

    #[test]
    fn test_convert_max_rank() {
        let dims = vec![1; MAX_TENSOR_RANK];
        let tensor = Tensor::new("r", DataType::UINT8, &dims, Some(vec![7]));
        let (json, _) = convert_tensor(&tensor, 0, None).unwrap();
        assert_eq!(json.error(), None);

        let text = serde_json::to_string(&json).unwrap();
        let nested = format!("{}7{}", "[".repeat(MAX_TENSOR_RANK), "]".repeat(MAX_TENSOR_RANK));
        assert!(text.contains(&nested));
    }

    #[test]
    fn test_convert_to_sidecar() {
        let tensor = Tensor::new("w", DataType::FLOAT, &[1, 3], Some(f32_bytes(&[1., 2., 3.])));
        let empty = Tensor::new("empty", DataType::FLOAT, &[0], Some(vec![]));
        let no_data = Tensor::new("none", DataType::FLOAT, &[2], None);

        let mut buf = Vec::new();
        let mut sidecar = SideCar::new(&mut buf);
        sidecar.append(0, &[0xaa; 4]).unwrap();

        let (first, offset) = convert_tensor(&tensor, 4, Some(&mut sidecar)).unwrap();
        assert_eq!(offset, 16);
        let (second, offset) = convert_tensor(&empty, offset, Some(&mut sidecar)).unwrap();
        assert_eq!(offset, 16);
        let (third, offset) = convert_tensor(&no_data, offset, Some(&mut sidecar)).unwrap();
        assert_eq!(offset, 16);

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            json!({
                "name": "w",
                "data_type": "1",
                "dims": [1, 3],
                "shape": [1, 3],
                "compressed": false,
                "weights_offset": 4,
                "weights_size": 12,
            })
        );
        assert_eq!(second.sidecar_ref().map(|r| r.weights_size), Some(0));
        assert!(matches!(third, TensorJson::Embedded(_)));

        let entry = first.sidecar_ref().unwrap();
        let payload = read_payload(&buf, entry).unwrap();
        assert_eq!(payload, f32_bytes(&[1., 2., 3.]));
    }

    #[test]
    fn test_convert_to_compressed_sidecar() {
        let tensor = Tensor::new("zeros", DataType::FLOAT, &[1024], Some(vec![0; 4096]));

        let mut buf = Vec::new();
        let mut sidecar = SideCar::new(&mut buf).with_compression(6);
        let (json, offset) = convert_tensor(&tensor, 0, Some(&mut sidecar)).unwrap();

        let entry = json.sidecar_ref().unwrap();
        assert!(entry.compressed);
        assert_eq!(entry.original_size, Some(4096));
        assert_eq!(entry.weights_size, offset);
        assert!(entry.weights_size < 4096);

        let value = serde_json::to_value(&json).unwrap();
        assert_eq!(value["original_size"], 4096);
        assert_eq!(read_payload(&buf, entry).unwrap(), vec![0u8; 4096]);
    }

    #[test]
    fn test_offset_mismatch() {
        let tensor = Tensor::new("w", DataType::UINT8, &[2], Some(vec![1, 2]));
        let mut buf = Vec::new();
        let mut sidecar = SideCar::new(&mut buf);
        assert!(convert_tensor(&tensor, 3, Some(&mut sidecar)).is_err());
    }
}
