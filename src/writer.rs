use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::ArrayD;

use crate::error::{DatasetError, Result};
use crate::reader::MAT_HEADER_SIZE;
use crate::types::{DataType, MatClass, MatValue, NumericArray};
use crate::utils::pad8;

// MATLAB 变量名长度上限
const MAX_NAME_LEN: usize = 63;

/// Writer for MATLAB Level 5 MAT files.
///
/// Variables are appended to the file as they are written; `finalize` flushes
/// the buffered output. Numeric arrays are stored as `double` (or `uint8` for
/// logical arrays), char arrays as UTF-16.
///
/// # Examples
///
/// ```rust
/// use ndarray::{ArrayD, IxDyn};
/// use tsinghua_ssvep::{loadmat, MatWriter};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("epochs.mat");
/// let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |d| (d[0] + d[1] * 10 + d[2] * 100) as f64);
///
/// let mut writer = MatWriter::create(&path)?;
/// writer.set_compression(true);
/// writer.write_array("data", &data)?;
/// writer.finalize()?;
///
/// let mat = loadmat(&path)?;
/// let loaded = mat.get("data").and_then(|v| v.as_numeric()).unwrap();
/// assert_eq!(loaded.real, data);
/// # Ok::<(), tsinghua_ssvep::DatasetError>(())
/// ```
pub struct MatWriter {
    file: BufWriter<File>,
    compress: bool,
    names: HashSet<String>,
}

impl MatWriter {
    /// Creates the file and writes the 128-byte header
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        let mut header = [b' '; MAT_HEADER_SIZE];
        let description = format!(
            "MATLAB 5.0 MAT-file, Platform: {}, Created on: {}",
            std::env::consts::OS,
            Local::now().format("%a %b %e %H:%M:%S %Y")
        );
        let text = description.as_bytes();
        let len = text.len().min(116);
        header[..len].copy_from_slice(&text[..len]);
        header[116..124].copy_from_slice(&[0u8; 8]);
        header[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
        header[126..128].copy_from_slice(b"IM");
        writer.write_all(&header)?;

        Ok(MatWriter {
            file: writer,
            compress: false,
            names: HashSet::new(),
        })
    }

    /// Wraps every following variable in a zlib-compressed element
    pub fn set_compression(&mut self, compress: bool) {
        self.compress = compress;
    }

    pub fn write_variable(&mut self, name: &str, value: &MatValue) -> Result<()> {
        validate_name(name)?;
        if matches!(value, MatValue::Empty) {
            return Err(DatasetError::InvalidFormat(format!(
                "Variable '{}' has no value; empty elements carry no name",
                name
            )));
        }
        if !self.names.insert(name.to_string()) {
            return Err(DatasetError::InvalidFormat(format!(
                "Variable '{}' written twice",
                name
            )));
        }

        let element = encode_matrix(name, value)?;
        if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let compressed = encoder.finish()?;
            self.file.write_all(&DataType::Compressed.code().to_le_bytes())?;
            self.file.write_all(&(compressed.len() as u32).to_le_bytes())?;
            self.file.write_all(&compressed)?;
        } else {
            self.file.write_all(&element)?;
        }
        Ok(())
    }

    /// Writes a real `double` array
    pub fn write_array(&mut self, name: &str, array: &ArrayD<f64>) -> Result<()> {
        let value = MatValue::Numeric(NumericArray {
            class: MatClass::Double,
            logical: false,
            real: array.clone(),
            imag: None,
        });
        self.write_variable(name, &value)
    }

    pub fn finalize(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DatasetError::InvalidFormat(format!("Invalid variable name '{}'", name)))
    }
}

/// 写入一个数据元素，4 字节以内使用小元素格式
fn push_element(buf: &mut Vec<u8>, data_type: DataType, data: &[u8]) {
    if !data.is_empty() && data.len() <= 4 {
        let first = ((data.len() as u32) << 16) | data_type.code();
        buf.extend_from_slice(&first.to_le_bytes());
        buf.extend_from_slice(data);
        buf.resize(buf.len() + 4 - data.len(), 0);
        return;
    }

    buf.extend_from_slice(&data_type.code().to_le_bytes());
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
    buf.resize(buf.len() + pad8(data.len()) - data.len(), 0);
}

fn push_header(buf: &mut Vec<u8>, class: MatClass, flag_bits: u32, dims: &[usize], name: &str) {
    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&((flag_bits << 8) | class.code() as u32).to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());
    push_element(buf, DataType::UInt32, &flags);

    let dims_bytes: Vec<u8> = dims.iter().flat_map(|&d| (d as i32).to_le_bytes()).collect();
    push_element(buf, DataType::Int32, &dims_bytes);

    push_element(buf, DataType::Int8, name.as_bytes());
}

/// MATLAB 至少需要两个维度
fn matlab_dims(shape: &[usize]) -> Vec<usize> {
    match shape.len() {
        0 => vec![1, 1],
        1 => vec![1, shape[0]],
        _ => shape.to_vec(),
    }
}

/// Column-major bytes of an array, converted by `encode`
fn column_major<F>(array: &ArrayD<f64>, encode: F) -> Vec<u8>
where
    F: Fn(f64, &mut Vec<u8>),
{
    let mut bytes = Vec::with_capacity(array.len() * 8);
    // 转置后的行优先遍历即原数组的列优先顺序
    for &value in array.t().iter() {
        encode(value, &mut bytes);
    }
    bytes
}

fn encode_matrix(name: &str, value: &MatValue) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    match value {
        MatValue::Empty => {}
        MatValue::Numeric(array) => {
            let dims = matlab_dims(array.real.shape());
            let (class, data_type) = if array.logical {
                (MatClass::UInt8, DataType::UInt8)
            } else {
                (MatClass::Double, DataType::Double)
            };
            let mut bits = 0;
            if array.logical {
                bits |= 0x02;
            }
            if array.imag.is_some() {
                bits |= 0x08;
            }
            push_header(&mut body, class, bits, &dims, name);

            let encode = |v: f64, out: &mut Vec<u8>| {
                if array.logical {
                    out.push(if v != 0.0 { 1 } else { 0 });
                } else {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            };
            push_element(&mut body, data_type, &column_major(&array.real, encode));
            if let Some(imag) = &array.imag {
                if imag.shape() != array.real.shape() {
                    return Err(DatasetError::InvalidFormat(
                        "Imaginary part shape differs from real part".to_string(),
                    ));
                }
                push_element(&mut body, data_type, &column_major(imag, encode));
            }
        }
        MatValue::Char { text, .. } => {
            let units: Vec<u16> = text.encode_utf16().collect();
            push_header(&mut body, MatClass::Char, 0, &[1, units.len()], name);
            let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            push_element(&mut body, DataType::UInt16, &bytes);
        }
        MatValue::Struct(array) => {
            let dims = matlab_dims(&array.dims);
            push_header(&mut body, MatClass::Struct, 0, &dims, name);

            let name_len = array.field_names.iter().map(|f| f.len()).max().unwrap_or(0) + 1;
            push_element(&mut body, DataType::Int32, &(name_len as i32).to_le_bytes());
            let mut names = Vec::with_capacity(name_len * array.field_names.len());
            for field in &array.field_names {
                validate_name(field)?;
                names.extend_from_slice(field.as_bytes());
                names.resize(names.len() + name_len - field.len(), 0);
            }
            push_element(&mut body, DataType::Int8, &names);

            let count: usize = dims.iter().product();
            if count != array.elements.len() {
                return Err(DatasetError::InvalidFormat(format!(
                    "Struct of shape {:?} has {} elements",
                    dims,
                    array.elements.len()
                )));
            }
            for element in &array.elements {
                if element.len() != array.field_names.len() {
                    return Err(DatasetError::InvalidFormat(
                        "Struct element does not match the field list".to_string(),
                    ));
                }
                for field in element {
                    body.extend_from_slice(&encode_matrix("", field)?);
                }
            }
        }
        MatValue::Cell { dims, values } => {
            let dims = matlab_dims(dims);
            push_header(&mut body, MatClass::Cell, 0, &dims, name);
            for item in values {
                body.extend_from_slice(&encode_matrix("", item)?);
            }
        }
    }

    let mut element = Vec::with_capacity(body.len() + 8);
    element.extend_from_slice(&DataType::Matrix.code().to_le_bytes());
    element.extend_from_slice(&(body.len() as u32).to_le_bytes());
    element.extend_from_slice(&body);
    Ok(element)
}
