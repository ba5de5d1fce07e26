use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use log::{debug, warn};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::error::{DatasetError, Result};
use crate::types::{
    DataType, Endian, MatClass, MatFile, MatHeader, MatValue, MatVariable, NumericArray,
    StructArray,
};
use crate::utils::{decode_numeric, decode_text, pad8, read_u16, read_u32, trim_nul};

/// Size of the MAT v5 file header in bytes
pub const MAT_HEADER_SIZE: usize = 128;

const MAT_VERSION_5: u16 = 0x0100;
const MAT_VERSION_73: u16 = 0x0200;

// 数组标志位（位于 flags 字的第二个字节）
const FLAG_COMPLEX: u32 = 0x08;
const FLAG_GLOBAL: u32 = 0x04;
const FLAG_LOGICAL: u32 = 0x02;

// 每个子矩阵至少占一个 8 字节标签
const MIN_ELEMENT_SIZE: usize = 8;

/// Reader for MATLAB Level 5 MAT files (the format written by `save` up to
/// `-v7`).
///
/// Variables are read one at a time in file order. Compressed variables
/// (`miCOMPRESSED`, the default since MATLAB 7) are inflated in memory.
///
/// # Examples
///
/// ```rust
/// use tsinghua_ssvep::MatReader;
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("example.mat");
/// # tsinghua_ssvep::doctest_utils::create_simple_mat_file(&path)?;
/// let mut reader = MatReader::open(&path)?;
/// println!("{}", reader.header().description);
///
/// while let Some(variable) = reader.read_variable()? {
///     println!("{}: {}", variable.name, variable.value.kind());
/// }
/// # Ok::<(), tsinghua_ssvep::DatasetError>(())
/// ```
pub struct MatReader {
    file: BufReader<File>,
    header: MatHeader,
    path: PathBuf,
}

impl MatReader {
    /// Opens a MAT file and validates its header.
    ///
    /// # Errors
    ///
    /// * `DatasetError::FileNotFound` - the file can't be opened
    /// * `DatasetError::UnsupportedMatFile` - a v7.3 (HDF5) file
    /// * `DatasetError::InvalidFormat` - not a Level 5 MAT file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            DatasetError::FileNotFound(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let mut file = BufReader::new(file);

        let mut header_bytes = [0u8; MAT_HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|_| {
            DatasetError::InvalidFormat(format!(
                "{} is shorter than a MAT file header",
                path.as_ref().display()
            ))
        })?;
        let header = parse_header(&header_bytes)?;
        debug!("Opened {} ({})", path.as_ref().display(), header.description);

        Ok(MatReader {
            file,
            header,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn header(&self) -> &MatHeader {
        &self.header
    }

    /// Reads the next variable, or `None` at end of file.
    ///
    /// Top-level elements that are neither matrices nor compressed matrices
    /// are skipped.
    pub fn read_variable(&mut self) -> Result<Option<MatVariable>> {
        loop {
            if self.file.fill_buf()?.is_empty() {
                return Ok(None);
            }

            let mut tag = [0u8; 8];
            self.file.read_exact(&mut tag).map_err(|_| {
                DatasetError::InvalidFormat(format!("Truncated element tag in {}", self.path.display()))
            })?;
            let endian = self.header.endian;
            let type_code = read_u32(&tag[0..4], endian);
            let nbytes = read_u32(&tag[4..8], endian) as usize;

            let mut payload = vec![0u8; nbytes];
            self.file.read_exact(&mut payload).map_err(|_| {
                DatasetError::InvalidFormat(format!(
                    "Element of {} bytes runs past the end of {}",
                    nbytes,
                    self.path.display()
                ))
            })?;

            match DataType::from_code(type_code) {
                Some(DataType::Compressed) => {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(payload.as_slice())
                        .read_to_end(&mut inflated)
                        .map_err(|e| {
                            DatasetError::InvalidFormat(format!("Corrupt compressed element: {}", e))
                        })?;
                    let mut cursor = ElementCursor::new(&inflated, endian);
                    let element = cursor.next_element()?;
                    if element.type_code != DataType::Matrix.code() {
                        warn!("Skipping compressed element of type {}", element.type_code);
                        continue;
                    }
                    return parse_matrix(element.data, endian).map(Some);
                }
                Some(DataType::Matrix) => {
                    self.skip_padding(nbytes)?;
                    return parse_matrix(&payload, endian).map(Some);
                }
                _ => {
                    warn!("Skipping top-level element of type {}", type_code);
                    self.skip_padding(nbytes)?;
                }
            }
        }
    }

    /// Reads every remaining variable
    pub fn read_all(mut self) -> Result<MatFile> {
        let mut variables = Vec::new();
        while let Some(variable) = self.read_variable()? {
            variables.push(variable);
        }
        Ok(MatFile {
            header: self.header,
            variables,
        })
    }

    fn skip_padding(&mut self, nbytes: usize) -> Result<()> {
        let padding = (pad8(nbytes) - nbytes) as u64;
        io::copy(&mut (&mut self.file).take(padding), &mut io::sink())?;
        Ok(())
    }
}

/// Loads every variable of a MAT file, like `scipy.io.loadmat`
pub fn loadmat<P: AsRef<Path>>(path: P) -> Result<MatFile> {
    MatReader::open(path)?.read_all()
}

fn parse_header(bytes: &[u8; MAT_HEADER_SIZE]) -> Result<MatHeader> {
    let description = String::from_utf8_lossy(&bytes[0..116])
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string();

    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        _ => {
            return Err(DatasetError::InvalidFormat(
                "Missing endian indicator, not a Level 5 MAT file".to_string(),
            ))
        }
    };

    let version = read_u16(&bytes[124..126], endian);
    if version == MAT_VERSION_73 || description.starts_with("MATLAB 7.3") {
        return Err(DatasetError::UnsupportedMatFile(
            "MAT v7.3 (HDF5) files are not supported".to_string(),
        ));
    }
    if version != MAT_VERSION_5 {
        return Err(DatasetError::InvalidFormat(format!(
            "Unknown MAT file version 0x{:04x}",
            version
        )));
    }

    let mut offset = [0u8; 8];
    offset.copy_from_slice(&bytes[116..124]);
    let subsys_offset = match endian {
        Endian::Little => u64::from_le_bytes(offset),
        Endian::Big => u64::from_be_bytes(offset),
    };

    Ok(MatHeader {
        description,
        subsys_offset,
        version,
        endian,
    })
}

struct Element<'a> {
    type_code: u32,
    data: &'a [u8],
}

/// 在内存缓冲区中按顺序读取数据元素
struct ElementCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ElementCursor<'a> {
    fn new(bytes: &'a [u8], endian: Endian) -> Self {
        ElementCursor { bytes, pos: 0, endian }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Fails unless `count` child matrices can fit in the bytes left
    fn check_children(&self, count: Option<usize>, what: &str) -> Result<()> {
        match count.and_then(|n| n.checked_mul(MIN_ELEMENT_SIZE)) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(DatasetError::InvalidFormat(format!(
                "{} claims more elements than its {} bytes can hold",
                what,
                self.remaining()
            ))),
        }
    }

    fn next_element(&mut self) -> Result<Element<'a>> {
        if self.pos + 8 > self.bytes.len() {
            return Err(DatasetError::InvalidFormat("Truncated data element".to_string()));
        }

        let first = read_u32(&self.bytes[self.pos..], self.endian);
        // 小数据元素：类型与长度共用前 4 个字节，数据占后 4 个字节
        if first >> 16 != 0 {
            let nbytes = (first >> 16) as usize;
            if nbytes > 4 {
                return Err(DatasetError::InvalidFormat(format!(
                    "Small data element claims {} bytes",
                    nbytes
                )));
            }
            let start = self.pos + 4;
            self.pos += 8;
            return Ok(Element {
                type_code: first & 0xffff,
                data: &self.bytes[start..start + nbytes],
            });
        }

        let nbytes = read_u32(&self.bytes[self.pos + 4..], self.endian) as usize;
        let start = self.pos + 8;
        let end = start
            .checked_add(nbytes)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                DatasetError::InvalidFormat(format!("Data element of {} bytes is truncated", nbytes))
            })?;
        self.pos = (start + pad8(nbytes)).min(self.bytes.len());

        Ok(Element {
            type_code: first,
            data: &self.bytes[start..end],
        })
    }

    fn next_typed(&mut self, what: &str) -> Result<(DataType, &'a [u8])> {
        let element = self.next_element()?;
        let data_type = DataType::from_code(element.type_code).ok_or_else(|| {
            DatasetError::InvalidFormat(format!("Unknown data type {} for {}", element.type_code, what))
        })?;
        Ok((data_type, element.data))
    }

    fn next_matrix(&mut self) -> Result<MatValue> {
        let element = self.next_element()?;
        if element.type_code != DataType::Matrix.code() {
            return Err(DatasetError::InvalidFormat(format!(
                "Expected a matrix element, found type {}",
                element.type_code
            )));
        }
        parse_matrix(element.data, self.endian).map(|variable| variable.value)
    }
}

fn parse_matrix(data: &[u8], endian: Endian) -> Result<MatVariable> {
    if data.is_empty() {
        return Ok(MatVariable {
            name: String::new(),
            global: false,
            value: MatValue::Empty,
        });
    }

    let mut cursor = ElementCursor::new(data, endian);

    let (_, flags) = cursor.next_typed("array flags")?;
    if flags.len() < 8 {
        return Err(DatasetError::InvalidFormat("Array flags element too short".to_string()));
    }
    let flags_word = read_u32(flags, endian);
    let class_code = (flags_word & 0xff) as u8;
    let bits = (flags_word >> 8) & 0xff;
    let class = MatClass::from_code(class_code)
        .ok_or_else(|| DatasetError::InvalidFormat(format!("Unknown array class {}", class_code)))?;

    let (dims_type, dims_bytes) = cursor.next_typed("dimensions")?;
    let dims = decode_numeric(dims_type, dims_bytes, endian)?
        .into_iter()
        .map(|d| {
            if d < 0.0 {
                Err(DatasetError::InvalidFormat(format!("Negative dimension {}", d)))
            } else {
                Ok(d as usize)
            }
        })
        .collect::<Result<Vec<usize>>>()?;

    let (_, name_bytes) = cursor.next_typed("array name")?;
    let name = trim_nul(name_bytes);
    let count = element_count(&dims)?;

    let value = match class {
        MatClass::Cell => {
            cursor.check_children(Some(count), "Cell array")?;
            let values = (0..count)
                .map(|_| cursor.next_matrix())
                .collect::<Result<Vec<_>>>()?;
            MatValue::Cell { dims, values }
        }
        MatClass::Struct => parse_struct(&mut cursor, dims, count)?,
        MatClass::Char => {
            let text = if count == 0 {
                String::new()
            } else {
                let (data_type, bytes) = cursor.next_typed("char data")?;
                decode_text(data_type, bytes, endian)?
            };
            MatValue::Char { dims, text }
        }
        MatClass::Object => {
            return Err(DatasetError::UnsupportedMatFile(format!(
                "Variable '{}' is a MATLAB object",
                name
            )))
        }
        MatClass::Sparse => {
            return Err(DatasetError::UnsupportedMatFile(format!(
                "Variable '{}' is a sparse matrix",
                name
            )))
        }
        _ => {
            let real = read_numeric_part(&mut cursor, &dims, count, endian)?;
            let imag = if bits & FLAG_COMPLEX != 0 {
                Some(read_numeric_part(&mut cursor, &dims, count, endian)?)
            } else {
                None
            };
            MatValue::Numeric(NumericArray {
                class,
                logical: bits & FLAG_LOGICAL != 0,
                real,
                imag,
            })
        }
    };

    Ok(MatVariable {
        name,
        global: bits & FLAG_GLOBAL != 0,
        value,
    })
}

fn read_numeric_part(
    cursor: &mut ElementCursor<'_>,
    dims: &[usize],
    count: usize,
    endian: Endian,
) -> Result<ArrayD<f64>> {
    let (data_type, bytes) = cursor.next_typed("numeric data")?;
    let values = decode_numeric(data_type, bytes, endian)?;
    if values.len() != count {
        return Err(DatasetError::InvalidFormat(format!(
            "Array of shape {:?} holds {} values",
            dims,
            values.len()
        )));
    }
    // MAT 文件按列优先顺序存储
    Ok(ArrayD::from_shape_vec(IxDyn(dims).f(), values)?)
}

/// Number of elements of an array with `dims`, rejecting overflow
fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |n, &d| n.checked_mul(d))
        .ok_or_else(|| {
            DatasetError::InvalidFormat(format!("Dimensions {:?} overflow the element count", dims))
        })
}

fn parse_struct(cursor: &mut ElementCursor<'_>, dims: Vec<usize>, count: usize) -> Result<MatValue> {
    let (len_type, len_bytes) = cursor.next_typed("field name length")?;
    let name_len = decode_numeric(len_type, len_bytes, cursor.endian)?
        .first()
        .copied()
        .unwrap_or(0.0) as usize;

    let (_, names_bytes) = cursor.next_typed("field names")?;
    let field_names: Vec<String> = if name_len == 0 {
        Vec::new()
    } else {
        names_bytes.chunks(name_len).map(trim_nul).collect()
    };

    let mut elements = Vec::new();
    if field_names.is_empty() {
        // 无字段的结构体不占数据字节，只能靠分配失败来拒绝
        elements.try_reserve_exact(count).map_err(|_| {
            DatasetError::InvalidFormat(format!("Struct of shape {:?} is too large", dims))
        })?;
    } else {
        cursor.check_children(count.checked_mul(field_names.len()), "Struct array")?;
    }
    for _ in 0..count {
        let fields = field_names
            .iter()
            .map(|_| cursor.next_matrix())
            .collect::<Result<Vec<_>>>()?;
        elements.push(fields);
    }

    Ok(MatValue::Struct(StructArray {
        dims,
        field_names,
        elements,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u16, endian: &[u8; 2]) -> [u8; MAT_HEADER_SIZE] {
        let mut bytes = [b' '; MAT_HEADER_SIZE];
        let text = b"MATLAB 5.0 MAT-file, test";
        bytes[..text.len()].copy_from_slice(text);
        let version_bytes = if endian == b"IM" {
            version.to_le_bytes()
        } else {
            version.to_be_bytes()
        };
        bytes[124..126].copy_from_slice(&version_bytes);
        bytes[126..128].copy_from_slice(endian);
        bytes
    }

    #[test]
    fn test_parse_header_endianness() {
        let header = parse_header(&header_bytes(MAT_VERSION_5, b"IM")).unwrap();
        assert_eq!(header.endian, Endian::Little);
        assert!(header.description.starts_with("MATLAB 5.0"));

        let header = parse_header(&header_bytes(MAT_VERSION_5, b"MI")).unwrap();
        assert_eq!(header.endian, Endian::Big);
    }

    #[test]
    fn test_parse_header_rejects_hdf5() {
        let result = parse_header(&header_bytes(MAT_VERSION_73, b"IM"));
        assert!(matches!(result, Err(DatasetError::UnsupportedMatFile(_))));
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        let bytes = [0u8; MAT_HEADER_SIZE];
        assert!(matches!(parse_header(&bytes), Err(DatasetError::InvalidFormat(_))));
    }

    #[test]
    fn test_small_element() {
        // miINT32 小元素，值为 7
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((4u32 << 16) | 5).to_le_bytes());
        bytes.extend_from_slice(&7i32.to_le_bytes());
        let mut cursor = ElementCursor::new(&bytes, Endian::Little);
        let element = cursor.next_element().unwrap();
        assert_eq!(element.type_code, 5);
        assert_eq!(element.data, &7i32.to_le_bytes());
        assert_eq!(cursor.pos, 8);
    }

    #[test]
    fn test_truncated_element() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        let mut cursor = ElementCursor::new(&bytes, Endian::Little);
        assert!(cursor.next_element().is_err());
    }

    #[test]
    fn test_element_count_overflow() {
        assert_eq!(element_count(&[64, 1500, 40, 6]).unwrap(), 64 * 1500 * 40 * 6);
        assert_eq!(element_count(&[]).unwrap(), 1);
        let huge = i32::MAX as usize;
        assert!(matches!(
            element_count(&[huge, huge, huge]),
            Err(DatasetError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_check_children_bounds() {
        let bytes = [0u8; 16];
        let cursor = ElementCursor::new(&bytes, Endian::Little);
        assert!(cursor.check_children(Some(2), "cell").is_ok());
        assert!(cursor.check_children(Some(3), "cell").is_err());
        assert!(cursor.check_children(None, "cell").is_err());
        assert!(cursor.check_children(Some(usize::MAX), "cell").is_err());
    }

    #[test]
    fn test_empty_matrix_element() {
        let variable = parse_matrix(&[], Endian::Little).unwrap();
        assert!(matches!(variable.value, MatValue::Empty));
    }
}
