use crate::error::{DatasetError, Result};
use crate::types::{DataType, Endian};

/// 向上对齐到 8 字节边界
pub fn pad8(len: usize) -> usize {
    (len + 7) & !7
}

pub fn read_u16(bytes: &[u8], endian: Endian) -> u16 {
    let buf = [bytes[0], bytes[1]];
    match endian {
        Endian::Little => u16::from_le_bytes(buf),
        Endian::Big => u16::from_be_bytes(buf),
    }
}

pub fn read_u32(bytes: &[u8], endian: Endian) -> u32 {
    let buf = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match endian {
        Endian::Little => u32::from_le_bytes(buf),
        Endian::Big => u32::from_be_bytes(buf),
    }
}

macro_rules! decode_chunks {
    ($bytes:expr, $endian:expr, $ty:ty, $size:expr) => {
        $bytes
            .chunks_exact($size)
            .map(|chunk| {
                let mut buf = [0u8; $size];
                buf.copy_from_slice(chunk);
                let value = match $endian {
                    Endian::Little => <$ty>::from_le_bytes(buf),
                    Endian::Big => <$ty>::from_be_bytes(buf),
                };
                value as f64
            })
            .collect::<Vec<f64>>()
    };
}

/// Decodes a numeric data element into `f64` values.
///
/// 64 位整数超过 2^53 时会损失精度
pub fn decode_numeric(data_type: DataType, bytes: &[u8], endian: Endian) -> Result<Vec<f64>> {
    let size = data_type.size().ok_or_else(|| {
        DatasetError::InvalidFormat(format!("{:?} is not a numeric data type", data_type))
    })?;
    if bytes.len() % size != 0 {
        return Err(DatasetError::InvalidFormat(format!(
            "{} bytes is not a multiple of the {:?} element size",
            bytes.len(),
            data_type
        )));
    }

    let values = match data_type {
        DataType::Int8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        DataType::UInt8 | DataType::Utf8 => bytes.iter().map(|&b| b as f64).collect(),
        DataType::Int16 => decode_chunks!(bytes, endian, i16, 2),
        DataType::UInt16 | DataType::Utf16 => decode_chunks!(bytes, endian, u16, 2),
        DataType::Int32 => decode_chunks!(bytes, endian, i32, 4),
        DataType::UInt32 | DataType::Utf32 => decode_chunks!(bytes, endian, u32, 4),
        DataType::Single => decode_chunks!(bytes, endian, f32, 4),
        DataType::Double => decode_chunks!(bytes, endian, f64, 8),
        DataType::Int64 => decode_chunks!(bytes, endian, i64, 8),
        DataType::UInt64 => decode_chunks!(bytes, endian, u64, 8),
        DataType::Matrix | DataType::Compressed => unreachable!("size() is None for composite types"),
    };
    Ok(values)
}

/// Decodes the data element of a char array
pub fn decode_text(data_type: DataType, bytes: &[u8], endian: Endian) -> Result<String> {
    match data_type {
        DataType::Utf8 | DataType::UInt8 | DataType::Int8 => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        DataType::UInt16 | DataType::Utf16 => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| read_u16(c, endian)).collect();
            Ok(String::from_utf16_lossy(&units))
        }
        DataType::Utf32 | DataType::UInt32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| char::from_u32(read_u32(c, endian)).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()),
        other => Err(DatasetError::InvalidFormat(format!(
            "Char array stored as {:?}",
            other
        ))),
    }
}

/// 去掉名称末尾的 NUL 填充
pub fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
