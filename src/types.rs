use ndarray::ArrayD;

/// Byte order declared by the MAT file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Data element types of the MAT v5 format (`miINT8` … `miUTF32`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Single,
    Double,
    Int64,
    UInt64,
    Matrix,
    Compressed,
    Utf8,
    Utf16,
    Utf32,
}

impl DataType {
    pub fn from_code(code: u32) -> Option<Self> {
        let data_type = match code {
            1 => DataType::Int8,
            2 => DataType::UInt8,
            3 => DataType::Int16,
            4 => DataType::UInt16,
            5 => DataType::Int32,
            6 => DataType::UInt32,
            7 => DataType::Single,
            9 => DataType::Double,
            12 => DataType::Int64,
            13 => DataType::UInt64,
            14 => DataType::Matrix,
            15 => DataType::Compressed,
            16 => DataType::Utf8,
            17 => DataType::Utf16,
            18 => DataType::Utf32,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn code(self) -> u32 {
        match self {
            DataType::Int8 => 1,
            DataType::UInt8 => 2,
            DataType::Int16 => 3,
            DataType::UInt16 => 4,
            DataType::Int32 => 5,
            DataType::UInt32 => 6,
            DataType::Single => 7,
            DataType::Double => 9,
            DataType::Int64 => 12,
            DataType::UInt64 => 13,
            DataType::Matrix => 14,
            DataType::Compressed => 15,
            DataType::Utf8 => 16,
            DataType::Utf16 => 17,
            DataType::Utf32 => 18,
        }
    }

    /// 单个元素的字节数（复合类型返回 None）
    pub fn size(self) -> Option<usize> {
        match self {
            DataType::Int8 | DataType::UInt8 | DataType::Utf8 => Some(1),
            DataType::Int16 | DataType::UInt16 | DataType::Utf16 => Some(2),
            DataType::Int32 | DataType::UInt32 | DataType::Single | DataType::Utf32 => Some(4),
            DataType::Double | DataType::Int64 | DataType::UInt64 => Some(8),
            DataType::Matrix | DataType::Compressed => None,
        }
    }
}

/// MATLAB array classes (`mxCELL_CLASS` … `mxUINT64_CLASS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatClass {
    Cell,
    Struct,
    Object,
    Char,
    Sparse,
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
}

impl MatClass {
    pub fn from_code(code: u8) -> Option<Self> {
        let class = match code {
            1 => MatClass::Cell,
            2 => MatClass::Struct,
            3 => MatClass::Object,
            4 => MatClass::Char,
            5 => MatClass::Sparse,
            6 => MatClass::Double,
            7 => MatClass::Single,
            8 => MatClass::Int8,
            9 => MatClass::UInt8,
            10 => MatClass::Int16,
            11 => MatClass::UInt16,
            12 => MatClass::Int32,
            13 => MatClass::UInt32,
            14 => MatClass::Int64,
            15 => MatClass::UInt64,
            _ => return None,
        };
        Some(class)
    }

    pub fn code(self) -> u8 {
        match self {
            MatClass::Cell => 1,
            MatClass::Struct => 2,
            MatClass::Object => 3,
            MatClass::Char => 4,
            MatClass::Sparse => 5,
            MatClass::Double => 6,
            MatClass::Single => 7,
            MatClass::Int8 => 8,
            MatClass::UInt8 => 9,
            MatClass::Int16 => 10,
            MatClass::UInt16 => 11,
            MatClass::Int32 => 12,
            MatClass::UInt32 => 13,
            MatClass::Int64 => 14,
            MatClass::UInt64 => 15,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.code() >= MatClass::Double.code()
    }
}

/// A numeric (or logical) array. Values are widened to `f64` and laid out
/// with the MATLAB dimensions, column-major on disk.
#[derive(Debug, Clone)]
pub struct NumericArray {
    pub class: MatClass,
    pub logical: bool,
    pub real: ArrayD<f64>,
    pub imag: Option<ArrayD<f64>>,
}

impl NumericArray {
    pub fn dims(&self) -> &[usize] {
        self.real.shape()
    }

    pub fn is_complex(&self) -> bool {
        self.imag.is_some()
    }

    /// 1x1 数组的标量值
    pub fn scalar(&self) -> Option<f64> {
        if self.real.len() == 1 {
            self.real.iter().next().copied()
        } else {
            None
        }
    }
}

impl From<ArrayD<f64>> for NumericArray {
    fn from(real: ArrayD<f64>) -> Self {
        NumericArray {
            class: MatClass::Double,
            logical: false,
            real,
            imag: None,
        }
    }
}

/// A struct array; `elements` is column-major over `dims`, each element
/// holding one value per entry of `field_names`.
#[derive(Debug, Clone)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub field_names: Vec<String>,
    pub elements: Vec<Vec<MatValue>>,
}

impl StructArray {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Field `name` of element `index`
    pub fn field_at(&self, index: usize, name: &str) -> Option<&MatValue> {
        let field = self.field_names.iter().position(|f| f == name)?;
        self.elements.get(index)?.get(field)
    }

    /// Field `name` of the first element, the common case for 1x1 structs
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        self.field_at(0, name)
    }

    /// Moves field `name` of the first element out of the struct
    pub fn into_field(self, name: &str) -> Option<MatValue> {
        let field = self.field_names.iter().position(|f| f == name)?;
        let first = self.elements.into_iter().next()?;
        first.into_iter().nth(field)
    }
}

#[derive(Debug, Clone)]
pub enum MatValue {
    Numeric(NumericArray),
    /// Character array; column-major text for multi-row arrays
    Char { dims: Vec<usize>, text: String },
    Struct(StructArray),
    Cell { dims: Vec<usize>, values: Vec<MatValue> },
    /// Zero-length matrix element, written by MATLAB for `[]` struct fields
    Empty,
}

impl MatValue {
    pub fn as_numeric(&self) -> Option<&NumericArray> {
        match self {
            MatValue::Numeric(array) => Some(array),
            _ => None,
        }
    }

    pub fn into_numeric(self) -> Option<NumericArray> {
        match self {
            MatValue::Numeric(array) => Some(array),
            _ => None,
        }
    }

    pub fn into_struct(self) -> Option<StructArray> {
        match self {
            MatValue::Struct(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            MatValue::Struct(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MatValue::Char { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MatValue::Numeric(_) => "numeric",
            MatValue::Char { .. } => "char",
            MatValue::Struct(_) => "struct",
            MatValue::Cell { .. } => "cell",
            MatValue::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatHeader {
    pub description: String,
    pub subsys_offset: u64,
    pub version: u16,
    pub endian: Endian,
}

#[derive(Debug, Clone)]
pub struct MatVariable {
    pub name: String,
    pub global: bool,
    pub value: MatValue,
}

/// Contents of a MAT file in on-disk order
#[derive(Debug, Clone)]
pub struct MatFile {
    pub header: MatHeader,
    pub variables: Vec<MatVariable>,
}

impl MatFile {
    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables.iter().find(|v| v.name == name).map(|v| &v.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    /// Moves variable `name` out of the file
    pub fn into_variable(self, name: &str) -> Option<MatValue> {
        self.variables.into_iter().find(|v| v.name == name).map(|v| v.value)
    }
}
