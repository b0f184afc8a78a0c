//! Jupiter JSON 中以字符串承载数值/公钥的字段。

pub mod decimal_from_string;
pub mod field_as_string;
