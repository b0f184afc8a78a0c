use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Text(String),
    Float(f64),
}

pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.normalize().to_string())
}

/// `priceImpactPct` 为字符串，价格接口返回浮点数，两种都要接。
pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    match DecimalRepr::deserialize(deserializer)? {
        DecimalRepr::Text(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|err| de::Error::custom(format!("decimal 解析失败 `{raw}`: {err}")))
        }
        DecimalRepr::Float(value) => Decimal::try_from(value)
            .map_err(|err| de::Error::custom(format!("decimal 解析失败 `{value}`: {err}"))),
    }
}
