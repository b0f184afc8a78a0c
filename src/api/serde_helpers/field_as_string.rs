use std::fmt::Debug;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serializer, de};

/// 同时接受字符串和裸数字，Jupiter 不同端点对金额的编码并不一致。
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl StringOrNumber {
    fn into_text(self) -> String {
        match self {
            StringOrNumber::Text(text) => text,
            StringOrNumber::Number(number) => number.to_string(),
        }
    }
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: Debug,
    D: Deserializer<'de>,
{
    let raw = StringOrNumber::deserialize(deserializer)?.into_text();
    raw.trim()
        .parse()
        .map_err(|err| de::Error::custom(format!("无法解析字段 `{raw}`: {err:?}")))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use solana_sdk::pubkey::Pubkey;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "super")]
        amount: u64,
        #[serde(with = "super")]
        mint: Pubkey,
    }

    #[test]
    fn accepts_string_and_number() {
        let mint = Pubkey::new_unique();
        let from_text: Wrapper =
            serde_json::from_str(&format!(r#"{{"amount":"42","mint":"{mint}"}}"#)).unwrap();
        let from_number: Wrapper =
            serde_json::from_str(&format!(r#"{{"amount":42,"mint":"{mint}"}}"#)).unwrap();
        assert_eq!(from_text, from_number);

        let encoded = serde_json::to_string(&from_text).unwrap();
        assert!(encoded.contains(r#""amount":"42""#));
    }
}
