//! 未签名交易的线上格式：bincode 定长整数编码后再做 base64。
//!
//! 入口有两个：解析聚合器返回的交易，以及把组装结果交给优先费估算与 CLI。

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

/// 单个交易包的字节上限。
pub const PACKET_DATA_SIZE: usize = 1232;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("聚合器交易不是合法的 base64: {0}")]
    Base64(#[source] base64::DecodeError),
    #[error("聚合器交易反序列化失败: {0}")]
    Malformed(#[source] DecodeError),
    #[error("聚合器交易末尾多出 {0} 字节")]
    TrailingBytes(usize),
    #[error("交易序列化失败: {0}")]
    Serialize(#[source] EncodeError),
    #[error("交易长度 {len} 字节，超过单包上限 {max}", max = PACKET_DATA_SIZE)]
    Oversized { len: usize },
}

/// 解析聚合器 swap 接口返回的 `swapTransaction`。
pub fn decode_aggregator_transaction(encoded: &str) -> Result<VersionedTransaction, WireError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(WireError::Base64)?;
    let (tx, consumed) = decode_from_slice::<VersionedTransaction, _>(&bytes, wire_config())
        .map_err(WireError::Malformed)?;
    if consumed != bytes.len() {
        return Err(WireError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(tx)
}

/// 组装结果超过单包上限时拒绝输出，这样的交易无法上链。
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, WireError> {
    let bytes = encode_to_vec(tx, wire_config()).map_err(WireError::Serialize)?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(WireError::Oversized { len: bytes.len() });
    }
    Ok(BASE64_STANDARD.encode(bytes))
}

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::{AccountMeta, Instruction};
    use solana_sdk::message::{VersionedMessage, v0};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;

    fn unsigned(payer: Pubkey, data: Vec<u8>, blockhash: Hash) -> VersionedTransaction {
        let instruction = Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![AccountMeta::new(Pubkey::new_unique(), false)],
            data,
        };
        let message = v0::Message::try_compile(&payer, &[instruction], &[], blockhash).unwrap();
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        }
    }

    #[test]
    fn aggregator_payload_with_whitespace_decodes() {
        let payer = Pubkey::new_unique();
        let blockhash = Hash::new_unique();
        let tx = unsigned(payer, vec![9, 8, 7], blockhash);

        let encoded = encode_transaction(&tx).expect("encode");
        let decoded = decode_aggregator_transaction(&format!(" {encoded}\n")).expect("decode");
        assert_eq!(decoded.message.static_account_keys()[0], payer);
        assert_eq!(*decoded.message.recent_blockhash(), blockhash);
        assert_eq!(decoded.message.instructions()[0].data, vec![9, 8, 7]);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_aggregator_transaction("not base64!"),
            Err(WireError::Base64(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let tx = unsigned(Pubkey::new_unique(), vec![1], Hash::new_unique());
        let mut bytes = encode_to_vec(&tx, wire_config()).unwrap();
        bytes.extend_from_slice(&[0, 0, 0]);
        let padded = BASE64_STANDARD.encode(bytes);
        assert!(matches!(
            decode_aggregator_transaction(&padded),
            Err(WireError::TrailingBytes(3))
        ));
    }

    #[test]
    fn oversized_transaction_is_refused() {
        let tx = unsigned(Pubkey::new_unique(), vec![0; PACKET_DATA_SIZE], Hash::new_unique());
        assert!(matches!(
            encode_transaction(&tx),
            Err(WireError::Oversized { len }) if len > PACKET_DATA_SIZE
        ));
    }
}
