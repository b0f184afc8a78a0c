//! v0 消息的反编译与重新编译。

use std::collections::HashMap;

use solana_message::{
    CompileError, VersionedMessage, compiled_instruction::CompiledInstruction,
    v0::MessageAddressTableLookup,
};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{AddressLookupTableAccount, MessageHeader, v0};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstructionExtractionError {
    #[error("需要 {count} 个地址查找表，但尚未解析")]
    MissingLookupTables { count: usize },
    #[error("找不到地址查找表 {table}")]
    LookupTableNotFound { table: Pubkey },
    #[error("地址查找表 {table} 索引 {index} 超出范围 (len = {len})")]
    LookupIndexOutOfBounds {
        table: Pubkey,
        index: u8,
        len: usize,
    },
    #[error("指令 program index {index} 超出账户数量 {total}")]
    ProgramIndexOutOfBounds { index: usize, total: usize },
    #[error("指令 account index {index} 超出账户数量 {total}")]
    AccountIndexOutOfBounds { index: usize, total: usize },
}

#[derive(Debug, Clone)]
struct AccountKeyInfo {
    pubkey: Pubkey,
    is_signer: bool,
    is_writable: bool,
}

/// 按原顺序还原消息中的全部指令。
pub fn extract_instructions(
    message: &VersionedMessage,
    resolved_tables: Option<&[AddressLookupTableAccount]>,
) -> Result<Vec<Instruction>, InstructionExtractionError> {
    let account_keys = build_account_keys(message, resolved_tables)?;
    message
        .instructions()
        .iter()
        .map(|ix| convert_single_instruction(ix, &account_keys))
        .collect()
}

/// 消息引用的查找表地址。
pub fn lookup_table_keys(message: &VersionedMessage) -> Vec<Pubkey> {
    message
        .address_table_lookups()
        .map(|lookups| lookups.iter().map(|lookup| lookup.account_key).collect())
        .unwrap_or_default()
}

/// 以 `payer` 为付费者编译 v0 交易，签名位以空签名占位。
pub fn compile_unsigned_v0(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<VersionedTransaction, CompileError> {
    let message = v0::Message::try_compile(payer, instructions, tables, blockhash)?;
    let signers = message.header.num_required_signatures as usize;
    Ok(VersionedTransaction {
        signatures: vec![Signature::default(); signers],
        message: VersionedMessage::V0(message),
    })
}

/// 按映射表替换所有指令中的账户，未出现在表中的账户保持不变。
pub fn rewrite_instruction_accounts(
    instructions: &mut [Instruction],
    rewrites: &HashMap<Pubkey, Pubkey>,
) {
    if rewrites.is_empty() {
        return;
    }
    for ix in instructions {
        for account in &mut ix.accounts {
            if let Some(to) = rewrites.get(&account.pubkey) {
                account.pubkey = *to;
            }
        }
    }
}

fn build_account_keys(
    message: &VersionedMessage,
    resolved_tables: Option<&[AddressLookupTableAccount]>,
) -> Result<Vec<AccountKeyInfo>, InstructionExtractionError> {
    let header = message.header();
    let static_keys = message.static_account_keys();
    let static_total = static_keys.len();
    let mut infos: Vec<AccountKeyInfo> = static_keys
        .iter()
        .enumerate()
        .map(|(idx, pubkey)| AccountKeyInfo {
            pubkey: *pubkey,
            is_signer: is_signer(idx, header),
            is_writable: is_writable(idx, header, static_total),
        })
        .collect();

    let lookups = match message.address_table_lookups() {
        Some(lookups) if !lookups.is_empty() => lookups,
        _ => return Ok(infos),
    };
    let tables = resolved_tables.ok_or(InstructionExtractionError::MissingLookupTables {
        count: lookups.len(),
    })?;
    let table_map: HashMap<Pubkey, &AddressLookupTableAccount> =
        tables.iter().map(|table| (table.key, table)).collect();

    append_lookup_accounts(&mut infos, lookups, &table_map, true)?;
    append_lookup_accounts(&mut infos, lookups, &table_map, false)?;
    Ok(infos)
}

fn append_lookup_accounts(
    infos: &mut Vec<AccountKeyInfo>,
    lookups: &[MessageAddressTableLookup],
    table_map: &HashMap<Pubkey, &AddressLookupTableAccount>,
    writable: bool,
) -> Result<(), InstructionExtractionError> {
    for lookup in lookups {
        let table = table_map.get(&lookup.account_key).copied().ok_or(
            InstructionExtractionError::LookupTableNotFound {
                table: lookup.account_key,
            },
        )?;
        let indexes = if writable {
            &lookup.writable_indexes
        } else {
            &lookup.readonly_indexes
        };
        for index in indexes {
            let address = table.addresses.get(*index as usize).ok_or(
                InstructionExtractionError::LookupIndexOutOfBounds {
                    table: lookup.account_key,
                    index: *index,
                    len: table.addresses.len(),
                },
            )?;
            infos.push(AccountKeyInfo {
                pubkey: *address,
                is_signer: false,
                is_writable: writable,
            });
        }
    }
    Ok(())
}

fn convert_single_instruction(
    ix: &CompiledInstruction,
    account_keys: &[AccountKeyInfo],
) -> Result<Instruction, InstructionExtractionError> {
    let program_index = ix.program_id_index as usize;
    let program = account_keys.get(program_index).ok_or(
        InstructionExtractionError::ProgramIndexOutOfBounds {
            index: program_index,
            total: account_keys.len(),
        },
    )?;

    let accounts = ix
        .accounts
        .iter()
        .map(|account_index| {
            let idx = *account_index as usize;
            account_keys
                .get(idx)
                .map(|info| AccountMeta {
                    pubkey: info.pubkey,
                    is_signer: info.is_signer,
                    is_writable: info.is_writable,
                })
                .ok_or(InstructionExtractionError::AccountIndexOutOfBounds {
                    index: idx,
                    total: account_keys.len(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Instruction {
        program_id: program.pubkey,
        accounts,
        data: ix.data.clone(),
    })
}

fn is_signer(index: usize, header: &MessageHeader) -> bool {
    index < header.num_required_signatures as usize
}

fn is_writable(index: usize, header: &MessageHeader, total_keys: usize) -> bool {
    let num_required_signatures = header.num_required_signatures as usize;
    let writable_signed =
        num_required_signatures.saturating_sub(header.num_readonly_signed_accounts as usize);
    if index < num_required_signatures {
        return index < writable_signed;
    }

    let num_unsigned = total_keys.saturating_sub(num_required_signatures);
    let writable_unsigned =
        num_unsigned.saturating_sub(header.num_readonly_unsigned_accounts as usize);
    let unsigned_index = index.saturating_sub(num_required_signatures);
    unsigned_index < writable_unsigned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instructions(payer: &Pubkey, lookup: &[Pubkey]) -> Vec<Instruction> {
        vec![
            Instruction {
                program_id: Pubkey::new_unique(),
                accounts: vec![
                    AccountMeta::new(*payer, true),
                    AccountMeta::new(lookup[0], false),
                ],
                data: vec![1],
            },
            Instruction {
                program_id: Pubkey::new_unique(),
                accounts: vec![
                    AccountMeta::new_readonly(lookup[1], false),
                    AccountMeta::new(lookup[0], false),
                ],
                data: vec![2, 3],
            },
        ]
    }

    #[test]
    fn decompile_restores_order_and_flags() {
        let payer = Pubkey::new_unique();
        let lookup = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: lookup.clone(),
        };
        let original = sample_instructions(&payer, &lookup);
        let tx = compile_unsigned_v0(
            &payer,
            &original,
            std::slice::from_ref(&table),
            Hash::new_unique(),
        )
        .unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(lookup_table_keys(&tx.message), vec![table.key]);

        let restored =
            extract_instructions(&tx.message, Some(std::slice::from_ref(&table))).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn unresolved_lookup_tables_are_an_error() {
        let payer = Pubkey::new_unique();
        let lookup = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: lookup.clone(),
        };
        let tx = compile_unsigned_v0(
            &payer,
            &sample_instructions(&payer, &lookup),
            &[table],
            Hash::new_unique(),
        )
        .unwrap();

        assert!(matches!(
            extract_instructions(&tx.message, None),
            Err(InstructionExtractionError::MissingLookupTables { count: 1 })
        ));
        assert!(matches!(
            extract_instructions(&tx.message, Some(&[])),
            Err(InstructionExtractionError::LookupTableNotFound { .. })
        ));
        let truncated = AddressLookupTableAccount {
            key: lookup_table_keys(&tx.message)[0],
            addresses: vec![lookup[0]],
        };
        assert!(matches!(
            extract_instructions(&tx.message, Some(&[truncated])),
            Err(InstructionExtractionError::LookupIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn rewrite_replaces_only_mapped_accounts() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let untouched = Pubkey::new_unique();
        let mut instructions = vec![Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![
                AccountMeta::new(from, true),
                AccountMeta::new(untouched, false),
            ],
            data: vec![],
        }];
        rewrite_instruction_accounts(&mut instructions, &HashMap::from([(from, to)]));
        assert_eq!(instructions[0].accounts[0].pubkey, to);
        assert!(instructions[0].accounts[0].is_signer);
        assert_eq!(instructions[0].accounts[1].pubkey, untouched);
    }
}
