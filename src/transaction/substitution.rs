//! 占位身份替换：输出端聚合器腿以大额 USDC 持有者构建，再改写为调用方。

use std::collections::HashMap;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use super::message::rewrite_instruction_accounts;
use crate::cache::associated_token_address;
use crate::config::PlaceholderConfig;
use crate::instructions::token::{
    closed_account, create_ata_idempotent, is_jupiter_create_token_account, is_jupiter_route,
};
use crate::token::{USDC_MINT, WSOL_MINT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderIdentity {
    pub owner: Pubkey,
    pub wsol_account: Pubkey,
}

impl From<&PlaceholderConfig> for PlaceholderIdentity {
    fn from(config: &PlaceholderConfig) -> Self {
        Self {
            owner: config.owner,
            wsol_account: config.wsol_account,
        }
    }
}

/// 占位账户 → 调用方账户。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSubstitutionMap {
    entries: HashMap<Pubkey, Pubkey>,
}

impl AccountSubstitutionMap {
    pub fn new(placeholder: &PlaceholderIdentity, caller: &Pubkey, output_mint: &Pubkey) -> Self {
        let mut entries = HashMap::with_capacity(4);
        entries.insert(placeholder.owner, *caller);
        entries.insert(
            associated_token_address(&placeholder.owner, &USDC_MINT),
            associated_token_address(caller, &USDC_MINT),
        );
        entries.insert(
            associated_token_address(&placeholder.owner, output_mint),
            associated_token_address(caller, output_mint),
        );
        entries.insert(
            placeholder.wsol_account,
            associated_token_address(caller, &WSOL_MINT),
        );
        Self { entries }
    }

    pub fn apply(&self, instructions: &mut [Instruction]) {
        rewrite_instruction_accounts(instructions, &self.entries);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRewrite {
    pub instructions: Vec<Instruction>,
    /// 聚合器关闭了占位 WSOL 账户，调用方需要 WSOL ATA
    pub requires_wsol: bool,
}

/// 改写以占位身份构建的指令序列。
///
/// 找不到聚合器路由指令时返回 `None`。
pub fn transform_placeholder(
    instructions: Vec<Instruction>,
    placeholder: &PlaceholderIdentity,
    caller: &Pubkey,
    output_mint: &Pubkey,
) -> Option<PlaceholderRewrite> {
    let mut requires_wsol = false;
    let mut kept = Vec::with_capacity(instructions.len() + 2);
    for ix in instructions {
        if is_jupiter_create_token_account(&ix) {
            debug!(
                target: "transaction::composer",
                "移除聚合器的 create_token_account 指令"
            );
            continue;
        }
        if let Some(closed) = closed_account(&ix) {
            if closed == placeholder.wsol_account {
                requires_wsol = true;
            } else {
                warn!(
                    target: "transaction::composer",
                    account = %closed,
                    "聚合器交易关闭了非预期账户"
                );
            }
        }
        kept.push(ix);
    }

    AccountSubstitutionMap::new(placeholder, caller, output_mint).apply(&mut kept);

    let route_index = kept.iter().position(is_jupiter_route)?;
    let mut prelude = Vec::with_capacity(2);
    if requires_wsol && *output_mint != WSOL_MINT {
        prelude.push(create_ata_idempotent(caller, caller, &WSOL_MINT));
    }
    prelude.push(create_ata_idempotent(caller, caller, output_mint));
    kept.splice(route_index..route_index, prelude);

    Some(PlaceholderRewrite {
        instructions: kept,
        requires_wsol,
    })
}
