//! SPL Token 与 Jupiter 指令识别，及幂等 ATA 创建。

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_system_interface::program::ID as SYSTEM_PROGRAM_ID;

use crate::cache::associated_token_address;

pub const JUPITER_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

pub const JUPITER_ROUTE_TAG: [u8; 8] = [0xe5, 0x17, 0xcb, 0x97, 0x7a, 0xe3, 0xad, 0x2a];
pub const JUPITER_SHARED_ACCOUNTS_ROUTE_TAG: [u8; 8] =
    [0xc1, 0x20, 0x9b, 0x33, 0x41, 0xd6, 0x9c, 0x81];
pub const JUPITER_CREATE_TOKEN_ACCOUNT_TAG: [u8; 8] =
    [0x93, 0xf1, 0x7b, 0x64, 0xf4, 0x84, 0xae, 0x76];

const CLOSE_ACCOUNT_TAG: u8 = 9;
const CREATE_IDEMPOTENT_TAG: u8 = 1;
fn jupiter_tag(ix: &Instruction) -> Option<&[u8]> {
    if ix.program_id != JUPITER_PROGRAM_ID {
        return None;
    }
    ix.data.get(..8)
}

/// Jupiter `route` 或 `shared_accounts_route`。
pub fn is_jupiter_route(ix: &Instruction) -> bool {
    jupiter_tag(ix)
        .is_some_and(|tag| tag == JUPITER_ROUTE_TAG || tag == JUPITER_SHARED_ACCOUNTS_ROUTE_TAG)
}

pub fn is_jupiter_create_token_account(ix: &Instruction) -> bool {
    jupiter_tag(ix).is_some_and(|tag| tag == JUPITER_CREATE_TOKEN_ACCOUNT_TAG)
}

/// SPL Token CloseAccount 所关闭的账户。
pub fn closed_account(ix: &Instruction) -> Option<Pubkey> {
    if ix.program_id != spl_token::id() || ix.data.first() != Some(&CLOSE_ACCOUNT_TAG) {
        return None;
    }
    ix.accounts.first().map(|meta| meta.pubkey)
}

/// 幂等创建 `owner` 在 `mint` 下的 ATA，由 `payer` 付租金。
pub fn create_ata_idempotent(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    let ata = associated_token_address(owner, mint);
    Instruction {
        program_id: spl_associated_token_account::id(),
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: vec![CREATE_IDEMPOTENT_TAG],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jupiter_ix(tag: [u8; 8]) -> Instruction {
        let mut data = tag.to_vec();
        data.extend_from_slice(&[0u8; 12]);
        Instruction {
            program_id: JUPITER_PROGRAM_ID,
            accounts: Vec::new(),
            data,
        }
    }

    #[test]
    fn recognises_jupiter_instructions() {
        assert!(is_jupiter_route(&jupiter_ix(JUPITER_ROUTE_TAG)));
        assert!(is_jupiter_route(&jupiter_ix(JUPITER_SHARED_ACCOUNTS_ROUTE_TAG)));
        assert!(!is_jupiter_route(&jupiter_ix(JUPITER_CREATE_TOKEN_ACCOUNT_TAG)));
        assert!(is_jupiter_create_token_account(&jupiter_ix(
            JUPITER_CREATE_TOKEN_ACCOUNT_TAG
        )));

        let mut foreign = jupiter_ix(JUPITER_ROUTE_TAG);
        foreign.program_id = Pubkey::new_unique();
        assert!(!is_jupiter_route(&foreign));
    }

    #[test]
    fn close_account_reports_first_key() {
        let target = Pubkey::new_unique();
        let ix = Instruction {
            program_id: spl_token::id(),
            accounts: vec![
                AccountMeta::new(target, false),
                AccountMeta::new(Pubkey::new_unique(), false),
                AccountMeta::new_readonly(Pubkey::new_unique(), true),
            ],
            data: vec![CLOSE_ACCOUNT_TAG],
        };
        assert_eq!(closed_account(&ix), Some(target));

        let transfer = Instruction {
            data: vec![3, 0, 0, 0, 0, 0, 0, 0, 0],
            ..ix
        };
        assert_eq!(closed_account(&transfer), None);
    }

    #[test]
    fn idempotent_ata_layout() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = create_ata_idempotent(&payer, &payer, &mint);
        assert_eq!(ix.data, vec![1]);
        assert_eq!(ix.accounts.len(), 6);
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, associated_token_address(&payer, &mint));
        assert_eq!(ix.accounts[3].pubkey, mint);
    }
}
