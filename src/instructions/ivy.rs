//! IVY 链上程序：PDA 推导与八种兑换指令。
//!
//! 指令数据 = 8 字节小端判别符 + borsh 参数；Mix 指令之后再拼接 Jupiter 的数据与账户。

use borsh::BorshSerialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_system_interface::program::ID as SYSTEM_PROGRAM_ID;
use thiserror::Error;

use crate::cache::associated_token_address;
use crate::token::USDC_MINT;

pub const GAME_SWAP_DISCRIMINATOR: u64 = 0x3fa6_7d35_1a55_77e6;
pub const WORLD_SWAP_DISCRIMINATOR: u64 = 0xbce7_cc4a_1408_2dc2;
pub const MIX_USDC_TO_GAME_DISCRIMINATOR: u64 = 0xed79_b793_0664_ca70;
pub const MIX_GAME_TO_USDC_DISCRIMINATOR: u64 = 0x7c9b_81c2_34b7_2e58;
pub const MIX_ANY_TO_GAME_DISCRIMINATOR: u64 = 0x0b24_3faf_1bf7_de05;
pub const MIX_GAME_TO_ANY_DISCRIMINATOR: u64 = 0x1b7f_3c9a_2d8e_4051;
pub const MIX_ANY_TO_IVY_DISCRIMINATOR: u64 = 0x3a61_c3f4_f2ec_5d1b;
pub const MIX_IVY_TO_ANY_DISCRIMINATOR: u64 = 0x2f8a_2e71_8bf6_c149;

#[derive(Debug, Error)]
pub enum IvyInstructionError {
    #[error("无法推导游戏 {game} 的 {seed} 地址")]
    GameAddress { game: Pubkey, seed: &'static str },
    #[error("序列化指令参数失败: {0}")]
    Encode(#[from] std::io::Error),
}

/// 与 C 结构体对齐：两个 bool 之后补 6 字节。
#[derive(BorshSerialize)]
struct SwapArgs {
    amount: u64,
    threshold: u64,
    is_buy: bool,
    create_dest: bool,
    padding: [u8; 6],
}

#[derive(BorshSerialize)]
struct AmountThresholdArgs {
    amount: u64,
    threshold: u64,
}

#[derive(BorshSerialize)]
struct ThresholdArgs {
    threshold: u64,
}

fn encode<A: BorshSerialize>(
    discriminator: u64,
    args: &A,
    trailing: &[u8],
) -> Result<Vec<u8>, IvyInstructionError> {
    let mut data = Vec::with_capacity(8 + 24 + trailing.len());
    data.extend_from_slice(&discriminator.to_le_bytes());
    args.serialize(&mut data)?;
    data.extend_from_slice(trailing);
    Ok(data)
}

/// 单个游戏相关的地址。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameAddresses {
    pub game: Pubkey,
    pub mint: Pubkey,
    pub ivy_wallet: Pubkey,
    pub curve_wallet: Pubkey,
    pub treasury_wallet: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvyProgram {
    pub program_id: Pubkey,
    pub world: Pubkey,
    pub world_usdc_wallet: Pubkey,
    pub world_curve_wallet: Pubkey,
    pub ivy_mint: Pubkey,
    pub event_authority: Pubkey,
    pub usdc_mint: Pubkey,
}

impl IvyProgram {
    pub fn new(program_id: Pubkey) -> Self {
        let pda = |seed: &[u8]| Pubkey::find_program_address(&[seed], &program_id).0;
        Self {
            program_id,
            world: pda(b"world"),
            world_usdc_wallet: pda(b"world_usdc"),
            world_curve_wallet: pda(b"world_curve"),
            ivy_mint: pda(b"world_mint"),
            event_authority: pda(b"__event_authority"),
            usdc_mint: USDC_MINT,
        }
    }

    /// 游戏地址不带 bump 推导，落在曲线上时报错。
    pub fn game_addresses(&self, game: &Pubkey) -> Result<GameAddresses, IvyInstructionError> {
        let derive = |seed: &'static str| {
            Pubkey::create_program_address(&[seed.as_bytes(), game.as_ref()], &self.program_id)
                .map_err(|_| IvyInstructionError::GameAddress { game: *game, seed })
        };
        Ok(GameAddresses {
            game: *game,
            mint: derive("game_mint")?,
            ivy_wallet: derive("game_ivy_wallet")?,
            curve_wallet: derive("game_curve_wallet")?,
            treasury_wallet: derive("game_treasury_wallet")?,
        })
    }

    fn tail_programs(&self) -> [AccountMeta; 4] {
        [
            AccountMeta::new_readonly(self.program_id, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ]
    }

    fn instruction(&self, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    /// IVY ⇄ GAME。
    pub fn game_swap(
        &self,
        game: &GameAddresses,
        user: &Pubkey,
        amount: u64,
        threshold: u64,
        is_buy: bool,
    ) -> Result<Instruction, IvyInstructionError> {
        let user_ivy = associated_token_address(user, &self.ivy_mint);
        let user_game = associated_token_address(user, &game.mint);
        let (source, destination) = if is_buy {
            (user_ivy, user_game)
        } else {
            (user_game, user_ivy)
        };
        let [this_program, token_program, ata_program, system_program] = self.tail_programs();
        let accounts = vec![
            AccountMeta::new(game.game, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(source, false),
            AccountMeta::new(destination, false),
            AccountMeta::new(game.ivy_wallet, false),
            AccountMeta::new(game.curve_wallet, false),
            AccountMeta::new(game.treasury_wallet, false),
            AccountMeta::new_readonly(self.world, false),
            AccountMeta::new(self.ivy_mint, false),
            AccountMeta::new_readonly(game.mint, false),
            AccountMeta::new_readonly(self.event_authority, false),
            this_program,
            token_program,
            ata_program,
            system_program,
        ];
        let data = encode(
            GAME_SWAP_DISCRIMINATOR,
            &SwapArgs {
                amount,
                threshold,
                is_buy,
                create_dest: true,
                padding: [0; 6],
            },
            &[],
        )?;
        Ok(self.instruction(accounts, data))
    }

    /// USDC ⇄ IVY。
    pub fn world_swap(
        &self,
        user: &Pubkey,
        amount: u64,
        threshold: u64,
        is_buy: bool,
    ) -> Result<Instruction, IvyInstructionError> {
        let user_usdc = associated_token_address(user, &self.usdc_mint);
        let user_ivy = associated_token_address(user, &self.ivy_mint);
        let (source, destination, destination_mint) = if is_buy {
            (user_usdc, user_ivy, self.ivy_mint)
        } else {
            (user_ivy, user_usdc, self.usdc_mint)
        };
        let mut accounts = vec![
            AccountMeta::new(self.world, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(source, false),
            AccountMeta::new(destination, false),
            AccountMeta::new(self.world_usdc_wallet, false),
            AccountMeta::new(self.world_curve_wallet, false),
            AccountMeta::new_readonly(self.event_authority, false),
            AccountMeta::new_readonly(destination_mint, false),
        ];
        accounts.extend(self.tail_programs());
        let data = encode(
            WORLD_SWAP_DISCRIMINATOR,
            &SwapArgs {
                amount,
                threshold,
                is_buy,
                create_dest: true,
                padding: [0; 6],
            },
            &[],
        )?;
        Ok(self.instruction(accounts, data))
    }

    fn usdc_to_game_accounts(&self, game: &GameAddresses, user: &Pubkey) -> Vec<AccountMeta> {
        let [this_program, token_program, ata_program, system_program] = self.tail_programs();
        vec![
            AccountMeta::new(game.game, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(associated_token_address(user, &self.usdc_mint), false),
            AccountMeta::new(associated_token_address(user, &self.ivy_mint), false),
            AccountMeta::new(associated_token_address(user, &game.mint), false),
            AccountMeta::new(game.ivy_wallet, false),
            AccountMeta::new(game.curve_wallet, false),
            AccountMeta::new(game.treasury_wallet, false),
            AccountMeta::new(self.ivy_mint, false),
            AccountMeta::new(self.world, false),
            AccountMeta::new(self.world_usdc_wallet, false),
            AccountMeta::new(self.world_curve_wallet, false),
            AccountMeta::new_readonly(self.event_authority, false),
            this_program,
            token_program,
            AccountMeta::new_readonly(game.mint, false),
            ata_program,
            system_program,
        ]
    }

    fn game_to_usdc_accounts(&self, game: &GameAddresses, user: &Pubkey) -> Vec<AccountMeta> {
        let [this_program, token_program, ata_program, system_program] = self.tail_programs();
        vec![
            AccountMeta::new(game.game, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(associated_token_address(user, &game.mint), false),
            AccountMeta::new(associated_token_address(user, &self.ivy_mint), false),
            AccountMeta::new(associated_token_address(user, &self.usdc_mint), false),
            AccountMeta::new(game.ivy_wallet, false),
            AccountMeta::new(game.curve_wallet, false),
            AccountMeta::new(game.treasury_wallet, false),
            AccountMeta::new(self.ivy_mint, false),
            AccountMeta::new_readonly(self.usdc_mint, false),
            AccountMeta::new(self.world, false),
            AccountMeta::new(self.world_usdc_wallet, false),
            AccountMeta::new(self.world_curve_wallet, false),
            AccountMeta::new_readonly(self.event_authority, false),
            this_program,
            AccountMeta::new_readonly(game.mint, false),
            token_program,
            ata_program,
            system_program,
        ]
    }

    fn world_accounts(
        &self,
        user: &Pubkey,
        source_mint: &Pubkey,
        destination_mint: &Pubkey,
        mint_account: Pubkey,
    ) -> Vec<AccountMeta> {
        let mut accounts = vec![
            AccountMeta::new(self.world, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(associated_token_address(user, source_mint), false),
            AccountMeta::new(associated_token_address(user, destination_mint), false),
            AccountMeta::new(self.world_usdc_wallet, false),
            AccountMeta::new(self.world_curve_wallet, false),
            AccountMeta::new_readonly(self.event_authority, false),
            AccountMeta::new_readonly(mint_account, false),
        ];
        accounts.extend(self.tail_programs());
        accounts
    }

    /// USDC → IVY → GAME。
    pub fn mix_usdc_to_game(
        &self,
        game: &GameAddresses,
        user: &Pubkey,
        usdc_amount: u64,
        game_threshold: u64,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_USDC_TO_GAME_DISCRIMINATOR,
            &AmountThresholdArgs {
                amount: usdc_amount,
                threshold: game_threshold,
            },
            &[],
        )?;
        Ok(self.instruction(self.usdc_to_game_accounts(game, user), data))
    }

    /// GAME → IVY → USDC。
    pub fn mix_game_to_usdc(
        &self,
        game: &GameAddresses,
        user: &Pubkey,
        game_amount: u64,
        usdc_threshold: u64,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_GAME_TO_USDC_DISCRIMINATOR,
            &AmountThresholdArgs {
                amount: game_amount,
                threshold: usdc_threshold,
            },
            &[],
        )?;
        Ok(self.instruction(self.game_to_usdc_accounts(game, user), data))
    }

    /// * → USDC → IVY → GAME，`jupiter` 为 * → USDC 的路由指令。
    pub fn mix_any_to_game(
        &self,
        game: &GameAddresses,
        user: &Pubkey,
        game_threshold: u64,
        jupiter: &Instruction,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_ANY_TO_GAME_DISCRIMINATOR,
            &ThresholdArgs {
                threshold: game_threshold,
            },
            &jupiter.data,
        )?;
        let mut accounts = self.usdc_to_game_accounts(game, user);
        accounts.extend(jupiter.accounts.iter().cloned());
        Ok(self.instruction(accounts, data))
    }

    /// GAME → IVY → USDC → *，`jupiter` 为 USDC → * 的路由指令。
    pub fn mix_game_to_any(
        &self,
        game: &GameAddresses,
        user: &Pubkey,
        game_amount: u64,
        min_any_amount: u64,
        jupiter: &Instruction,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_GAME_TO_ANY_DISCRIMINATOR,
            &AmountThresholdArgs {
                amount: game_amount,
                threshold: min_any_amount,
            },
            &jupiter.data,
        )?;
        let mut accounts = self.game_to_usdc_accounts(game, user);
        accounts.extend(jupiter.accounts.iter().cloned());
        Ok(self.instruction(accounts, data))
    }

    /// * → USDC → IVY。
    pub fn mix_any_to_ivy(
        &self,
        user: &Pubkey,
        ivy_threshold: u64,
        jupiter: &Instruction,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_ANY_TO_IVY_DISCRIMINATOR,
            &ThresholdArgs {
                threshold: ivy_threshold,
            },
            &jupiter.data,
        )?;
        let mut accounts = self.world_accounts(user, &self.usdc_mint, &self.ivy_mint, self.ivy_mint);
        accounts.extend(jupiter.accounts.iter().cloned());
        Ok(self.instruction(accounts, data))
    }

    /// IVY → USDC → *。
    pub fn mix_ivy_to_any(
        &self,
        user: &Pubkey,
        ivy_amount: u64,
        min_any_amount: u64,
        jupiter: &Instruction,
    ) -> Result<Instruction, IvyInstructionError> {
        let data = encode(
            MIX_IVY_TO_ANY_DISCRIMINATOR,
            &AmountThresholdArgs {
                amount: ivy_amount,
                threshold: min_any_amount,
            },
            &jupiter.data,
        )?;
        let mut accounts =
            self.world_accounts(user, &self.ivy_mint, &self.usdc_mint, self.usdc_mint);
        accounts.extend(jupiter.accounts.iter().cloned());
        Ok(self.instruction(accounts, data))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 找一个所有游戏 PDA 都可推导的游戏地址。
    pub(crate) fn derivable_game(program: &IvyProgram) -> (Pubkey, GameAddresses) {
        loop {
            let game = Pubkey::new_unique();
            if let Ok(addresses) = program.game_addresses(&game) {
                return (game, addresses);
            }
        }
    }

    fn read_u64(data: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
    }

    #[test]
    fn game_swap_layout() {
        let program = IvyProgram::new(Pubkey::new_unique());
        let (_, game) = derivable_game(&program);
        let user = Pubkey::new_unique();
        let ix = program.game_swap(&game, &user, 1_000, 900, true).unwrap();

        assert_eq!(ix.data.len(), 32);
        assert_eq!(read_u64(&ix.data, 0), GAME_SWAP_DISCRIMINATOR);
        assert_eq!(read_u64(&ix.data, 8), 1_000);
        assert_eq!(read_u64(&ix.data, 16), 900);
        assert_eq!(ix.data[24], 1);
        assert_eq!(ix.data[25], 1);
        assert_eq!(&ix.data[26..], &[0u8; 6]);

        assert_eq!(ix.accounts.len(), 15);
        assert!(ix.accounts[1].is_signer);
        assert_eq!(
            ix.accounts[2].pubkey,
            associated_token_address(&user, &program.ivy_mint)
        );
        assert_eq!(
            ix.accounts[3].pubkey,
            associated_token_address(&user, &game.mint)
        );
        assert!(!ix.accounts[7].is_writable);
        assert_eq!(ix.accounts[11].pubkey, program.program_id);
    }

    #[test]
    fn world_swap_sell_reverses_accounts() {
        let program = IvyProgram::new(Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let ix = program.world_swap(&user, 5, 4, false).unwrap();
        assert_eq!(read_u64(&ix.data, 0), WORLD_SWAP_DISCRIMINATOR);
        assert_eq!(ix.data[24], 0);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(
            ix.accounts[2].pubkey,
            associated_token_address(&user, &program.ivy_mint)
        );
        assert_eq!(ix.accounts[7].pubkey, USDC_MINT);
    }

    #[test]
    fn mix_instructions_append_jupiter_payload() {
        let program = IvyProgram::new(Pubkey::new_unique());
        let (_, game) = derivable_game(&program);
        let user = Pubkey::new_unique();
        let jupiter = Instruction {
            program_id: crate::instructions::token::JUPITER_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(Pubkey::new_unique(), false),
                AccountMeta::new_readonly(Pubkey::new_unique(), false),
            ],
            data: vec![0xe5, 0x17, 0xcb, 0x97, 0x7a, 0xe3, 0xad, 0x2a, 7, 7],
        };

        let any_to_game = program.mix_any_to_game(&game, &user, 42, &jupiter).unwrap();
        assert_eq!(read_u64(&any_to_game.data, 0), MIX_ANY_TO_GAME_DISCRIMINATOR);
        assert_eq!(read_u64(&any_to_game.data, 8), 42);
        assert_eq!(&any_to_game.data[16..], jupiter.data.as_slice());
        assert_eq!(any_to_game.accounts.len(), 18 + 2);
        assert_eq!(&any_to_game.accounts[18..], jupiter.accounts.as_slice());

        let game_to_any = program
            .mix_game_to_any(&game, &user, 10, 9, &jupiter)
            .unwrap();
        assert_eq!(read_u64(&game_to_any.data, 0), MIX_GAME_TO_ANY_DISCRIMINATOR);
        assert_eq!(read_u64(&game_to_any.data, 16), 9);
        assert_eq!(game_to_any.accounts.len(), 19 + 2);

        let any_to_ivy = program.mix_any_to_ivy(&user, 3, &jupiter).unwrap();
        assert_eq!(any_to_ivy.accounts.len(), 12 + 2);
        assert_eq!(any_to_ivy.accounts[7].pubkey, program.ivy_mint);

        let ivy_to_any = program.mix_ivy_to_any(&user, 3, 2, &jupiter).unwrap();
        assert_eq!(read_u64(&ivy_to_any.data, 0), MIX_IVY_TO_ANY_DISCRIMINATOR);
        assert_eq!(ivy_to_any.accounts[7].pubkey, USDC_MINT);
        assert_eq!(ivy_to_any.data.len(), 8 + 16 + jupiter.data.len());
    }

    #[test]
    fn direct_mix_layouts() {
        let program = IvyProgram::new(Pubkey::new_unique());
        let (_, game) = derivable_game(&program);
        let user = Pubkey::new_unique();
        let utg = program.mix_usdc_to_game(&game, &user, 1, 2).unwrap();
        assert_eq!(utg.data.len(), 24);
        assert_eq!(read_u64(&utg.data, 0), MIX_USDC_TO_GAME_DISCRIMINATOR);
        assert_eq!(utg.accounts.len(), 18);
        let gtu = program.mix_game_to_usdc(&game, &user, 1, 2).unwrap();
        assert_eq!(read_u64(&gtu.data, 0), MIX_GAME_TO_USDC_DISCRIMINATOR);
        assert_eq!(gtu.accounts[9].pubkey, USDC_MINT);
    }
}
