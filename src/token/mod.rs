//! 代币模型：描述符、角色分类与原始单位换算。

use std::collections::HashMap;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::api::serde_helpers::field_as_string;

pub const USDC_MINT: Pubkey = solana_sdk::pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
pub const WSOL_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

pub const USDC_DECIMALS: u8 = 6;
pub const WSOL_DECIMALS: u8 = 9;
pub const IVY_DECIMALS: u8 = 9;
pub const GAME_DECIMALS: u8 = 9;

/// 代币描述符，来自配置或 token list 数据，构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    #[serde(rename = "address", alias = "mint", with = "field_as_string")]
    pub mint: Pubkey,
    pub decimals: u8,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, rename = "logoURI", alias = "icon")]
    pub icon: Option<String>,
}

impl TokenDescriptor {
    pub fn new(mint: Pubkey, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            mint,
            decimals,
            symbol: symbol.into(),
            icon: None,
        }
    }

    pub fn usdc() -> Self {
        Self::new(USDC_MINT, USDC_DECIMALS, "USDC")
    }

    pub fn wsol() -> Self {
        Self::new(WSOL_MINT, WSOL_DECIMALS, "SOL")
    }

    pub fn ivy(mint: Pubkey) -> Self {
        Self::new(mint, IVY_DECIMALS, "IVY")
    }

    pub fn game(mint: Pubkey, symbol: impl Into<String>) -> Self {
        Self::new(mint, GAME_DECIMALS, symbol)
    }

    /// 十进制数量转原始单位，向下取整；负数或溢出返回 `None`。
    pub fn to_raw(&self, amount: Decimal) -> Option<u64> {
        to_raw_units(amount, self.decimals)
    }
}

impl fmt::Display for TokenDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{}", self.mint)
        } else {
            write!(f, "{}({})", self.symbol, self.mint)
        }
    }
}

fn scale_factor(decimals: u8) -> Option<Decimal> {
    Decimal::TEN.checked_powu(decimals as u64)
}

pub fn to_raw_units(amount: Decimal, decimals: u8) -> Option<u64> {
    if amount.is_sign_negative() {
        return None;
    }
    amount
        .checked_mul(scale_factor(decimals)?)?
        .floor()
        .to_u64()
}

pub fn from_raw_units(raw: u64, decimals: u8) -> Option<Decimal> {
    Decimal::from(raw).checked_div(scale_factor(decimals)?)
}

/// 路由视角下的代币角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRole {
    /// 当前交易的游戏代币
    Game,
    /// 世界曲线代币
    Ivy,
    /// 稳定币中转
    Usdc,
    Other,
}

/// 决定角色分类所需的特殊 mint；没有当前游戏时不存在 Game 角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUniverse {
    pub ivy_mint: Pubkey,
    pub usdc_mint: Pubkey,
    pub game_mint: Option<Pubkey>,
}

impl TokenUniverse {
    pub fn new(ivy_mint: Pubkey, game_mint: Option<Pubkey>) -> Self {
        Self {
            ivy_mint,
            usdc_mint: USDC_MINT,
            game_mint,
        }
    }

    pub fn classify(&self, mint: &Pubkey) -> TokenRole {
        if self.game_mint.as_ref() == Some(mint) {
            TokenRole::Game
        } else if *mint == self.ivy_mint {
            TokenRole::Ivy
        } else if *mint == self.usdc_mint {
            TokenRole::Usdc
        } else {
            TokenRole::Other
        }
    }
}

/// 单次兑换的代币对。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPair {
    pub input: TokenDescriptor,
    pub output: TokenDescriptor,
}

impl SwapPair {
    pub fn new(input: TokenDescriptor, output: TokenDescriptor) -> Self {
        Self { input, output }
    }
}

/// 按 mint 索引的描述符表，内置 USDC / SOL / IVY。
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_mint: HashMap<Pubkey, TokenDescriptor>,
}

impl TokenRegistry {
    pub fn with_defaults(ivy_mint: Pubkey) -> Self {
        let mut registry = Self::default();
        registry.insert(TokenDescriptor::usdc());
        registry.insert(TokenDescriptor::wsol());
        registry.insert(TokenDescriptor::ivy(ivy_mint));
        registry
    }

    pub fn insert(&mut self, descriptor: TokenDescriptor) {
        self.by_mint.insert(descriptor.mint, descriptor);
    }

    pub fn extend<I>(&mut self, descriptors: I)
    where
        I: IntoIterator<Item = TokenDescriptor>,
    {
        for descriptor in descriptors {
            self.insert(descriptor);
        }
    }

    pub fn get(&self, mint: &Pubkey) -> Option<&TokenDescriptor> {
        self.by_mint.get(mint)
    }

    pub fn len(&self) -> usize {
        self.by_mint.len()
    }

    /// 解析 Jupiter token list 格式（`address`/`decimals`/`symbol`/`logoURI`）。
    pub fn load_token_list(&mut self, json: &str) -> Result<usize, serde_json::Error> {
        let descriptors: Vec<TokenDescriptor> = serde_json::from_str(json)?;
        let count = descriptors.len();
        self.extend(descriptors);
        Ok(count)
    }
}
