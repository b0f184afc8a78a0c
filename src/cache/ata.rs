use dashmap::DashMap;
use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;

static ATA_MEMO: Lazy<DashMap<(Pubkey, Pubkey, Pubkey), Pubkey>> = Lazy::new(DashMap::new);

/// 经典 SPL Token 程序下的 ATA。
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    cached_associated_token_address(owner, mint, &spl_token::id())
}

/// 纯推导结果，进程内记忆化。
pub fn cached_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Pubkey {
    let key = (*owner, *mint, *token_program);
    if let Some(hit) = ATA_MEMO.get(&key) {
        return *hit;
    }
    let address = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &spl_associated_token_account::id(),
    )
    .0;
    ATA_MEMO.insert(key, address);
    address
}
