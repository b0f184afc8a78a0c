use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");

const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;

pub fn compute_unit_limit_instruction(limit: u32) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_limit(limit)
}

pub fn compute_unit_price_instruction(price_micro_lamports: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(price_micro_lamports)
}

pub fn is_compute_budget(ix: &Instruction) -> bool {
    ix.program_id == COMPUTE_BUDGET_PROGRAM_ID
}

/// 解析 SetComputeUnitLimit 的上限值。
pub fn parse_compute_unit_limit(ix: &Instruction) -> Option<u32> {
    if !is_compute_budget(ix) || ix.data.first() != Some(&SET_COMPUTE_UNIT_LIMIT_TAG) {
        return None;
    }
    let bytes: [u8; 4] = ix.data.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

pub fn parse_compute_unit_price(ix: &Instruction) -> Option<u64> {
    if !is_compute_budget(ix) || ix.data.first() != Some(&SET_COMPUTE_UNIT_PRICE_TAG) {
        return None;
    }
    let bytes: [u8; 8] = ix.data.get(1..9)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// 在第一条 SetComputeUnitLimit 上追加 `extra` 个计算单元，返回是否找到该指令。
pub fn bump_compute_unit_limit(instructions: &mut [Instruction], extra: u32) -> bool {
    for ix in instructions.iter_mut() {
        if let Some(limit) = parse_compute_unit_limit(ix) {
            *ix = compute_unit_limit_instruction(limit.saturating_add(extra));
            return true;
        }
    }
    false
}

pub fn has_compute_unit_price(instructions: &[Instruction]) -> bool {
    instructions
        .iter()
        .any(|ix| parse_compute_unit_price(ix).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_use_expected_layout() {
        let limit = compute_unit_limit_instruction(200_000);
        assert_eq!(limit.program_id, COMPUTE_BUDGET_PROGRAM_ID);
        assert_eq!(limit.data[0], 2);
        assert_eq!(parse_compute_unit_limit(&limit), Some(200_000));

        let price = compute_unit_price_instruction(30_000);
        assert_eq!(price.data[0], 3);
        assert_eq!(parse_compute_unit_price(&price), Some(30_000));
        assert_eq!(parse_compute_unit_limit(&price), None);
    }

    #[test]
    fn bump_touches_only_first_limit() {
        let mut instructions = vec![
            compute_unit_price_instruction(1),
            compute_unit_limit_instruction(300_000),
            compute_unit_limit_instruction(10),
        ];
        assert!(bump_compute_unit_limit(&mut instructions, 160_000));
        assert_eq!(parse_compute_unit_limit(&instructions[1]), Some(460_000));
        assert_eq!(parse_compute_unit_limit(&instructions[2]), Some(10));
        assert!(has_compute_unit_price(&instructions));

        let mut none = vec![compute_unit_price_instruction(1)];
        assert!(!bump_compute_unit_limit(&mut none, 80_000));
        assert!(!has_compute_unit_price(&[compute_unit_limit_instruction(1)]));
    }
}
