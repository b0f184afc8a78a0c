use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

/// `/prices?list_address=` 响应：`{"prices": {mint: number | null}}`。
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    #[serde(default)]
    pub prices: HashMap<String, Option<f64>>,
}

impl PriceResponse {
    /// 按请求顺序取单价，缺失或无法表示的价格视为 0。
    pub fn unit_prices(&self, mints: &[Pubkey]) -> HashMap<Pubkey, Decimal> {
        mints
            .iter()
            .map(|mint| {
                let price = self
                    .prices
                    .get(&mint.to_string())
                    .copied()
                    .flatten()
                    .and_then(|value| Decimal::try_from(value).ok())
                    .unwrap_or(Decimal::ZERO);
                (*mint, price)
            })
            .collect()
    }
}

pub fn list_address_param(mints: &[Pubkey]) -> String {
    mints
        .iter()
        .map(|mint| mint.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn missing_prices_become_zero() {
        let known = Pubkey::new_unique();
        let absent = Pubkey::new_unique();
        let nulled = Pubkey::new_unique();
        let body = format!(r#"{{"prices":{{"{known}":1.25,"{nulled}":null}}}}"#);
        let response: PriceResponse = serde_json::from_str(&body).unwrap();
        let prices = response.unit_prices(&[known, absent, nulled]);
        assert_eq!(prices[&known], Decimal::from_str("1.25").unwrap());
        assert_eq!(prices[&absent], Decimal::ZERO);
        assert_eq!(prices[&nulled], Decimal::ZERO);
        assert_eq!(list_address_param(&[known, absent]), format!("{known},{absent}"));
    }
}
