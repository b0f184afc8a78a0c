use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

#[derive(Parser, Debug)]
#[command(name = "ivy-swap", version, about = "IVY 兑换路由解析与交易组装")]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 ivy-swap.toml 或 config/ivy-swap.toml）"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 只解析路线，不访问网络
    Route(RouteArgs),
    /// 计算报价
    Quote(QuoteArgs),
    /// 计算报价并组装未签名交易
    Compose(ComposeArgs),
    /// 对给定交易做一次优先费估算
    Fees(FeesArgs),
}

#[derive(Args, Debug)]
pub struct PairArgs {
    #[arg(long, value_name = "MINT", help = "输入代币 mint")]
    pub input: Pubkey,
    #[arg(long, value_name = "MINT", help = "输出代币 mint")]
    pub output: Pubkey,
    #[arg(
        long,
        value_name = "FILE",
        help = "市场快照 JSON（世界储备与可选的游戏数据）"
    )]
    pub market: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "额外的 token list JSON")]
    pub token_list: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RouteArgs {
    #[command(flatten)]
    pub pair: PairArgs,
}

#[derive(Args, Debug)]
pub struct QuoteArgs {
    #[command(flatten)]
    pub pair: PairArgs,
    #[arg(long, help = "输入数量（UI 单位）")]
    pub amount: Decimal,
    #[arg(long, default_value_t = 50u16, help = "滑点（bps），默认 50")]
    pub slippage_bps: u16,
    #[arg(long, value_name = "PUBKEY", help = "调用方钱包")]
    pub wallet: Option<Pubkey>,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    #[command(flatten)]
    pub quote: QuoteArgs,
    #[arg(long, help = "以 JSON 形式输出交易及报价")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FeesArgs {
    #[arg(long, help = "指令名称，作为优先费条目键")]
    pub instruction: String,
    #[arg(long, value_name = "BASE64", help = "用于估算的交易（base64）")]
    pub transaction: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "持续运行刷新循环的秒数，省略时只估算一次"
    )]
    pub watch_secs: Option<u64>,
}
