use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::args::{Cli, Command, FeesArgs, PairArgs, QuoteArgs, ComposeArgs};
use crate::cli::context::{
    MarketSnapshot, build_composer, build_fee_feed, build_http_client, build_jupiter_client,
    build_registry, lookup_token,
};
use crate::config::AppConfig;
use crate::engine::{Quote, QuoteEngine, QuoteParams, SqrtCurveQuoter};
use crate::instructions::ivy::IvyProgram;
use crate::token::SwapPair;
use crate::transaction::encode_transaction;

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    if config.prometheus.enable {
        crate::monitoring::try_init_prometheus(&config.prometheus.listen)?;
    }

    match cli.command {
        Command::Route(args) => handle_route(&config, &args.pair),
        Command::Quote(args) => {
            let quote = quote_once(&config, &args, false).await?;
            print_quote(quote.as_ref());
            Ok(())
        }
        Command::Compose(args) => handle_compose(&config, args).await,
        Command::Fees(args) => handle_fees(&config, args).await,
    }
}

struct ResolvedPair {
    program: IvyProgram,
    market: MarketSnapshot,
    tokens: SwapPair,
}

fn resolve_pair(config: &AppConfig, pair: &PairArgs) -> Result<ResolvedPair> {
    let program = IvyProgram::new(config.require_program_id()?);
    let market = MarketSnapshot::load(pair.market.as_deref())?;
    let registry = build_registry(config, program.ivy_mint, pair.token_list.as_deref(), &market)?;
    let tokens = SwapPair::new(
        lookup_token(&registry, &pair.input)?,
        lookup_token(&registry, &pair.output)?,
    );
    Ok(ResolvedPair {
        program,
        market,
        tokens,
    })
}

fn quote_params(resolved: &ResolvedPair, args: &QuoteArgs) -> QuoteParams {
    QuoteParams {
        caller: args.wallet,
        game: resolved.market.game.as_ref().map(|game| game.context()),
        input: resolved.tokens.input.clone(),
        output: resolved.tokens.output.clone(),
        input_amount: args.amount,
        output_amount: Default::default(),
        slippage_bps: args.slippage_bps,
        world_reserves: resolved.market.world.clone(),
        refresh_generation: 0,
    }
}

fn handle_route(config: &AppConfig, pair: &PairArgs) -> Result<()> {
    let resolved = resolve_pair(config, pair)?;
    let game_mint = resolved.market.game.as_ref().map(|game| game.mint);
    let universe = crate::token::TokenUniverse::new(resolved.program.ivy_mint, game_mint);
    let route = crate::route::resolve(&universe, &resolved.tokens.input, &resolved.tokens.output)?;
    let shape = route.shape();
    let (input_role, output_role) = route.roles();
    let legs: Vec<&str> = route.legs().iter().map(|leg| leg.as_str()).collect();
    let output = json!({
        "input": resolved.tokens.input.symbol,
        "input_role": format!("{input_role:?}"),
        "output": resolved.tokens.output.symbol,
        "output_role": format!("{output_role:?}"),
        "route": route.to_string(),
        "legs": legs,
        "aggregator_legs": route.aggregator_legs(),
        "shape": shape.to_string(),
        "instruction": shape.instruction_name(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// `with_composer` 为真时挂接交易组装器，报价随后可组装交易。
async fn quote_once(
    config: &AppConfig,
    args: &QuoteArgs,
    with_composer: bool,
) -> Result<Option<Quote>> {
    let resolved = resolve_pair(config, &args.pair)?;
    let http = build_http_client(config)?;
    let jupiter = Arc::new(build_jupiter_client(config, http.clone()));
    let options = jupiter.quote_options().clone();

    let mut engine = QuoteEngine::new(
        resolved.program.ivy_mint,
        Arc::new(SqrtCurveQuoter),
        jupiter.clone(),
        options,
    );
    if with_composer {
        let fees = build_fee_feed(config, http);
        let composer = build_composer(config, resolved.program.clone(), jupiter, fees);
        engine = engine.with_composer(Arc::new(composer));
    }

    let params = quote_params(&resolved, args);
    let cancel = CancellationToken::new();
    Ok(engine.get_quote(&params, &cancel).await?)
}

fn quote_json(quote: &Quote) -> serde_json::Value {
    json!({
        "route": quote.route.to_string(),
        "instruction": quote.instruction,
        "input": quote.input.to_string(),
        "input_usd": quote.input_usd.map(|usd| usd.to_string()),
        "output": quote.output.to_string(),
        "output_usd": quote.output_usd.map(|usd| usd.to_string()),
        "min_output": quote.min_output.to_string(),
        "max_input": quote.max_input.to_string(),
        "price_impact_bps": quote.price_impact_bps.to_string(),
        "slippage_bps": quote.slippage_bps,
        "stops": quote.stops,
    })
}

fn print_quote(quote: Option<&Quote>) {
    match quote {
        Some(quote) => match serde_json::to_string_pretty(&quote_json(quote)) {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(target: "cli", error = %err, "报价序列化失败"),
        },
        None => println!("null"),
    }
}

async fn handle_compose(config: &AppConfig, args: ComposeArgs) -> Result<()> {
    if args.quote.wallet.is_none() {
        return Err(anyhow!("compose 需要 --wallet"));
    }
    let Some(quote) = quote_once(config, &args.quote, true).await? else {
        return Err(anyhow!("当前路线没有可用报价"));
    };
    let composed = match quote.get_transaction().await {
        Ok(composed) => composed,
        Err(err) => {
            if err.is_invariant_violation() {
                error!(target: "cli", error = %err, "组装前提不成立，重试无效");
            }
            return Err(err.into());
        }
    };
    let encoded = encode_transaction(&composed.transaction)?;
    info!(
        target: "cli",
        instruction = composed.instruction,
        last_valid_block_height = composed.last_valid_block_height,
        "交易组装完成"
    );

    if args.json {
        let mut output = quote_json(&quote);
        output["transaction"] = json!(encoded);
        output["last_valid_block_height"] = json!(composed.last_valid_block_height);
        output["context_slot"] = json!(composed.context_slot);
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{encoded}");
    }
    Ok(())
}

async fn handle_fees(config: &AppConfig, args: FeesArgs) -> Result<()> {
    let http = build_http_client(config)?;
    let feed = build_fee_feed(config, http);
    feed.provide(&args.instruction, args.transaction);
    match args.watch_secs {
        Some(secs) => {
            let handle = feed.start();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!(target: "cli", "收到终止信号，停止刷新");
                }
            }
            feed.stop();
            if let Err(err) = handle.await {
                warn!(target: "cli", error = %err, "优先费刷新任务异常退出");
            }
        }
        None => {
            if !feed.tick().await {
                warn!(target: "cli", instruction = %args.instruction, "没有可估算的交易");
            }
        }
    }
    let output = json!({
        "instruction": args.instruction,
        "micro_lamports": feed.get_for(&args.instruction),
        "default_micro_lamports": feed.default_micro_lamports(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
