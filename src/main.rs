mod cache;
mod channel;
mod config;
mod coordinator;
mod error;
mod gacha;
mod i18n;
mod master;
mod pack;
mod rng;
mod search;
mod worker;

use cache::{StepCache, STEP_CACHE_CAPACITY};
use channel::{SearchEvent, SharedSearchState};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use coordinator::{Coordinator, SearchMode, SearchReport, SearchRequest, SEED_SPACE};
use error::{Result, SeekError};
use gacha::{simulate_sequence, GachaConfig};
use i18n::{I18n, Language};
use log::{debug, error, info};
use master::MasterData;
use rand_core::RngCore;
use rayon::prelude::*;
use rng::Xorshift32;
use search::TargetElement;
use std::sync::Arc;
use std::time::{Duration, Instant};
use worker::SearchPool;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "data/config.json")]
    config: String,

    /// Path to item/gacha master data (overrides the config file)
    #[arg(short, long)]
    master: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Follow the xorshift32 orbit of the start seed
    Chained,
    /// Count upward from the start seed
    Counter,
    /// Orbit first, then every 32-bit value
    ChainedThenCounter,
    /// Every 32-bit value in counter order
    Full,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Search for seeds that reproduce a draw sequence
    Search {
        /// Gacha id from the master data
        #[arg(short, long)]
        gacha: String,
        /// Comma separated item names; "featured" and "confirmed" are reserved
        #[arg(short, long)]
        target: String,
        /// Start seed (random when omitted)
        #[arg(short, long)]
        seed: Option<u32>,
        /// Number of positions to visit
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        count: u64,
        #[arg(long, value_enum, default_value_t = ModeArg::Chained)]
        mode: ModeArg,
        /// Number of partitions (default from config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Stop every worker after the first match
        #[arg(long)]
        stop_on_found: bool,
        /// Report through the shared atomic buffer instead of messages
        #[arg(long)]
        shared: bool,
    },
    /// Print the draws a seed produces
    Simulate {
        #[arg(short, long)]
        gacha: String,
        #[arg(short, long)]
        seed: u32,
        #[arg(short = 'n', long, default_value_t = 10)]
        draws: usize,
    },
    /// Measure simulation throughput
    Bench {
        /// Gacha id (first one in the master data when omitted)
        #[arg(short, long)]
        gacha: Option<String>,
        #[arg(short, long, default_value_t = 1_000_000)]
        seeds: usize,
        #[arg(short = 'n', long, default_value_t = 10)]
        draws: usize,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let lang = Language::from_config(&config);
    let master_path = args.master.clone().unwrap_or_else(|| config.master_path.clone());
    let master = MasterData::load(&master_path)?;

    match args.command {
        Commands::Search {
            gacha,
            target,
            seed,
            count,
            mode,
            workers,
            stop_on_found,
            shared,
        } => {
            let target = master.parse_target(&target)?;
            let start_seed = seed.unwrap_or_else(|| Xorshift32::from_time().next_u32());
            let request = build_request(mode, start_seed, count, target, stop_on_found);
            let coordinator = match workers {
                Some(n) => Coordinator::new(SearchPool::new_with_config(&config), n, config.search_settings()),
                None => Coordinator::from_config(&config),
            };
            run_search(lang, &master, &gacha, &coordinator, &request, shared)
        }
        Commands::Simulate { gacha, seed, draws } => {
            let gacha_config = master.gacha_config(&gacha)?;
            run_simulate(lang, &master, &gacha_config, seed, draws);
            Ok(())
        }
        Commands::Bench { gacha, seeds, draws } => {
            let gacha_id = match gacha {
                Some(id) => id,
                None => master
                    .gacha_ids()
                    .next()
                    .map(str::to_string)
                    .ok_or_else(|| SeekError::Config("master data has no gachas".to_string()))?,
            };
            let gacha_config = master.gacha_config(&gacha_id)?;
            let pool = SearchPool::new_with_config(&config);
            run_bench(lang, &pool, &gacha_config, seeds, draws)
        }
    }
}

fn build_request(
    mode: ModeArg,
    start_seed: u32,
    count: u64,
    target: Vec<TargetElement>,
    stop_on_first_found: bool,
) -> SearchRequest {
    let mode = match mode {
        ModeArg::Full => return SearchRequest::full_counter(target, stop_on_first_found),
        ModeArg::Chained => SearchMode::Chained,
        ModeArg::Counter => SearchMode::Counter,
        ModeArg::ChainedThenCounter => SearchMode::ChainedThenCounter,
    };
    SearchRequest {
        start_seed,
        count,
        mode,
        target,
        stop_on_first_found,
    }
}

fn describe_target(master: &MasterData, target: &[TargetElement]) -> String {
    target
        .iter()
        .map(|element| match element {
            TargetElement::Item(id) => master.item_name(*id).unwrap_or("?").to_string(),
            TargetElement::Featured => "featured".to_string(),
            TargetElement::ConfirmedFeatured => "confirmed".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_search(
    lang: Language,
    master: &MasterData,
    gacha_id: &str,
    coordinator: &Coordinator,
    request: &SearchRequest,
    shared: bool,
) -> Result<()> {
    let gacha_config = Arc::new(master.gacha_config(gacha_id)?);
    let total = match request.mode {
        SearchMode::ChainedThenCounter => request.count + SEED_SPACE,
        _ => request.count,
    }
    .max(1);
    debug!(
        "[Search] {} partitions on {} pool threads",
        coordinator.workers(),
        coordinator.pool().thread_count()
    );

    println!("{}", I18n::get(lang, "search_header"));
    println!(
        "{}",
        I18n::fmt(lang, "search_gacha", &[&master.gacha_name(gacha_id).unwrap_or(""), &gacha_id])
    );
    println!(
        "{}",
        I18n::fmt(lang, "search_target", &[&request.target.len(), &describe_target(master, &request.target)])
    );
    println!(
        "{}",
        I18n::fmt(
            lang,
            "search_plan",
            &[&format!("{:?}", request.mode), &request.start_seed, &request.count, &coordinator.workers()]
        )
    );

    let mut last_pct = u64::MAX;
    let mut report_progress = |processed: u64| {
        let pct = (processed.saturating_mul(100) / total).min(100);
        if pct != last_pct {
            last_pct = pct;
            info!("{}", I18n::fmt(lang, "progress", &[&format!("{:>3}", pct), &processed]));
        }
    };

    let report = if shared {
        let packed: Arc<[u32]> = Arc::from(pack::encode(&gacha_config));
        let state = Arc::new(SharedSearchState::new());
        let report = coordinator.run_shared(request, packed, state, |processed| report_progress(processed as u64))?;
        for found in &report.found {
            println!("{}", I18n::fmt(lang, "found_seed", &[&found.seed]));
        }
        report
    } else {
        let mut processed = 0u64;
        coordinator.run_messages(request, Arc::clone(&gacha_config), |event| match event {
            SearchEvent::Found { seed, .. } | SearchEvent::StopFound { seed, .. } => {
                println!("{}", I18n::fmt(lang, "found_seed", &[seed]));
            }
            SearchEvent::Progress { delta, .. } => {
                processed += delta;
                report_progress(processed);
            }
            _ => {}
        })?
    };

    print_summary(lang, &report);
    Ok(())
}

fn print_summary(lang: Language, report: &SearchReport) {
    let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "{}",
        I18n::fmt(
            lang,
            "search_done",
            &[
                &report.processed,
                &format!("{:.2?}", report.elapsed),
                &format!("{:.0}", report.processed as f64 / secs)
            ]
        )
    );
    for failure in &report.failures {
        println!("{}", I18n::fmt(lang, "worker_failed", &[&failure.worker, &failure.message]));
    }
    if report.stopped_early {
        println!("{}", I18n::get(lang, "search_stopped"));
    }
    if report.found.is_empty() {
        println!("{}", I18n::get(lang, "no_match"));
    } else {
        println!("{}", I18n::fmt(lang, "match_count", &[&report.found.len()]));
    }
}

fn run_simulate(lang: Language, master: &MasterData, gacha_config: &GachaConfig, seed: u32, draws: usize) {
    println!("{}", I18n::fmt(lang, "sim_header", &[&seed]));
    let outcomes = simulate_sequence(seed, draws, gacha_config);
    for (i, outcome) in outcomes.iter().enumerate() {
        let label = if outcome.is_featured() {
            I18n::get(lang, "draw_featured")
        } else {
            match (outcome.item_id(), outcome.rarity()) {
                (Some(item), Some(rarity)) => {
                    let name = master.item_name(item).map(str::to_string).unwrap_or_else(|| format!("#{}", item));
                    I18n::fmt(lang, "draw_item", &[&name, &rarity])
                }
                _ => I18n::get(lang, "draw_invalid"),
            }
        };
        println!("{:>3}. {}", i + 1, label);
    }
    if let Some(last) = outcomes.last() {
        println!("{}", I18n::fmt(lang, "next_seed", &[&last.next_state]));
    }
}

fn run_bench(lang: Language, pool: &SearchPool, gacha_config: &GachaConfig, seeds: usize, draws: usize) -> Result<()> {
    let draws = draws.clamp(1, STEP_CACHE_CAPACITY);
    let mut rng = Xorshift32::from_time();
    let samples: Vec<u32> = (0..seeds).map(|_| rng.next_u32()).collect();

    let start = Instant::now();
    let checksum = pool
        .execute(|| {
            samples
                .par_iter()
                .map_init(
                    || StepCache::new(gacha_config, 0),
                    |cache, &seed| {
                        cache.reset(seed);
                        cache.get_step(draws - 1).map(|o| o.next_state).unwrap_or(seed)
                    },
                )
                .reduce(|| 0, |a, b| a ^ b)
        })
        .map_err(SeekError::Config)?;
    let elapsed = start.elapsed();
    debug!("[Bench] checksum {:#010x}", checksum);

    let secs = elapsed.as_secs_f64().max(Duration::from_nanos(1).as_secs_f64());
    println!(
        "{}",
        I18n::fmt(
            lang,
            "bench_result",
            &[&seeds, &draws, &format!("{:.2?}", elapsed), &format!("{:.0}", seeds as f64 / secs)]
        )
    );
    Ok(())
}
