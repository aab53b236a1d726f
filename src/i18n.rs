use crate::config::Config;
use colored::*;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Language {
    En,
    Ja,
}

impl Language {
    pub fn from_config(config: &Config) -> Self {
        if let Some(lang_str) = &config.language {
            let lower = lang_str.to_lowercase();
            if lower.contains("ja") || lower.contains("jp") {
                return Language::Ja;
            } else if lower.contains("en") {
                return Language::En;
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        if let Ok(lang) = std::env::var("LANG") {
            if lang.to_lowercase().starts_with("ja") {
                return Language::Ja;
            }
        }
        Language::En
    }
}

pub struct I18n;

impl I18n {
    pub fn get(lang: Language, key: &str) -> String {
        match (lang, key) {
            // === Search ===
            (Language::En, "search_header") => format!("{}", "=== Gacha Seed Search ===".purple().bold()),
            (Language::Ja, "search_header") => format!("{}", "=== ガチャ SEED 検索 ===".purple().bold()),

            (Language::En, "search_gacha") => "Gacha: {} ({})".to_string(),
            (Language::Ja, "search_gacha") => "ガチャ: {} ({})".to_string(),

            (Language::En, "search_target") => "Target ({} draws): {}".to_string(),
            (Language::Ja, "search_target") => "検索対象 ({} 回): {}".to_string(),

            (Language::En, "search_plan") => "Mode: {} | Start: {} | Positions: {} | Workers: {}".to_string(),
            (Language::Ja, "search_plan") => "モード: {} | 開始: {} | 件数: {} | ワーカー: {}".to_string(),

            (Language::En, "found_seed") => format!("{}", "Found SEED: {}".green().bold()),
            (Language::Ja, "found_seed") => format!("{}", "SEED 発見: {}".green().bold()),

            (Language::En, "progress") => "Progress: {:>3}% ({} seeds)".to_string(),
            (Language::Ja, "progress") => "進捗: {:>3}% ({} 件)".to_string(),

            (Language::En, "search_done") => "Checked {} seeds in {} ({} seeds/sec)".to_string(),
            (Language::Ja, "search_done") => "{} 件を {} で検索 ({} 件/秒)".to_string(),

            (Language::En, "search_stopped") => format!("{}", "Stopped after the first match.".yellow()),
            (Language::Ja, "search_stopped") => format!("{}", "最初の一致で停止しました。".yellow()),

            (Language::En, "no_match") => format!("{}", "No matching SEED found.".red()),
            (Language::Ja, "no_match") => format!("{}", "一致する SEED は見つかりませんでした。".red()),

            (Language::En, "match_count") => "{} matching SEED(s).".to_string(),
            (Language::Ja, "match_count") => "一致した SEED: {} 件".to_string(),

            (Language::En, "worker_failed") => format!("{}", "Worker {} failed: {}".red()),
            (Language::Ja, "worker_failed") => format!("{}", "ワーカー {} が失敗: {}".red()),

            // === Simulate ===
            (Language::En, "sim_header") => format!("{}", "=== Draws from SEED {} ===".purple().bold()),
            (Language::Ja, "sim_header") => format!("{}", "=== SEED {} の排出結果 ===".purple().bold()),

            (Language::En, "draw_featured") => format!("{}", "Featured".yellow().bold()),
            (Language::Ja, "draw_featured") => format!("{}", "目玉".yellow().bold()),

            (Language::En, "draw_item") => "{} (rarity {})".to_string(),
            (Language::Ja, "draw_item") => "{} (レア度 {})".to_string(),

            (Language::En, "draw_invalid") => "<invalid draw>".red().to_string(),
            (Language::Ja, "draw_invalid") => "<不正な排出>".red().to_string(),

            (Language::En, "next_seed") => "Next SEED: {}".to_string(),
            (Language::Ja, "next_seed") => "次の SEED: {}".to_string(),

            // === Bench ===
            (Language::En, "bench_result") => "[Bench] {} seeds x {} draws in {} ({} seeds/sec)".to_string(),
            (Language::Ja, "bench_result") => "[ベンチ] {} SEED x {} 回を {} で実行 ({} SEED/秒)".to_string(),

            // Default fallback
            (_, k) => k.to_string(),
        }
    }

    /// Looks up `key` and substitutes each `{...}` placeholder in order.
    pub fn fmt(lang: Language, key: &str, args: &[&dyn std::fmt::Display]) -> String {
        fill(&Self::get(lang, key), args)
    }
}

fn fill(template: &str, args: &[&dyn std::fmt::Display]) -> String {
    let mut out = String::with_capacity(template.len() + 16 * args.len());
    let mut rest = template;
    let mut args = args.iter();
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str(&rest[open..open + close + 1]),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}
