//! `translate`: start a service, translate the given texts, stop.

use std::time::Duration;

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};
use crate::config;
use crate::scheduler::TranslationService;
use crate::tier::Tier;

/// Parsed `translate` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateArgs {
    pub tier: Tier,
    pub source_lang: String,
    pub target_lang: String,
    pub caller_id: String,
    pub timeout: Option<Duration>,
    pub texts: Vec<String>,
}

/// Parse `--tier T --from S --to D [--caller ID] [--timeout SECS] TEXT...`.
/// `args` starts after the `translate` word.
pub fn parse_translate_args(args: &[String]) -> Result<TranslateArgs, String> {
    let mut tier = Tier::Free;
    let mut source_lang = None;
    let mut target_lang = None;
    let mut caller_id = "cli".to_string();
    let mut timeout = None;
    let mut texts = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--tier" => tier = value("--tier")?.parse().map_err(|e| format!("{e}"))?,
            "--from" => source_lang = Some(value("--from")?),
            "--to" => target_lang = Some(value("--to")?),
            "--caller" => caller_id = value("--caller")?,
            "--timeout" => {
                let raw = value("--timeout")?;
                let secs: f64 = raw
                    .parse()
                    .ok()
                    .filter(|s: &f64| s.is_finite() && *s > 0.0)
                    .ok_or_else(|| format!("invalid --timeout: {raw}"))?;
                timeout = Some(Duration::from_secs_f64(secs));
            }
            other if other.starts_with("--") => return Err(format!("unknown option: {other}")),
            text => texts.push(text.to_string()),
        }
    }

    let source_lang = source_lang.ok_or("--from is required")?;
    let target_lang = target_lang.ok_or("--to is required")?;
    if texts.is_empty() {
        return Err("at least one TEXT is required".to_string());
    }

    Ok(TranslateArgs {
        tier,
        source_lang,
        target_lang,
        caller_id,
        timeout,
        texts,
    })
}

pub async fn run_translate(args: &[String]) -> i32 {
    let parsed = match parse_translate_args(args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Usage: tierbatch-cli translate --tier TIER --from LANG --to LANG TEXT...");
            return EXIT_FAILURE;
        }
    };

    let env = config::load();
    let service = match TranslationService::from_config(&env) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG;
        }
    };

    service.start(env.workers).await;
    let timeout = parsed.timeout.unwrap_or(env.request_timeout);
    let outcome = tokio::select! {
        result = service.translate_batch(
            &parsed.texts,
            &parsed.source_lang,
            &parsed.target_lang,
            &parsed.caller_id,
            parsed.tier,
            timeout,
        ) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    service.stop(env.shutdown_timeout).await;

    let Some(result) = outcome else {
        eprintln!("Interrupted");
        return EXIT_FAILURE;
    };
    match result {
        Ok(outputs) => match serde_json::to_string_pretty(&outputs) {
            Ok(json) => {
                println!("{json}");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Failed to encode results: {e}");
                EXIT_FAILURE
            }
        },
        Err(e) => {
            eprintln!("Translation failed: {e} (retryable: {})", e.is_retryable());
            EXIT_FAILURE
        }
    }
}
