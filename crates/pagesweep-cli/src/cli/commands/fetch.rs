//! `pagesweep fetch` – aggregate collections and print their records.

use anyhow::{bail, Context, Result};
use pagesweep_core::config::SweepConfig;
use pagesweep_core::parser::TableParser;
use pagesweep_core::progress::Progress;
use pagesweep_core::transport::CurlTransport;
use pagesweep_core::{AggregateOptions, AggregationResult, CollectionKey, Outcome, Record, SessionManager};
use std::io::Write;
use std::sync::Arc;

#[derive(Debug)]
pub struct FetchArgs {
    pub keys: Vec<String>,
    pub concurrency: Option<usize>,
    pub json: bool,
}

pub async fn run_fetch(cfg: &SweepConfig, args: FetchArgs) -> Result<()> {
    let transport = Arc::new(CurlTransport::from_config(&cfg.transport));
    let parser = Arc::new(TableParser::new(&cfg.parser).context("parser selectors in config")?);
    let manager = SessionManager::from_config(cfg, transport, parser);
    let show_key = args.keys.len() > 1;

    for key in args.keys {
        let key = CollectionKey::new(key);
        let mut options = AggregateOptions::default().on_progress(Arc::new(print_progress));
        if let Some(n) = args.concurrency {
            options = options.concurrency(n);
        }

        let outcome = manager
            .aggregate(key.clone(), options)
            .await
            .map_err(|e| {
                let msg = e.user_message();
                anyhow::Error::new(e).context(msg)
            })?;
        let result = match outcome {
            Outcome::Completed(result) => result,
            Outcome::Cancelled => bail!("aggregation for {} was cancelled", key),
        };

        if !result.is_complete() {
            eprintln!("warning: some pages of {} failed to load; showing partial results", key);
        }
        if result.is_empty() {
            println!("no records found");
            continue;
        }
        if args.json {
            print_json(&result)?;
        } else {
            print_table(&result, show_key);
        }
    }
    Ok(())
}

fn print_progress(p: &Progress) {
    let mut err = std::io::stderr().lock();
    if p.finished {
        let _ = writeln!(
            err,
            "\r  {}: {} records from {} page(s) in {:.1}s          ",
            p.key,
            p.loaded(),
            p.pages_loaded,
            p.elapsed.as_secs_f64()
        );
    } else {
        let _ = write!(
            err,
            "\r  {}: {} / ~{} records ({:.0}%)  ",
            p.key,
            p.loaded(),
            p.estimated_total,
            p.fraction() * 100.0
        );
    }
    let _ = err.flush();
}

fn print_json(result: &AggregationResult) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for record in result.records.iter() {
        let line = serde_json::json!({ "key": result.key.as_str(), "record": record });
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn print_table(result: &AggregationResult, show_key: bool) {
    if show_key {
        println!("== {} ({} records) ==", result.key, result.len());
    }
    println!("{:<5} {:<12} {:<48} {}", "#", "DATE", "NAME", "LINK");
    for record in result.records.iter() {
        print_row(record);
    }
}

fn print_row(r: &Record) {
    println!(
        "{:<5} {:<12} {:<48} {}",
        r.ordinal,
        r.date,
        r.name,
        r.link.as_deref().unwrap_or("-")
    );
}
