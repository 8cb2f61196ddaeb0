use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use promissory::{context, promise::PromiseBuilder, Error, Executor};

/// Parse, enrich and format a record through a chain of promises, carrying a
/// request id from the calling thread onto the workers.
#[derive(Parser)]
struct Args {
    /// The raw record to process.
    #[arg(default_value = "42")]
    input: String,

    /// Make the enrichment step fail to show recovery.
    #[arg(long)]
    fail: bool,

    /// Trace thread hops.
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug)]
struct RequestId(u32);

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let exec = Executor::builder().threads(2).name_prefix("pipeline").build()?;
    context::set_current(RequestId(7));

    let input = args.input.clone();
    let parsed = PromiseBuilder::new()
        .executor(exec.clone())
        .debug(args.debug)
        .supply(move || input.trim().parse::<i64>().map_err(Error::execution));

    let fail = args.fail;
    let enriched = parsed.then_async(move |n| {
        let id = context::current::<RequestId>().map(|id| id.0).unwrap_or(0);
        thread::sleep(Duration::from_millis(20));
        if fail {
            return Err(Error::msg(format!("enrichment failed for request {id}")));
        }
        Ok((id, n * 2))
    });

    let offset = parsed.then(|n| Ok(n + 1));
    let report = enriched
        .then_combine(&offset, |(id, doubled), plus_one| {
            Ok(format!("request {id}: doubled={doubled} next={plus_one}"))
        })
        .exceptionally(|e| Ok(format!("recovered from: {}", e.root_cause())));

    println!("{}", report.get()?);

    context::clear_current();
    exec.shutdown();
    Ok(())
}
