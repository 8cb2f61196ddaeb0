use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use promissory::{
    promise::{Promise, PromiseBuilder},
    timeout::TimeUnit,
    Executor,
};

/// Square a range of numbers in parallel, each job taking a little while,
/// then race two of them.
#[derive(Parser)]
struct Args {
    /// Number of worker threads.
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// How many items to process.
    #[arg(short, long, default_value_t = 16)]
    items: u64,

    /// Give up on the batch after this many milliseconds.
    #[arg(short, long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Trace thread hops.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let exec = Executor::builder()
        .threads(args.workers)
        .name_prefix("fan-out")
        .build()?;

    let batch = PromiseBuilder::new()
        .executor(exec.clone())
        .debug(args.debug)
        .timeout(args.timeout_ms, TimeUnit::Milliseconds)
        .pending::<()>();

    let squares = batch.all_apply(0..args.items, |x| {
        thread::sleep(Duration::from_millis(10 * (x % 5)));
        Ok(x * x)
    })?;
    println!("squares: {squares:?}");

    let slow = batch.run(|| {
        thread::sleep(Duration::from_millis(200));
        Ok("slow")
    });
    let fast = batch.run(|| {
        thread::sleep(Duration::from_millis(20));
        Ok("fast")
    });
    let winner: Promise<&str> = batch.any_of([slow, fast])?;
    println!("first to finish: {}", winner.get()?);

    exec.shutdown();
    Ok(())
}
