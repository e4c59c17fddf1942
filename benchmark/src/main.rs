use broker::{BrokerConfig, Command, CommandBroker, StatsSnapshot};
use clap::Parser;
use color_eyre::Result;
use hdrhistogram::Histogram;
use in_memory_adapter::InMemoryStockStore;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stock-broker-benchmark")]
#[command(about = "Throughput benchmark for the stock command broker")]
struct Args {
    /// Number of concurrent producer tasks
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    producers: u64,

    /// Duration of the test in seconds
    #[arg(short, long, default_value_t = 30)]
    duration: u64,

    /// Target throughput (commands per second, across all producers)
    #[arg(long, default_value_t = 50_000, value_parser = clap::value_parser!(u64).range(1..))]
    target_throughput: u64,

    /// Number of products seeded in the store
    #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(i64).range(1..))]
    products: i64,

    /// Share of commands aimed at products that do not exist
    #[arg(long, default_value_t = 0.0)]
    invalid_ratio: f64,
}

#[derive(Debug)]
struct BenchmarkMetrics {
    pub commands_sent: AtomicU64,
    pub commands_rejected: AtomicU64,
    pub send_latency_histogram: Mutex<Histogram<u64>>,
    pub start_time: Instant,
}

impl BenchmarkMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            commands_sent: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            send_latency_histogram: Mutex::new(Histogram::new_with_bounds(1, 10_000_000, 3)?),
            start_time: Instant::now(),
        })
    }

    fn record_send(&self, latency_us: u64) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut hist) = self.send_latency_histogram.lock() {
            let _ = hist.record(latency_us.max(1));
        }
    }

    fn record_rejection(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn print_report(&self, stats: &StatsSnapshot, drain_time: Duration, target: u64) {
        let sent = self.commands_sent.load(Ordering::Relaxed);
        let rejected = self.commands_rejected.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let processed = stats.processed();
        let throughput = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };
        let average_batch = if stats.drain_cycles > 0 {
            processed as f64 / stats.drain_cycles as f64
        } else {
            0.0
        };

        println!("\n=== STOCK BROKER BENCHMARK RESULTS ===");
        println!("Test Duration: {elapsed:.2} seconds");
        println!("Commands Sent: {sent}");
        println!("Commands Rejected: {rejected}");
        println!("Commands Applied: {}", stats.applied);
        println!("Commands Failed: {}", stats.failed);
        println!("Drain Cycles: {}", stats.drain_cycles);
        println!("Commits: {} ({} failed)", stats.commits, stats.commit_failures);
        println!("Average Batch Size: {average_batch:.1}");
        println!("Final Drain Time: {} ms", drain_time.as_millis());
        println!("Throughput: {throughput:.2} commands/s");

        if let Ok(hist) = self.send_latency_histogram.lock() {
            println!("\n=== SEND LATENCY DISTRIBUTION ===");
            println!("Min: {} us", hist.min());
            println!("P50: {} us", hist.value_at_quantile(0.50));
            println!("P90: {} us", hist.value_at_quantile(0.90));
            println!("P95: {} us", hist.value_at_quantile(0.95));
            println!("P99: {} us", hist.value_at_quantile(0.99));
            println!("Max: {} us", hist.max());

            println!("\n=== REQUIREMENTS CHECK ===");
            let p95 = hist.value_at_quantile(0.95);
            let latency_ok = p95 <= 1_000;
            let throughput_ok = throughput >= target as f64 * 0.9;
            let nothing_lost = processed == sent;
            println!(
                "P95 send latency ≤ 1ms: {} (actual: {p95}us)",
                if latency_ok { "✓ PASS" } else { "✗ FAIL" }
            );
            println!(
                "Throughput ≥ 90% of target: {} (actual: {throughput:.2})",
                if throughput_ok { "✓ PASS" } else { "✗ FAIL" }
            );
            println!(
                "Every sent command processed: {} ({processed}/{sent})",
                if nothing_lost { "✓ PASS" } else { "✗ FAIL" }
            );
        }
    }
}

async fn producer(
    producer_id: u64,
    broker: Arc<CommandBroker<InMemoryStockStore>>,
    metrics: Arc<BenchmarkMetrics>,
    should_stop: Arc<AtomicBool>,
    target_rate_per_producer: f64,
    products: i64,
    invalid_ratio: f64,
) {
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::from_entropy();

    let interval = Duration::from_secs_f64(1.0 / target_rate_per_producer);
    let mut next_send_time = Instant::now();

    info!("Producer {producer_id} started with target rate {target_rate_per_producer:.2} commands/s");

    while !should_stop.load(Ordering::Relaxed) {
        // Rate limiting
        if Instant::now() < next_send_time {
            sleep(Duration::from_millis(1)).await;
            continue;
        }
        next_send_time += interval;

        let product_id = if rng.gen_bool(invalid_ratio) {
            products + rng.gen_range(1..=products)
        } else {
            rng.gen_range(1..=products)
        };
        let command = Command::update_stock_quantity(product_id, rng.gen_range(0..10_000));

        let started = Instant::now();
        let result = broker.send(command);
        let latency_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => metrics.record_send(latency_us),
            Err(e) => {
                warn!("Producer {producer_id} send failed: {e}");
                metrics.record_rejection();
            }
        }
    }

    info!("Producer {producer_id} stopped");
}

async fn run_benchmark(args: Args) -> Result<()> {
    info!(
        "Starting stock broker benchmark with {} producers for {}s",
        args.producers, args.duration
    );

    let store = InMemoryStockStore::new();
    for id in 1..=args.products {
        store.insert(id, format!("product-{id}"), 0);
    }
    let broker = Arc::new(CommandBroker::start(
        store,
        BrokerConfig::default().with_name("benchmark"),
    )?);

    let metrics = Arc::new(BenchmarkMetrics::new()?);
    let should_stop = Arc::new(AtomicBool::new(false));
    let target_rate_per_producer = args.target_throughput as f64 / args.producers as f64;
    let invalid_ratio = args.invalid_ratio.clamp(0.0, 1.0);

    let mut handles = Vec::new();
    for producer_id in 0..args.producers {
        handles.push(tokio::spawn(producer(
            producer_id,
            Arc::clone(&broker),
            Arc::clone(&metrics),
            Arc::clone(&should_stop),
            target_rate_per_producer,
            args.products,
            invalid_ratio,
        )));
    }

    // Status reporting task
    let status_handle = {
        let metrics = Arc::clone(&metrics);
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let stats = broker.stats();
                info!(
                    "Status: {} sent, {} processed, {} queued, {} commits",
                    metrics.commands_sent.load(Ordering::Relaxed),
                    stats.processed(),
                    broker.queue_len(),
                    stats.commits
                );
            }
        })
    };

    sleep(Duration::from_secs(args.duration)).await;

    should_stop.store(true, Ordering::Relaxed);
    status_handle.abort();
    for handle in handles {
        let _ = handle.await;
    }

    // Let the worker catch up with everything that was accepted
    let drain_started = Instant::now();
    let sent = metrics.commands_sent.load(Ordering::Relaxed);
    while broker.stats().processed() < sent && drain_started.elapsed() < Duration::from_secs(30) {
        sleep(Duration::from_millis(10)).await;
    }
    let drain_time = drain_started.elapsed();

    broker.dispose();
    broker.stopped().await;

    metrics.print_report(&broker.stats(), drain_time, args.target_throughput);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("benchmark=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Stock Broker Benchmark");
    info!("Configuration: {:?}", args);

    run_benchmark(args).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_accepted() {
        let args = Args::try_parse_from(["stock-broker-benchmark"]).unwrap();
        assert_eq!(args.producers, 10);
        assert_eq!(args.target_throughput, 50_000);
        assert_eq!(args.products, 1_000);
    }

    #[test]
    fn test_zero_sized_runs_are_rejected() {
        for flag in ["--producers", "--target-throughput", "--products"] {
            let result = Args::try_parse_from(["stock-broker-benchmark", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 was accepted");
        }
    }
}
