use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use tiergate::local::LocalStoreProvider;
use tiergate::{
    AdmissionDecision, AdmissionEngine, AdmissionRequest, ConfigStore, CounterStore,
    EngineOptions, Forwarder, GateError, QuotaResolver, ResolverOptions, TierDefinition,
    UserAccount,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Provider {
    Local,
    Redis,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UserDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tiergate-stress",
    about = "Load test harness for tiergate admission"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Provider::Local)]
    provider: Provider,

    #[arg(long, value_enum, default_value_t = UserDist::Hot)]
    user_dist: UserDist,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 30)]
    duration_s: u64,

    #[arg(long, default_value_t = 1000)]
    user_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    /// Limit of the single tier every user belongs to.
    #[arg(long, default_value_t = 10_000)]
    tier_limit: u64,

    /// Clear all counters every N seconds while the load runs.
    ///
    /// Disables the end-of-run consistency check.
    #[arg(long)]
    reset_every_s: Option<u64>,

    /// Forward through the full `handle_document` path instead of `admit`.
    #[arg(long, default_value_t = false)]
    forward: bool,

    #[arg(long)]
    target_qps: Option<u64>,

    #[arg(long, default_value = "redis://127.0.0.1:16379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    admitted: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    forwarded: AtomicU64,
}

/// Forwarder that only counts what reaches it.
struct CountingForwarder {
    counts: Arc<Counts>,
}

impl Forwarder for CountingForwarder {
    async fn forward(&self, request: AdmissionRequest) -> Result<(), GateError> {
        let _ = request.into_payload();
        self.counts.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn build_users(args: &Args) -> Vec<String> {
    let n = match args.user_dist {
        UserDist::Hot => 1,
        _ => args.user_space.max(1),
    };
    (0..n).map(|i| format!("user_{i}")).collect()
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn pick_user<'a>(args: &Args, users: &'a [String], rng: &mut impl FnMut() -> u64) -> &'a str {
    match args.user_dist {
        UserDist::Hot => &users[0],
        UserDist::Uniform => {
            let idx = (rng() as usize) % users.len();
            &users[idx]
        }
        UserDist::Skewed => {
            let r = (rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                &users[0]
            } else {
                let idx = 1 + ((rng() as usize) % (users.len().saturating_sub(1).max(1)));
                &users[idx % users.len()]
            }
        }
    }
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let admitted = counts.admitted.load(Ordering::Relaxed);
    let rejected = counts.rejected.load(Ordering::Relaxed);
    let errors = counts.errors.load(Ordering::Relaxed);
    let ops = admitted + rejected + errors;

    println!(
        "provider={:?} mode={:?} user_dist={:?} user_space={}",
        args.provider, args.mode, args.user_dist, args.user_space
    );
    println!(
        "tasks={} duration_s={} tier_limit={} reset_every_s={:?}",
        args.tasks, args.duration_s, args.tier_limit, args.reset_every_s
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!(
        "admitted={} rejected={} errors={} forwarded={}",
        admitted,
        rejected,
        errors,
        counts.forwarded.load(Ordering::Relaxed)
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

async fn seed<C: ConfigStore>(config: &C, args: &Args, users: &[String]) {
    config
        .put_tier_definition(TierDefinition::from_iter([("Stress", args.tier_limit)]))
        .await
        .unwrap();

    for user_id in users {
        config
            .put_user_account(UserAccount::new(user_id.as_str(), "Stress"))
            .await
            .unwrap();
    }
}

async fn run<C, K>(args: Args, config: Arc<C>, counters: Arc<K>)
where
    C: ConfigStore,
    K: CounterStore,
{
    let users = build_users(&args);
    seed(config.as_ref(), &args, &users).await;
    let removed = counters.clear().await.unwrap();
    tracing::info!(removed, users = users.len(), "seeded stores");

    let counts = Arc::new(Counts::default());
    let engine = Arc::new(AdmissionEngine::new(
        Arc::new(QuotaResolver::new(config, ResolverOptions::default())),
        Arc::clone(&counters),
        Arc::new(CountingForwarder {
            counts: Arc::clone(&counts),
        }),
        EngineOptions::default(),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let resetter = args.reset_every_s.map(|every| {
        let counters = Arc::clone(&counters);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(every.max(1)));
            interval.tick().await;
            while !stop.load(Ordering::Relaxed) {
                interval.tick().await;
                match counters.clear().await {
                    Ok(removed) => tracing::info!(removed, "counters reset"),
                    Err(err) => tracing::error!(error = %err, "counter reset failed"),
                }
            }
        })
    });

    let mut join = Vec::with_capacity(args.tasks);
    for t in 0..args.tasks {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let args = args.clone();
        let users = users.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
            let mut next_deadline = Instant::now();

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                if args.mode == Mode::TargetQps
                    && let Some(qps) = args.target_qps
                {
                    let per_task_ns = 1_000_000_000u64 * args.tasks as u64 / qps.max(1);
                    let now = Instant::now();
                    if now < next_deadline {
                        tokio::time::sleep(next_deadline - now).await;
                    }
                    next_deadline += Duration::from_nanos(per_task_ns);
                }

                i = i.wrapping_add(1);
                let user_id = pick_user(&args, &users, &mut rng_u64);
                let t0 = should_sample(i, args.sample_every).then(Instant::now);

                let result = if args.forward {
                    engine
                        .handle_document(json!({ "user_id": user_id, "prompt": "stress", "seq": i }))
                        .await
                } else {
                    engine.admit(user_id).await
                };

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                match result {
                    Ok(AdmissionDecision::Admitted { .. }) => {
                        counts.admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(AdmissionDecision::Rejected { .. }) => {
                        counts.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, user_id, "admission failed");
                        counts.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }
    if let Some(resetter) = resetter {
        resetter.abort();
    }

    let elapsed = started.elapsed();
    print_results(&args, elapsed, &merged, &counts);

    if args.reset_every_s.is_none() {
        verify(&args, &users, counters.as_ref(), &counts).await;
    }
}

/// Without resets every admitted request must be reflected in exactly one counter
/// increment, and no counter may exceed the tier limit.
async fn verify<K: CounterStore>(args: &Args, users: &[String], counters: &K, counts: &Counts) {
    let mut per_user = HashMap::with_capacity(users.len());
    for user_id in users {
        let count = counters
            .get(user_id)
            .await
            .unwrap()
            .map(|record| record.count)
            .unwrap_or(0);
        per_user.insert(user_id.as_str(), count);
    }

    let total: u64 = per_user.values().sum();
    let admitted = counts.admitted.load(Ordering::Relaxed);
    let over_limit = per_user
        .iter()
        .filter(|(_, count)| **count > args.tier_limit)
        .count();

    println!("counter_total={total} admitted={admitted} users_over_limit={over_limit}");

    if total != admitted || over_limit > 0 {
        eprintln!("consistency check FAILED");
        std::process::exit(1);
    }
    if args.forward && counts.forwarded.load(Ordering::Relaxed) != admitted {
        eprintln!("forwarded count does not match admitted count");
        std::process::exit(1);
    }
    println!("consistency check passed");
}

#[cfg(feature = "redis-tokio")]
async fn run_redis(args: Args) {
    use tiergate::redis::{RedisKey, RedisStoreOptions, RedisStoreProvider};

    let client = redis::Client::open(args.redis_url.as_str()).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();
    let provider = RedisStoreProvider::new(RedisStoreOptions {
        connection_manager,
        prefix: Some(RedisKey::try_from(args.redis_prefix.clone()).unwrap()),
    });

    run(args, provider.config(), provider.counters()).await;
}

#[cfg(not(feature = "redis-tokio"))]
async fn run_redis(_: Args) {
    eprintln!("redis provider requires: cargo run -p tiergate-stress --features redis-tokio -- ...");
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.tasks.max(2))
        .build()
        .unwrap();

    rt.block_on(async move {
        match args.provider {
            Provider::Local => {
                let stores = LocalStoreProvider::new();
                run(args, stores.config(), stores.counters()).await;
            }
            Provider::Redis => run_redis(args).await,
        }
    });
}
