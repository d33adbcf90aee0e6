use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

// Global Prometheus registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn service_and_env() -> (String, String) {
    let service = std::env::var("APP_SERVICE").unwrap_or_else(|_| "memfuse".to_string());
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    (service, env_name)
}

fn counter(name: &str, help: &str) -> IntCounter {
    let (service, env_name) = service_and_env();
    let c = IntCounter::with_opts(
        Opts::new(name, help)
            .const_label("service", service)
            .const_label("env", env_name),
    )
    .expect("valid counter definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

// Ingestion
pub static JOBS_STARTED_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("ingest_jobs_started_total", "Total ingestion jobs started"));
pub static JOBS_COMPLETED_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("ingest_jobs_completed_total", "Total ingestion jobs completed"));
pub static JOBS_FAILED_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("ingest_jobs_failed_total", "Total ingestion jobs failed"));
pub static CHUNKS_INDEXED_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("ingest_chunks_indexed_total", "Total chunks embedded and indexed"));
pub static SUMMARY_FALLBACKS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("ingest_summary_fallbacks_total", "Chunk summaries that fell back to a prefix"));

// Retrieval
pub static SEARCH_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let buckets = parse_buckets_env("SEARCH_HISTO_BUCKETS")
        .unwrap_or_else(|| vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0]);
    let mut opts = HistogramOpts::new("hybrid_search_latency_ms", "Hybrid search latency in milliseconds")
        .buckets(buckets);
    opts.common_opts = opts.common_opts.const_label("service", service).const_label("env", env_name);
    let h = Histogram::with_opts(opts).expect("valid histogram definition");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub static CACHE_HITS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("external_cache_hits_total", "External result cache hits"));
pub static CACHE_MISSES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("external_cache_misses_total", "External result cache misses"));
pub static EXTERNAL_SEARCH_FAILURES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("external_search_failures_total", "Web search provider failures"));

// Learning
pub static FEEDBACK_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("feedback_submitted_total", "Feedback records accepted"));
pub static LEARNING_RUNS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("learning_runs_total", "Batch learning runs"));
pub static WEIGHT_UPDATES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("weight_updates_total", "Per-user weight states rewritten by batch learning"));

// Agents
pub static AGENT_SESSIONS_BY_OUTCOME: Lazy<IntCounterVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let opts = Opts::new("agent_sessions_total", "Agent sessions partitioned by lane and outcome")
        .const_label("service", service)
        .const_label("env", env_name);
    let cv = IntCounterVec::new(opts, &["lane", "outcome"]).expect("valid counter vec definition");
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

pub static HANDOFFS_REJECTED_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("agent_handoffs_rejected_total", "Agent handoffs rejected by validation"));

fn parse_buckets_env(var: &str) -> Option<Vec<f64>> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => {
            let mut parsed: Vec<f64> = Vec::new();
            for tok in val.split(',') {
                let t = tok.trim();
                if t.is_empty() { continue; }
                match t.parse::<f64>() {
                    Ok(v) if v > 0.0 => parsed.push(v),
                    _ => {
                        tracing::warn!(env_var = %var, token = %t, "Invalid histogram bucket value; ignoring");
                        return None;
                    }
                }
            }
            if parsed.is_empty() {
                None
            } else {
                parsed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                Some(parsed)
            }
        }
        _ => None,
    }
}

pub fn observe_search_latency_ms(ms: f64) {
    SEARCH_LATENCY_MS.observe(ms);
}

/// Render every registered metric in the Prometheus text format.
pub fn export_prometheus() -> String {
    // Touch lazies so every metric shows up even before first use
    Lazy::force(&JOBS_STARTED_TOTAL);
    Lazy::force(&JOBS_COMPLETED_TOTAL);
    Lazy::force(&JOBS_FAILED_TOTAL);
    Lazy::force(&CHUNKS_INDEXED_TOTAL);
    Lazy::force(&SUMMARY_FALLBACKS_TOTAL);
    Lazy::force(&SEARCH_LATENCY_MS);
    Lazy::force(&CACHE_HITS_TOTAL);
    Lazy::force(&CACHE_MISSES_TOTAL);
    Lazy::force(&EXTERNAL_SEARCH_FAILURES_TOTAL);
    Lazy::force(&FEEDBACK_TOTAL);
    Lazy::force(&LEARNING_RUNS_TOTAL);
    Lazy::force(&WEIGHT_UPDATES_TOTAL);
    Lazy::force(&AGENT_SESSIONS_BY_OUTCOME);
    Lazy::force(&HANDOFFS_REJECTED_TOTAL);

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
