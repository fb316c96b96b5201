//! Host load: the 1-minute load average against the processor count.

use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::QueueLoad;
use scir_parsers::run_shell;

static LOAD_AVERAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)averages?:\s*([\d\.]+)").expect("valid regex"));
static CPUINFO_PROCESSOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^processor\s*:").expect("valid regex"));
static HOSTINFO_PROCESSORS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\d+) processors are").expect("valid regex"));

/// First load average in `uptime` output.
pub fn parse_uptime(output: &str) -> Option<f64> {
    LOAD_AVERAGE_RE
        .captures(output)
        .and_then(|c| c[1].trim_end_matches('.').parse().ok())
}

/// Number of `processor :` entries in `/proc/cpuinfo`.
pub fn count_cpuinfo_processors(cpuinfo: &str) -> u32 {
    CPUINFO_PROCESSOR_RE.find_iter(cpuinfo).count() as u32
}

/// Processor count from macOS `hostinfo`.
pub fn parse_hostinfo(output: &str) -> Option<u32> {
    HOSTINFO_PROCESSORS_RE
        .captures(output)
        .and_then(|c| c[1].parse().ok())
}

async fn processor_count() -> Result<Option<u32>, std::io::Error> {
    match std::env::consts::OS {
        "linux" => {
            let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo").await?;
            let count = count_cpuinfo_processors(&cpuinfo);
            Ok((count > 0).then_some(count))
        }
        "macos" => {
            let output = run_shell("hostinfo 2>&1").await.map_err(std::io::Error::other)?;
            Ok(parse_hostinfo(&output.stdout_lossy()))
        }
        _ => Ok(None),
    }
}

/// Load of the machine this process runs on. Never fails.
pub async fn host_load() -> QueueLoad {
    let uptime = match run_shell("uptime").await {
        Ok(output) => output.stdout_lossy(),
        Err(e) => {
            tracing::warn!("Cannot run uptime: {}", e);
            return QueueLoad::Failed;
        }
    };
    let cpus = match processor_count().await {
        Ok(cpus) => cpus,
        Err(e) => {
            tracing::warn!("Cannot count processors: {}", e);
            return QueueLoad::Failed;
        }
    };
    match (parse_uptime(&uptime), cpus) {
        (Some(load), Some(cpus)) => QueueLoad::known(load, cpus),
        _ => QueueLoad::Unknown,
    }
}
