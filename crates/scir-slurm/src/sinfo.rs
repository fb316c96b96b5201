//! Cluster load from sinfo.

use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{QueueLoad, SchedulerConfig};
use scir_parsers::run_shell;

/// sockets, cores per socket, then allocated/idle/other/total nodes.
static SINFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\D+(\d+)\D+(\d+)/(\d+)/(\d+)/(\d+)").expect("valid regex")
});

pub fn sinfo_command(config: &SchedulerConfig) -> String {
    format!("{} --noheader -o '%X,%Y,%F'", config.program("sinfo"))
}

/// Parse `sinfo -o '%X,%Y,%F'` into cores in use and total cores.
pub fn parse_sinfo(output: &str) -> Option<QueueLoad> {
    let caps = SINFO_RE.captures(output)?;
    let field = |i: usize| caps[i].parse::<u64>().ok();
    let per_node = field(1)? * field(2)?;
    let alloc = field(3)?;
    let total = field(6)?;
    Some(QueueLoad::Known {
        used: (per_node * alloc) as f64,
        total: (per_node * total) as f64,
    })
}

/// Best-effort load query. Never fails.
pub async fn query_load(config: &SchedulerConfig) -> QueueLoad {
    match run_shell(&sinfo_command(config)).await {
        Ok(output) => parse_sinfo(&output.stdout_lossy()).unwrap_or(QueueLoad::Unknown),
        Err(e) => {
            tracing::warn!("Cannot query sinfo: {}", e);
            QueueLoad::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sinfo() {
        assert_eq!(
            parse_sinfo("2,16,10/5/1/16\n"),
            Some(QueueLoad::Known {
                used: 320.0,
                total: 512.0
            })
        );
        assert_eq!(parse_sinfo(""), None);
        assert_eq!(parse_sinfo("sinfo: error: slurm_load_partitions"), None);
    }
}
