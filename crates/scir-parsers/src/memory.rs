//! Memory parsing utilities for scheduler output.

/// Memory format variants for different scheduler commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat {
    /// SLURM format: "4G", "1000M", "4096K" (no spaces)
    Slurm,
    /// SLURM sacct format: "4Gn", "1000Mc" (with per-node/per-core suffix)
    SlurmSacct,
}

/// Parse memory string to megabytes.
///
/// Handles the formats printed by SLURM:
/// - squeue/sinfo: "4G", "1000M", "4096K", "4096" (no spaces)
/// - sacct: "4Gn", "1000Mc" (n=per node, c=per core)
///
/// Returns None for empty strings or placeholder values.
pub fn parse_memory_mb(s: &str, format: MemoryFormat) -> Option<u64> {
    if s.is_empty() || s == "-" {
        return None;
    }

    match format {
        MemoryFormat::Slurm => parse_slurm_memory(s),
        MemoryFormat::SlurmSacct => parse_slurm_sacct_memory(s),
    }
}

/// Parse SLURM squeue memory format (e.g., "4G", "1000M", "4096").
fn parse_slurm_memory(s: &str) -> Option<u64> {
    let s = s.trim();

    if let Some(stripped) = s.strip_suffix('T') {
        stripped.parse::<f64>().ok().map(|v| (v * 1024.0 * 1024.0) as u64)
    } else if let Some(stripped) = s.strip_suffix('G') {
        stripped.parse::<f64>().ok().map(|v| (v * 1024.0) as u64)
    } else if let Some(stripped) = s.strip_suffix('M') {
        stripped.parse::<f64>().ok().map(|v| v as u64)
    } else if let Some(stripped) = s.strip_suffix('K') {
        stripped.parse::<u64>().ok().map(|v| v / 1024)
    } else {
        // Assume MB if no suffix
        s.parse::<u64>().ok()
    }
}

/// Parse SLURM sacct memory format (e.g., "4Gn", "1000Mc").
fn parse_slurm_sacct_memory(s: &str) -> Option<u64> {
    // sacct memory can have 'n' or 'c' suffix (per node/per core)
    let s = s.trim().trim_end_matches('n').trim_end_matches('c');
    parse_slurm_memory(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slurm_memory() {
        assert_eq!(parse_memory_mb("4G", MemoryFormat::Slurm), Some(4096));
        assert_eq!(parse_memory_mb("1000M", MemoryFormat::Slurm), Some(1000));
        assert_eq!(parse_memory_mb("4096K", MemoryFormat::Slurm), Some(4));
        assert_eq!(parse_memory_mb("4096", MemoryFormat::Slurm), Some(4096));
        assert_eq!(parse_memory_mb("1.5G", MemoryFormat::Slurm), Some(1536));
        assert_eq!(parse_memory_mb("", MemoryFormat::Slurm), None);
    }

    #[test]
    fn test_parse_slurm_sacct_memory() {
        assert_eq!(parse_memory_mb("4Gn", MemoryFormat::SlurmSacct), Some(4096));
        assert_eq!(
            parse_memory_mb("1000Mc", MemoryFormat::SlurmSacct),
            Some(1000)
        );
        assert_eq!(
            parse_memory_mb("4096", MemoryFormat::SlurmSacct),
            Some(4096)
        );
    }
}
