// nettop-based per-process byte counters (macOS)
//
// `nettop -P -L 1` prints one record per process as `<name>.<pid>` followed
// by the requested columns. Records may be whitespace or comma separated,
// optionally prefixed with a sample timestamp.

use super::NetIoBackend;
use crate::backends::BackendPriority;
use crate::backends::command::{command_exists, run_command};
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{NetIoMap, NetIoStats, Pid};
use anyhow::Result;

pub struct NettopCollector;

impl NettopCollector {
    /// Real per-process counters, but the tool only ships with macOS
    pub const PRIORITY: BackendPriority = if cfg!(target_os = "macos") {
        BackendPriority::Best
    } else {
        BackendPriority::Fallback
    };

    /// Parse nettop records into a pid-keyed map
    ///
    /// Records for the same pid are summed; one process can own several
    /// sockets and interfaces. Lines that don't parse are skipped.
    pub fn parse_nettop_output(output: &str) -> NetIoMap {
        let mut stats = NetIoMap::new();

        for line in output.lines() {
            let Some((pid, bytes_in, bytes_out)) = Self::parse_record(line) else {
                continue;
            };

            stats
                .entry(pid)
                .and_modify(|s: &mut NetIoStats| s.accumulate(bytes_in, bytes_out))
                .or_insert_with(|| NetIoStats::new(bytes_in, bytes_out));
        }

        stats
    }

    fn parse_record(line: &str) -> Option<(Pid, u64, u64)> {
        let mut fields: Vec<&str> = if line.contains(',') {
            line.split(',').map(str::trim).filter(|f| !f.is_empty()).collect()
        } else {
            line.split_whitespace().collect()
        };

        // CSV mode leads with a "HH:MM:SS.micros" sample time
        if fields.len() > 3 && is_timestamp(fields[0]) {
            fields.remove(0);
        }

        if fields.len() < 3 {
            return None;
        }

        let (_, pid) = fields[0].rsplit_once('.')?;
        let pid: Pid = pid.parse().ok()?;
        let bytes_in: u64 = fields[fields.len() - 2].parse().ok()?;
        let bytes_out: u64 = fields[fields.len() - 1].parse().ok()?;

        Some((pid, bytes_in, bytes_out))
    }
}

fn is_timestamp(field: &str) -> bool {
    field.contains(':')
        && field
            .chars()
            .all(|c| c.is_ascii_digit() || c == ':' || c == '.')
}

impl NetIoBackend for NettopCollector {
    fn name(&self) -> &'static str {
        "nettop"
    }

    fn priority(&self) -> BackendPriority {
        Self::PRIORITY
    }

    fn is_available() -> bool {
        command_exists("nettop")
    }

    fn collect(&self, cancel: &CancelToken) -> Result<NetIoMap> {
        if !Self::is_available() {
            log::debug!("nettop not found, skipping I/O enrichment");
            return Ok(NetIoMap::new());
        }

        // -P: per-process summary, -L 1: one sample then exit, -x: raw numbers
        let output = match run_command(
            "nettop",
            &["-P", "-L", "1", "-x", "-J", "bytes_in,bytes_out"],
            cancel,
        ) {
            Ok(output) => output,
            Err(e) if Error::is_cancelled(&e) => return Err(e),
            Err(e) => {
                log::debug!("nettop failed to run: {:#}", e);
                return Ok(NetIoMap::new());
            }
        };

        if !output.status.success() {
            log::debug!(
                "nettop exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(NetIoMap::new());
        }

        Ok(Self::parse_nettop_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_for_same_pid_are_summed() {
        let stats =
            NettopCollector::parse_nettop_output("worker.123\t1000\t2000\nworker.123\t500\t300\n");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[&123].bytes_recv, 1500);
        assert_eq!(stats[&123].bytes_sent, 2300);
    }

    #[test]
    fn test_leading_whitespace_and_dotted_names() {
        let stats =
            NettopCollector::parse_nettop_output("   com.apple.WebKit.Networking.812   10   20\n");
        assert_eq!(stats[&812].bytes_recv, 10);
        assert_eq!(stats[&812].bytes_sent, 20);
    }

    #[test]
    fn test_csv_with_timestamp() {
        let output = "time,,bytes_in,bytes_out,\n14:30:18.585740,Google Chrome H.4410,7000,300,\n";
        let stats = NettopCollector::parse_nettop_output(output);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[&4410].bytes_recv, 7000);
        assert_eq!(stats[&4410].bytes_sent, 300);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let output = "garbage\nnodot 1 2\nname.abc 1 2\nname.7 x 2\nok.9 1 2\n";
        let stats = NettopCollector::parse_nettop_output(output);
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key(&9));
    }
}
