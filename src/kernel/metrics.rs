/*!
Global metrics record and the end-of-run text report.

Per-process metrics live on the descriptors (`ProcMetrics`) and are fed by
the kernel's metric-tick phase; this module holds the machine-wide counters
and renders everything into the human-readable report written when the last
process dies.
*/

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::irq::IRQ_KINDS;

use super::process::Process;
use super::table::ProcessTable;

/// Machine-wide counters, driven by the metric-tick phase and the IRQ
/// dispatcher.
#[derive(Clone, Debug, Default)]
pub struct KernelMetrics {
    /// Ticks observed since the first clock reading.
    pub total_time: i64,
    /// Ticks during which no process was current.
    pub idle_time: i64,
    /// Serviced interrupts, by kind index (`Irq::index`).
    pub irq_counts: [i64; IRQ_KINDS],
}

impl KernelMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sum of every descriptor's preemption count.
pub fn total_preemptions(table: &ProcessTable) -> i64 {
    table.iter().map(|p| p.metrics.preemptions).sum()
}

fn irq_label(index: usize) -> &'static str {
    match index {
        0 => "reset",
        1 => "cpu error",
        2 => "syscall",
        3 => "clock",
        _ => "unknown",
    }
}

/// File name the report is written under for a given policy name.
pub fn report_file_name(policy_name: &str) -> String {
    format!("metricas_so_{policy_name}.txt")
}

/// Render the full report.
pub fn write_report<W: Write>(
    out: &mut W,
    metrics: &KernelMetrics,
    table: &ProcessTable,
) -> io::Result<()> {
    writeln!(out, "=====================================================")?;
    writeln!(out, "              OPERATING SYSTEM METRICS")?;
    writeln!(out, "=====================================================")?;
    writeln!(out, " Total execution time        : {}", metrics.total_time)?;
    writeln!(out, " Total idle time             : {}", metrics.idle_time)?;
    writeln!(out, " Processes created           : {}", table.len())?;
    writeln!(
        out,
        " Total preemptions           : {}",
        total_preemptions(table)
    )?;
    writeln!(out)?;
    for (i, count) in metrics.irq_counts.iter().enumerate() {
        writeln!(out, " IRQ {:<24}: {}", irq_label(i), count)?;
    }

    writeln!(out)?;
    writeln!(out, "=====================================================")?;
    writeln!(out, "              PER-PROCESS METRICS")?;
    writeln!(out, "=====================================================")?;
    for p in table.iter() {
        write_process_block(out, p)?;
    }
    writeln!(out, "=====================================================")?;
    Ok(())
}

fn write_process_block<W: Write>(out: &mut W, p: &Process) -> io::Result<()> {
    let m = &p.metrics;
    writeln!(out, "-----------------------------------------------------")?;
    writeln!(out, " Process PID                 : {}", p.pid())?;
    writeln!(out, " Return time                 : {}", m.return_time)?;
    writeln!(out, " Mean response time          : {}", m.response_time)?;
    writeln!(out, " Preemptions                 : {}", m.preemptions)?;
    writeln!(out)?;
    writeln!(out, " READY state:")?;
    writeln!(out, "   - entries                 : {}", m.ready_entries)?;
    writeln!(out, "   - time                    : {}", m.ready_time)?;
    writeln!(out, " RUNNING state:")?;
    writeln!(out, "   - entries                 : {}", m.running_entries)?;
    writeln!(out, "   - time                    : {}", m.running_time)?;
    writeln!(out, " BLOCKED state:")?;
    writeln!(out, "   - entries                 : {}", m.blocked_entries)?;
    writeln!(out, "   - time                    : {}", m.blocked_time)?;
    writeln!(out, "-----------------------------------------------------")?;
    Ok(())
}

/// Write the report into `dir`, named after the scheduler policy.
pub fn write_report_file(
    dir: &Path,
    policy_name: &str,
    metrics: &KernelMetrics,
    table: &ProcessTable,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = fs::File::create(dir.join(report_file_name(policy_name)))?;
    write_report(&mut file, metrics, table)
}
