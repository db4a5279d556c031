use std::fs;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, RefreshKind, System, UpdateKind};
use thiserror::Error;
use tracing::{debug, warn};

/// One process as seen in a single snapshot of the process table.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSample {
    /// Unique within one snapshot only.
    pub pid: u32,
    pub command: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    /// Full command line, or `command` when unavailable.
    pub args: String,
}

impl ProcessSample {
    pub fn new(pid: u32, command: impl Into<String>, cpu: f64, mem: f64, args: impl Into<String>) -> Self {
        let command = command.into();
        let mut args = args.into();
        if args.trim().is_empty() {
            args = command.clone();
        }
        Self {
            pid,
            command,
            cpu_percent: sanitize_percent(cpu),
            mem_percent: sanitize_percent(mem),
            args,
        }
    }

    /// cpu + mem, the quantity impact ranking is based on.
    pub fn load(&self) -> f64 {
        self.cpu_percent + self.mem_percent
    }
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    ExitStatus {
        program: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("process sampling timed out after {0:?}")]
    Timeout(Duration),
    #[error("process table unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw per-process rows for the invoking user.
pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ProcessSample>, SampleError>;
}

/// Which [`ProcessTable`] implementation the application uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSource {
    #[default]
    Ps,
    Sysinfo,
}

impl ProcessSource {
    pub fn table(self) -> Arc<dyn ProcessTable> {
        match self {
            ProcessSource::Ps => Arc::new(PsTable::for_current_user()),
            ProcessSource::Sysinfo => Arc::new(SysinfoTable::for_current_user()),
        }
    }
}

/// Sorted, failure-tolerant view over a [`ProcessTable`]. Cheap to clone
/// into a worker thread.
#[derive(Clone)]
pub struct Sampler {
    table: Arc<dyn ProcessTable>,
}

impl Sampler {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// Highest cpu first, then highest mem. Any failure of the underlying
    /// table yields an empty list; the next tick retries.
    pub fn sample(&self) -> Vec<ProcessSample> {
        match self.table.snapshot() {
            Ok(mut samples) => {
                sort_by_usage(&mut samples);
                debug!("sampled {} processes", samples.len());
                samples
            }
            Err(e) => {
                warn!("process sampling failed: {e}");
                Vec::new()
            }
        }
    }
}

pub fn sort_by_usage(samples: &mut [ProcessSample]) {
    samples.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then_with(|| b.mem_percent.total_cmp(&a.mem_percent))
    });
}

fn sanitize_percent(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

fn parse_percent(field: &str) -> f64 {
    field.parse::<f64>().map(sanitize_percent).unwrap_or(0.0)
}

fn current_uid() -> u32 {
    // SAFETY: getuid() has no preconditions, cannot fail and touches no
    // memory owned by Rust.
    unsafe { libc::getuid() }
}

// ─── ps(1) ──────────────────────────────────────────────────────

const PS_PROGRAM: &str = "ps";
/// `ps` is killed past this point, ahead of the worker timeout.
const PS_DEADLINE: Duration = Duration::from_secs(4);
const PS_POLL: Duration = Duration::from_millis(20);

/// Reads `ps -u <uid> -o pid=,%cpu=,%mem=,comm=,args=`.
pub struct PsTable {
    uid: u32,
    deadline: Duration,
}

impl PsTable {
    pub fn for_current_user() -> Self {
        Self {
            uid: current_uid(),
            deadline: PS_DEADLINE,
        }
    }
}

impl ProcessTable for PsTable {
    fn snapshot(&self) -> Result<Vec<ProcessSample>, SampleError> {
        let mut cmd = Command::new(PS_PROGRAM);
        cmd.args(["-u", &self.uid.to_string(), "-o", "pid=,%cpu=,%mem=,comm=,args="]);
        let stdout = run_with_deadline(PS_PROGRAM, cmd, self.deadline)?;
        Ok(parse_ps_output(&stdout))
    }
}

/// Run `cmd` to completion and return its stdout. A child still running
/// after `deadline` is killed and reaped.
fn run_with_deadline(
    program: &'static str,
    mut cmd: Command,
    deadline: Duration,
) -> Result<String, SampleError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| SampleError::Spawn { program, source })?;

    // Drain stdout concurrently so a full pipe cannot stall the child.
    let pipe = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok::<_, io::Error>(buf)
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(SampleError::Timeout(deadline));
            }
            Ok(None) => thread::sleep(PS_POLL),
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(SampleError::Spawn { program, source });
            }
        }
    };

    let stdout = reader
        .join()
        .map_err(|_| SampleError::Unavailable(format!("{program} output reader panicked")))?
        .map_err(|source| SampleError::Spawn { program, source })?;
    if !status.success() {
        return Err(SampleError::ExitStatus { program, status });
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Parse header-less `pid %cpu %mem comm args` rows.
///
/// Rows with fewer than four columns or a non-numeric pid are skipped. A
/// missing args column falls back to the command name; unparsable numbers
/// become 0.0 without dropping the row.
pub fn parse_ps_output(output: &str) -> Vec<ProcessSample> {
    parse_ps_rows(output, proc_comm)
}

/// The kernel's name for `pid`, which may contain spaces ("Web Content").
fn proc_comm(pid: u32) -> Option<String> {
    fs::read_to_string(format!("/proc/{pid}/comm"))
        .ok()
        .map(|c| c.trim_end_matches('\n').to_string())
}

fn parse_ps_rows(output: &str, comm_of: impl Fn(u32) -> Option<String>) -> Vec<ProcessSample> {
    output
        .lines()
        .filter_map(|line| {
            let (fields, rest) = split_columns(line, 3);
            let [pid, cpu, mem] = fields[..] else {
                return None;
            };
            let pid = pid.parse::<u32>().ok()?;
            if rest.is_empty() {
                return None;
            }
            let (command, args) = split_command(rest, comm_of(pid).as_deref());
            Some(ProcessSample::new(
                pid,
                command,
                parse_percent(cpu),
                parse_percent(mem),
                args,
            ))
        })
        .collect()
}

/// Split `comm args` using the known name when it prefixes the text,
/// otherwise at the first whitespace.
fn split_command<'a>(rest: &'a str, comm: Option<&str>) -> (&'a str, &'a str) {
    if let Some(comm) = comm.filter(|c| !c.is_empty()) {
        if let Some(args) = rest.strip_prefix(comm) {
            if args.is_empty() || args.starts_with(char::is_whitespace) {
                return (&rest[..comm.len()], args.trim_start());
            }
        }
    }
    let (fields, args) = split_columns(rest, 1);
    (fields.first().copied().unwrap_or(rest), args)
}

/// First `n` whitespace-separated columns, plus the trimmed remainder.
fn split_columns(line: &str, n: usize) -> (Vec<&str>, &str) {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    while fields.len() < n && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    (fields, rest.trim_end())
}

// ─── sysinfo ────────────────────────────────────────────────────

/// Same rows as [`PsTable`], read through `sysinfo`. The `System` is kept
/// between snapshots so CPU usage is measured over the tick interval.
pub struct SysinfoTable {
    uid: u32,
    sys: Mutex<System>,
}

impl SysinfoTable {
    pub fn for_current_user() -> Self {
        Self {
            uid: current_uid(),
            sys: Mutex::new(System::new()),
        }
    }
}

impl ProcessTable for SysinfoTable {
    fn snapshot(&self) -> Result<Vec<ProcessSample>, SampleError> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|_| SampleError::Unavailable("sysinfo state poisoned".into()))?;

        sys.refresh_specifics(
            RefreshKind::new()
                .with_memory(MemoryRefreshKind::new().with_ram())
                .with_processes(
                    ProcessRefreshKind::new()
                        .with_cpu()
                        .with_memory()
                        .with_cmd(UpdateKind::OnlyIfNotSet)
                        .with_user(UpdateKind::OnlyIfNotSet),
                ),
        );

        let total_memory = sys.total_memory();
        if total_memory == 0 {
            return Err(SampleError::Unavailable("total memory reported as zero".into()));
        }

        let samples = sys
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .filter(|p| p.user_id().map(|u| **u) == Some(self.uid))
            .map(|p| {
                let command = p.name().to_string_lossy().to_string();
                let args = p
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let mem = p.memory() as f64 / total_memory as f64 * 100.0;
                ProcessSample::new(p.pid().as_u32(), command, f64::from(p.cpu_usage()), mem, args)
            })
            .collect();
        Ok(samples)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory table for tests.
    pub(crate) struct StaticTable(pub Result<Vec<ProcessSample>, String>);

    impl ProcessTable for StaticTable {
        fn snapshot(&self) -> Result<Vec<ProcessSample>, SampleError> {
            self.0.clone().map_err(SampleError::Unavailable)
        }
    }

    fn no_comm(_: u32) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_full_rows() {
        let rows = parse_ps_rows(
            "  1234 12.5  8.0 firefox         /usr/lib/firefox/firefox -contentproc\n    7 0.0 0.1 bash -bash\n",
            no_comm,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pid, 1234);
        assert_eq!(rows[0].command, "firefox");
        assert_eq!(rows[0].cpu_percent, 12.5);
        assert_eq!(rows[0].mem_percent, 8.0);
        assert_eq!(rows[0].args, "/usr/lib/firefox/firefox -contentproc");
        assert_eq!(rows[1].args, "-bash");
    }

    #[test]
    fn test_parse_command_with_spaces() {
        let comm = |pid: u32| (pid == 123).then(|| "Web Content".to_string());
        let rows = parse_ps_rows(
            "123 1.0 2.0 Web Content     /usr/lib/firefox/firefox -contentproc\n124 0.5 0.5 Web Content\n",
            comm,
        );
        assert_eq!(rows[0].command, "Web Content");
        assert_eq!((rows[0].cpu_percent, rows[0].mem_percent), (1.0, 2.0));
        assert_eq!(rows[0].args, "/usr/lib/firefox/firefox -contentproc");
        // Without the kernel name the first word is taken; numbers stay intact.
        assert_eq!(rows[1].command, "Web");
        assert_eq!((rows[1].cpu_percent, rows[1].mem_percent), (0.5, 0.5));
    }

    #[test]
    fn test_parse_ignores_non_prefix_comm() {
        let comm = |_: u32| Some("Web".to_string());
        let rows = parse_ps_rows("9 0.0 0.0 WebKitNetwork /usr/libexec/WebKitNetwork\n", comm);
        assert_eq!(rows[0].command, "WebKitNetwork");
    }

    #[test]
    fn test_parse_missing_args_falls_back_to_command() {
        let rows = parse_ps_rows("42 0.3 0.0 kworker\n", no_comm);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "kworker");
        assert_eq!(rows[0].args, "kworker");
    }

    #[test]
    fn test_parse_bad_numbers_default_to_zero() {
        let rows = parse_ps_rows("5 abc 1.5 foo foo\n6 2.0 -3 bar bar\n7 NaN inf baz baz\n", no_comm);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].cpu_percent, rows[0].mem_percent), (0.0, 1.5));
        assert_eq!((rows[1].cpu_percent, rows[1].mem_percent), (2.0, 0.0));
        assert_eq!((rows[2].cpu_percent, rows[2].mem_percent), (0.0, 0.0));
    }

    #[test]
    fn test_parse_skips_short_and_header_rows() {
        let rows = parse_ps_rows("PID %CPU %MEM COMMAND COMMAND\n\n12 1.0 1.0\n13 1 1 ok ok\n", no_comm);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pid, 13);
    }

    #[test]
    fn test_run_with_deadline_returns_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("1 0.0 0.0 init");
        let out = run_with_deadline("echo", cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "1 0.0 0.0 init");
    }

    #[test]
    fn test_run_with_deadline_kills_hung_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = Instant::now();
        let err = run_with_deadline("sleep", cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, SampleError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_run_with_deadline_reports_exit_status() {
        let cmd = Command::new("false");
        let err = run_with_deadline("false", cmd, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SampleError::ExitStatus { .. }));
    }

    #[test]
    fn test_sample_orders_by_cpu_then_mem() {
        let sampler = Sampler::new(Arc::new(StaticTable(Ok(vec![
            ProcessSample::new(1, "a", 1.0, 9.0, ""),
            ProcessSample::new(2, "b", 5.0, 1.0, ""),
            ProcessSample::new(3, "c", 5.0, 2.0, ""),
            ProcessSample::new(4, "d", 0.0, 0.0, ""),
        ]))));
        let pids: Vec<u32> = sampler.sample().iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_sample_failure_is_empty() {
        let sampler = Sampler::new(Arc::new(StaticTable(Err("ps not installed".into()))));
        assert!(sampler.sample().is_empty());
    }

    #[test]
    fn test_sample_load() {
        let s = ProcessSample::new(1, "foo", 10.0, 5.0, "foo --daemon");
        assert_eq!(s.load(), 15.0);
    }

    #[test]
    fn test_process_source_serde() {
        assert_eq!(serde_json::to_string(&ProcessSource::Sysinfo).unwrap(), "\"sysinfo\"");
        let parsed: ProcessSource = serde_json::from_str("\"ps\"").unwrap();
        assert_eq!(parsed, ProcessSource::Ps);
    }
}
