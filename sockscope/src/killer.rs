// Kill workflow: ports -> (pid, port) targets -> confirmation -> signals

use crate::cancel::CancelToken;
use crate::collector::ConnectionCollector;
use crate::error::Error;
use crate::model::{Pid, Snapshot};
use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd;
use std::collections::HashSet;
use std::io::{BufRead, Write};

/// Resolve a signal name or number
///
/// Names are case-insensitive and may carry a `SIG` prefix.
pub fn resolve_signal(name: &str) -> Result<Signal, Error> {
    let upper = name.trim().to_uppercase();
    let bare = upper.strip_prefix("SIG").unwrap_or(&upper);

    let signal = match bare {
        "TERM" | "TERMINATE" => Signal::SIGTERM,
        "KILL" => Signal::SIGKILL,
        "HUP" | "HANGUP" => Signal::SIGHUP,
        "INT" | "INTERRUPT" => Signal::SIGINT,
        "QUIT" => Signal::SIGQUIT,
        "USR1" => Signal::SIGUSR1,
        "USR2" => Signal::SIGUSR2,
        other => other
            .parse::<i32>()
            .ok()
            .and_then(|n| Signal::try_from(n).ok())
            .ok_or_else(|| Error::UnknownSignal(name.to_string()))?,
    };

    Ok(signal)
}

/// Explicit parameters for one kill invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillRequest {
    /// Signal name or number, resolved with [`resolve_signal`]
    pub signal: String,
    pub ports: Vec<u16>,
    /// Skip the interactive confirmation
    pub assume_yes: bool,
}

impl KillRequest {
    pub fn new(signal: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            signal: signal.into(),
            ports,
            assume_yes: false,
        }
    }

    pub fn assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }
}

/// A process bound to one of the requested local ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillTarget {
    pub pid: Pid,
    pub port: u16,
    pub name: String,
}

/// What a kill run ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    NoTargets,
    Aborted,
    Signalled(usize),
}

/// Find every (pid, local port) pair matching `ports`, in snapshot order
///
/// A pid bound to two requested ports yields two targets.
pub fn resolve_targets(snapshot: &Snapshot, ports: &[u16]) -> Vec<KillTarget> {
    let wanted: HashSet<u16> = ports.iter().copied().collect();
    let mut seen = HashSet::new();

    snapshot
        .connections()
        .filter(|(_, conn)| wanted.contains(&conn.local.port))
        .filter(|(_, conn)| seen.insert((conn.pid, conn.local.port)))
        .map(|(app, conn)| KillTarget {
            pid: conn.pid,
            port: conn.local.port,
            name: app.name.clone(),
        })
        .collect()
}

/// Delivers signals to processes
pub trait SignalSender {
    fn send(&self, pid: Pid, signal: Signal) -> Result<()>;
}

/// `kill(2)` through nix
pub struct NixSignalSender;

impl SignalSender for NixSignalSender {
    fn send(&self, pid: Pid, signal: Signal) -> Result<()> {
        kill(unistd::Pid::from_raw(pid), signal)
            .with_context(|| format!("Failed to send {} to pid {}", signal, pid))
    }
}

/// Ask for a y/yes answer; anything else (including EOF) is a no
pub fn confirm(input: &mut dyn BufRead, output: &mut dyn Write) -> Result<bool> {
    write!(output, "Proceed? [y/N]: ").context("Failed to write prompt")?;
    output.flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;

    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Kill workflow over injected I/O and signal delivery
pub struct Killer<'a> {
    collector: &'a ConnectionCollector,
    sender: &'a dyn SignalSender,
}

impl<'a> Killer<'a> {
    pub fn new(collector: &'a ConnectionCollector, sender: &'a dyn SignalSender) -> Self {
        Self { collector, sender }
    }

    /// Resolve, confirm and dispatch
    ///
    /// An unknown signal fails before anything is enumerated. Send failures
    /// don't stop the remaining targets; they are summarised as
    /// [`Error::KillFailed`] once every target has been tried.
    pub fn run(
        &self,
        request: &KillRequest,
        cancel: &CancelToken,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<KillOutcome> {
        let signal = resolve_signal(&request.signal)?;

        let snapshot = self.collector.collect(cancel)?;
        let targets = resolve_targets(&snapshot, &request.ports);

        if targets.is_empty() {
            writeln!(output, "No processes found on the requested port(s)")?;
            return Ok(KillOutcome::NoTargets);
        }

        writeln!(output, "Will send {} to:", signal)?;
        for target in &targets {
            writeln!(
                output,
                "  {} (PID {}) on port {}",
                target.name, target.pid, target.port
            )?;
        }

        if !request.assume_yes && !confirm(input, output)? {
            writeln!(output, "Aborted.")?;
            return Ok(KillOutcome::Aborted);
        }
        // The prompt may have waited long enough for Ctrl+C or the deadline
        cancel.check()?;

        let mut failed = 0;
        for target in &targets {
            cancel.check()?;
            match self.sender.send(target.pid, signal) {
                Ok(()) => {
                    log::info!(
                        "Sent {} to {} (pid {}, port {})",
                        signal,
                        target.name,
                        target.pid,
                        target.port
                    );
                    writeln!(output, "Sent {} to PID {}", signal, target.pid)?;
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("{:#}", e);
                    writeln!(output, "Error: {:#}", e)?;
                }
            }
        }

        if failed > 0 {
            return Err(Error::KillFailed {
                failed,
                total: targets.len(),
            }
            .into());
        }

        Ok(KillOutcome::Signalled(targets.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::process::{ProcessIdentity, ProcessUtils, SocketEntry, SocketKind};
    use crate::model::{ConnectionState, Endpoint};
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSockets {
        sockets: Vec<SocketEntry>,
        enumerations: Arc<AtomicUsize>,
    }

    impl ProcessUtils for StaticSockets {
        fn get_process_identity(&self, pid: Pid) -> Result<ProcessIdentity> {
            Ok(ProcessIdentity {
                name: format!("proc{}", pid),
                exe: None,
            })
        }

        fn process_exists(&self, _pid: Pid) -> bool {
            true
        }

        fn get_socket_table(&self, _cancel: &CancelToken) -> Result<Vec<SocketEntry>> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            Ok(self.sockets.clone())
        }

        fn socket_mapper_name(&self) -> &'static str {
            "static"
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: RefCell<Vec<(Pid, Signal)>>,
        fail_pid: Option<Pid>,
    }

    impl SignalSender for RecordingSender {
        fn send(&self, pid: Pid, signal: Signal) -> Result<()> {
            self.sent.borrow_mut().push((pid, signal));
            if self.fail_pid == Some(pid) {
                anyhow::bail!("Operation not permitted");
            }
            Ok(())
        }
    }

    fn listener(pid: Pid, port: u16) -> SocketEntry {
        SocketEntry {
            pid,
            kind: SocketKind::Stream,
            local: Endpoint::new("", port),
            remote: None,
            status: ConnectionState::Listen,
        }
    }

    fn static_collector(sockets: Vec<SocketEntry>) -> (ConnectionCollector, Arc<AtomicUsize>) {
        let enumerations = Arc::new(AtomicUsize::new(0));
        let utils = StaticSockets {
            sockets,
            enumerations: enumerations.clone(),
        };
        (
            ConnectionCollector::with_process_utils(Box::new(utils)),
            enumerations,
        )
    }

    /// Stdin stand-in that trips the token while the user is answering
    struct CancelWhileReading {
        cancel: CancelToken,
        inner: Cursor<Vec<u8>>,
    }

    impl std::io::Read for CancelWhileReading {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.cancel.cancel();
            self.inner.read(buf)
        }
    }

    impl BufRead for CancelWhileReading {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            self.cancel.cancel();
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt)
        }
    }

    fn run(
        collector: &ConnectionCollector,
        sender: &RecordingSender,
        request: &KillRequest,
        answer: &str,
    ) -> (Result<KillOutcome>, String) {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = Killer::new(collector, sender).run(
            request,
            &CancelToken::new(),
            &mut input,
            &mut output,
        );
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_resolve_signal_names() {
        assert_eq!(resolve_signal("term").unwrap(), Signal::SIGTERM);
        assert_eq!(resolve_signal("SIGTERM").unwrap(), Signal::SIGTERM);
        assert_eq!(resolve_signal("Terminate").unwrap(), Signal::SIGTERM);
        assert_eq!(resolve_signal("kill").unwrap(), Signal::SIGKILL);
        assert_eq!(resolve_signal("hangup").unwrap(), Signal::SIGHUP);
        assert_eq!(resolve_signal("sigint").unwrap(), Signal::SIGINT);
        assert_eq!(resolve_signal("QUIT").unwrap(), Signal::SIGQUIT);
        assert_eq!(resolve_signal("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn test_resolve_signal_rejects_unknown() {
        assert_eq!(
            resolve_signal("bogus"),
            Err(Error::UnknownSignal("bogus".to_string()))
        );
        assert!(resolve_signal("9999").is_err());
        assert!(resolve_signal("").is_err());
    }

    #[test]
    fn test_targets_deduplicated_per_pid_and_port() {
        let (collector, _) = static_collector(vec![
            listener(10, 8080),
            listener(10, 8080), // v4 + v6 bind of the same port
            listener(10, 9090),
            listener(20, 8080),
            listener(30, 7000),
        ]);
        let snapshot = collector.collect(&CancelToken::new()).unwrap();

        let targets = resolve_targets(&snapshot, &[8080, 9090]);
        let pairs: Vec<(Pid, u16)> = targets.iter().map(|t| (t.pid, t.port)).collect();
        assert_eq!(pairs, vec![(10, 8080), (10, 9090), (20, 8080)]);
        assert_eq!(targets[0].name, "proc10");
    }

    #[test]
    fn test_unknown_signal_fails_before_enumeration() {
        let (collector, enumerations) = static_collector(vec![listener(10, 8080)]);
        let sender = RecordingSender::default();

        let (result, _) = run(
            &collector,
            &sender,
            &KillRequest::new("NOPE", vec![8080]).assume_yes(true),
            "",
        );

        let err = result.unwrap_err();
        assert!(err.to_string().contains("unknown signal: NOPE"));
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::UnknownSignal("NOPE".to_string()))
        );
        assert_eq!(enumerations.load(Ordering::SeqCst), 0);
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn test_no_targets_is_success() {
        let (collector, _) = static_collector(vec![listener(10, 8080)]);
        let sender = RecordingSender::default();

        let (result, output) = run(
            &collector,
            &sender,
            &KillRequest::new("TERM", vec![1234]),
            "",
        );

        assert_eq!(result.unwrap(), KillOutcome::NoTargets);
        assert!(output.contains("No processes found"));
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn test_declined_confirmation_aborts() {
        let (collector, _) = static_collector(vec![listener(10, 8080)]);
        let sender = RecordingSender::default();

        let (result, output) = run(
            &collector,
            &sender,
            &KillRequest::new("TERM", vec![8080]),
            "n\n",
        );

        assert_eq!(result.unwrap(), KillOutcome::Aborted);
        assert!(output.contains("proc10 (PID 10) on port 8080"));
        assert!(output.contains("Aborted."));
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn test_confirmed_dispatch_signals_each_target() {
        let (collector, _) = static_collector(vec![listener(10, 8080), listener(10, 9090)]);
        let sender = RecordingSender::default();

        let (result, _) = run(
            &collector,
            &sender,
            &KillRequest::new("kill", vec![8080, 9090]),
            "YES\n",
        );

        assert_eq!(result.unwrap(), KillOutcome::Signalled(2));
        assert_eq!(
            *sender.sent.borrow(),
            vec![(10, Signal::SIGKILL), (10, Signal::SIGKILL)]
        );
    }

    #[test]
    fn test_send_failures_are_counted_after_all_attempts() {
        let (collector, _) = static_collector(vec![
            listener(10, 8080),
            listener(20, 8080),
            listener(30, 8080),
        ]);
        let sender = RecordingSender {
            fail_pid: Some(20),
            ..Default::default()
        };

        let (result, output) = run(
            &collector,
            &sender,
            &KillRequest::new("TERM", vec![8080]).assume_yes(true),
            "",
        );

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::KillFailed {
                failed: 1,
                total: 3
            })
        );
        assert_eq!(sender.sent.borrow().len(), 3);
        assert!(output.contains("Operation not permitted"));
    }

    #[test]
    fn test_cancel_during_confirmation_sends_nothing() {
        let (collector, _) = static_collector(vec![listener(10, 8080), listener(20, 8080)]);
        let sender = RecordingSender::default();
        let cancel = CancelToken::new();
        let mut input = CancelWhileReading {
            cancel: cancel.clone(),
            inner: Cursor::new(b"y\n".to_vec()),
        };
        let mut output = Vec::new();

        let err = Killer::new(&collector, &sender)
            .run(
                &KillRequest::new("TERM", vec![8080]),
                &cancel,
                &mut input,
                &mut output,
            )
            .unwrap_err();

        assert!(Error::is_cancelled(&err));
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn test_cancel_between_sends_stops_dispatch() {
        struct CancelAfterFirst {
            cancel: CancelToken,
            inner: RecordingSender,
        }

        impl SignalSender for CancelAfterFirst {
            fn send(&self, pid: Pid, signal: Signal) -> Result<()> {
                self.cancel.cancel();
                self.inner.send(pid, signal)
            }
        }

        let (collector, _) = static_collector(vec![
            listener(10, 8080),
            listener(20, 8080),
            listener(30, 8080),
        ]);
        let cancel = CancelToken::new();
        let sender = CancelAfterFirst {
            cancel: cancel.clone(),
            inner: RecordingSender::default(),
        };

        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        let err = Killer::new(&collector, &sender)
            .run(
                &KillRequest::new("TERM", vec![8080]).assume_yes(true),
                &cancel,
                &mut input,
                &mut output,
            )
            .unwrap_err();

        assert!(Error::is_cancelled(&err));
        assert_eq!(*sender.inner.sent.borrow(), vec![(10, Signal::SIGTERM)]);
    }

    #[test]
    fn test_confirm_accepts_yes_variants() {
        for (answer, expected) in [("y\n", true), ("Yes\n", true), ("\n", false), ("", false)] {
            let mut input = Cursor::new(answer.as_bytes().to_vec());
            let mut output = Vec::new();
            assert_eq!(confirm(&mut input, &mut output).unwrap(), expected);
        }
    }
}
