use crate::camera::CameraProbe;
use crate::signal::ReadinessSignal;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Externally visible launcher transitions. Each one maps to exactly one
/// user-facing message per session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LauncherEvent {
    PermissionRequested,
    CameraStarting,
    CameraReady,
    CameraUnavailable,
    SessionEnded,
}

/// Deduplicating message source: the first occurrence of a transition
/// yields its message, repeats yield nothing. `reset` starts the next
/// session attempt with a clean slate.
#[derive(Debug, Default)]
pub struct Notifier {
    seen: HashSet<LauncherEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&mut self, event: LauncherEvent) -> Option<&'static str> {
        if !self.seen.insert(event) {
            return None;
        }
        Some(match event {
            LauncherEvent::PermissionRequested => {
                "Do you agree to show your face and start the camera?"
            }
            LauncherEvent::CameraStarting => "The camera will start shortly. Please wait.",
            LauncherEvent::CameraReady => "The camera is ready to use.",
            LauncherEvent::CameraUnavailable => {
                "The camera is not available. Close other applications using it and try again."
            }
            LauncherEvent::SessionEnded => {
                "The camera was turned off. Start a new live analysis to see emotions again."
            }
        })
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

/// What the background watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Signal file present and the camera is actually held: session live.
    Ready,
    /// Signal file present but the camera is still acquirable, so the
    /// writer died without cleaning up.
    StaleSignal,
    /// Signal file present but the device has vanished entirely.
    DeviceVanished,
    /// The session process exited.
    Exited(Option<i32>),
}

/// Owns a spawned capture-session process and a watcher thread that polls
/// the readiness signal and the child's exit status. The only state the
/// watcher shares with the interactive thread is the child handle (for
/// exit polling) and the event channel.
pub struct SessionSupervisor {
    child: Arc<Mutex<Child>>,
    signal: ReadinessSignal,
    stop: Arc<AtomicBool>,
    events: Receiver<WatchEvent>,
    watcher: Option<JoinHandle<()>>,
}

impl SessionSupervisor {
    /// Spawn the session command and start watching. `probe` re-checks
    /// the camera once the signal appears, to tell a live session apart
    /// from a stale flag file; it runs on the watcher thread.
    pub fn launch(
        program: &str,
        args: &[String],
        signal: ReadinessSignal,
        probe: Box<dyn Fn() -> CameraProbe + Send>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start session process '{program}'"))?;

        let child = Arc::new(Mutex::new(child));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let watcher = {
            let child = Arc::clone(&child);
            let signal = signal.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || watch(child, signal, probe, poll_interval, stop, tx))
        };

        Ok(Self {
            child,
            signal,
            stop,
            events: rx,
            watcher: Some(watcher),
        })
    }

    /// Non-blocking event poll, so an interactive loop stays responsive.
    pub fn try_event(&self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }

    /// Block up to `timeout` for the next watcher event.
    pub fn wait_event(&self, timeout: Duration) -> Option<WatchEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn is_running(&self) -> bool {
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    /// Kill the session process, stop the watcher, and clear any signal
    /// the session left behind.
    pub fn terminate(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
        self.signal.clear()
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        if self.watcher.is_some() {
            let _ = self.terminate();
        }
    }
}

fn watch(
    child: Arc<Mutex<Child>>,
    signal: ReadinessSignal,
    probe: Box<dyn Fn() -> CameraProbe + Send>,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    tx: Sender<WatchEvent>,
) {
    let mut reported_ready = false;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        let exit = child
            .lock()
            .ok()
            .and_then(|mut c| c.try_wait().ok().flatten());
        if let Some(status) = exit {
            let _ = tx.send(WatchEvent::Exited(status.code()));
            return;
        }

        // The flag file alone is not trusted: once it shows up, verify
        // the camera really is held. Before it shows up we never probe,
        // so the session's own acquisition cannot be disturbed.
        if !reported_ready && signal.is_signaled() {
            match probe() {
                CameraProbe::Busy => {
                    let _ = tx.send(WatchEvent::Ready);
                    reported_ready = true;
                }
                CameraProbe::Available => {
                    let _ = tx.send(WatchEvent::StaleSignal);
                    return;
                }
                CameraProbe::NotAccessible => {
                    let _ = tx.send(WatchEvent::DeviceVanished);
                    return;
                }
            }
        }

        thread::sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_yields_each_message_once() {
        let mut notifier = Notifier::new();
        assert!(notifier.notify(LauncherEvent::CameraStarting).is_some());
        assert!(notifier.notify(LauncherEvent::CameraStarting).is_none());
        assert!(notifier.notify(LauncherEvent::CameraReady).is_some());
        assert!(notifier.notify(LauncherEvent::CameraReady).is_none());
    }

    #[test]
    fn notifier_reset_allows_a_new_attempt() {
        let mut notifier = Notifier::new();
        assert!(notifier.notify(LauncherEvent::SessionEnded).is_some());
        notifier.reset();
        assert!(notifier.notify(LauncherEvent::SessionEnded).is_some());
    }

    fn temp_signal() -> (tempfile::TempDir, ReadinessSignal) {
        let dir = tempfile::tempdir().unwrap();
        let signal = ReadinessSignal::new(dir.path().join("camera_ready.signal"));
        (dir, signal)
    }

    #[test]
    fn child_exit_is_reported() {
        let (_dir, signal) = temp_signal();
        let mut supervisor = SessionSupervisor::launch(
            "sh",
            &["-c".to_string(), "exit 0".to_string()],
            signal,
            Box::new(|| CameraProbe::Busy),
            Duration::from_millis(10),
        )
        .unwrap();

        let event = supervisor.wait_event(Duration::from_secs(5));
        assert_eq!(event, Some(WatchEvent::Exited(Some(0))));
        supervisor.terminate().unwrap();
    }

    #[test]
    fn signal_plus_busy_camera_means_ready() {
        let (_dir, signal) = temp_signal();
        let mut supervisor = SessionSupervisor::launch(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            signal.clone(),
            Box::new(|| CameraProbe::Busy),
            Duration::from_millis(10),
        )
        .unwrap();

        signal.signal().unwrap();
        let event = supervisor.wait_event(Duration::from_secs(5));
        assert_eq!(event, Some(WatchEvent::Ready));

        supervisor.terminate().unwrap();
        assert!(!signal.is_signaled());
    }

    #[test]
    fn signal_with_acquirable_camera_is_stale() {
        let (_dir, signal) = temp_signal();
        let mut supervisor = SessionSupervisor::launch(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            signal.clone(),
            Box::new(|| CameraProbe::Available),
            Duration::from_millis(10),
        )
        .unwrap();

        signal.signal().unwrap();
        let event = supervisor.wait_event(Duration::from_secs(5));
        assert_eq!(event, Some(WatchEvent::StaleSignal));
        supervisor.terminate().unwrap();
    }

    #[test]
    fn terminate_kills_a_running_child() {
        let (_dir, signal) = temp_signal();
        let mut supervisor = SessionSupervisor::launch(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            signal,
            Box::new(|| CameraProbe::Busy),
            Duration::from_millis(10),
        )
        .unwrap();

        assert!(supervisor.is_running());
        supervisor.terminate().unwrap();
        assert!(!supervisor.is_running());
    }
}
