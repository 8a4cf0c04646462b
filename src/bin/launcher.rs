use anyhow::Result;
use clap::Parser;
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use moodcam::camera::{self, CameraProbe};
use moodcam::config::AppConfig;
use moodcam::signal::ReadinessSignal;
use moodcam::supervisor::{LauncherEvent, Notifier, SessionSupervisor, WatchEvent};

#[derive(Parser, Debug)]
#[command(author, version, about = "Launcher for the live emotion analysis session")]
struct LauncherArgs {
    /// Camera Index (default 0)
    #[arg(short, long, default_value_t = 0)]
    cam_index: u32,

    /// Configuration file
    #[arg(long, default_value = AppConfig::DEFAULT_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = LauncherArgs::parse();
    let config = AppConfig::load(&args.config)?;
    let signal = ReadinessSignal::new(config.paths.signal_file.clone());

    println!("{}", "Face Expression Recognition".cyan().bold());
    println!("Commands: start | stop | open | quit");

    let mut supervisor: Option<SessionSupervisor> = None;
    let mut notifier = Notifier::new();
    let stdin = io::stdin();

    loop {
        // Anything the watcher saw since the last command gets reported
        // before the next prompt.
        let mut ended = false;
        if let Some(sup) = &supervisor {
            while let Some(event) = sup.try_event() {
                ended |= report_watch_event(event, &mut notifier);
            }
        }
        if ended {
            if let Some(mut sup) = supervisor.take() {
                let _ = sup.terminate();
            }
        }

        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match line.trim() {
            "start" => {
                start_session(
                    &args,
                    &config,
                    &signal,
                    &mut supervisor,
                    &mut notifier,
                    &stdin,
                )?;
            }
            "stop" => {
                match supervisor.take() {
                    Some(mut sup) => {
                        sup.terminate()?;
                        if let Some(msg) = notifier.notify(LauncherEvent::SessionEnded) {
                            println!("{}", msg);
                        }
                    }
                    None => println!("No session is running."),
                }
            }
            "open" => open_captures_directory(&config.paths.captures_dir),
            "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown command: {other}"),
        }
    }

    // Leaving the launcher tears the session down with it.
    if let Some(mut sup) = supervisor.take() {
        let _ = sup.terminate();
    }
    Ok(())
}

fn start_session(
    args: &LauncherArgs,
    config: &AppConfig,
    signal: &ReadinessSignal,
    supervisor: &mut Option<SessionSupervisor>,
    notifier: &mut Notifier,
    stdin: &io::Stdin,
) -> Result<()> {
    if supervisor.as_ref().map(|s| s.is_running()).unwrap_or(false) {
        println!("The camera is already ready to use.");
        return Ok(());
    }
    notifier.reset();

    // Permission first, like any camera-facing app should.
    if let Some(msg) = notifier.notify(LauncherEvent::PermissionRequested) {
        print!("{} [y/N] ", msg);
        io::stdout().flush()?;
    }
    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
        println!("Camera start cancelled.");
        return Ok(());
    }

    // Pre-flight: check the device directly before spawning anything, so
    // a busy camera fails fast with a clear message. The probe handle is
    // released before the session process starts.
    let probe = camera::probe(args.cam_index);
    if probe != CameraProbe::Available {
        if let Some(msg) = notifier.notify(LauncherEvent::CameraUnavailable) {
            println!("{} {}", msg.red(), probe.message());
        }
        return Ok(());
    }

    if let Some(msg) = notifier.notify(LauncherEvent::CameraStarting) {
        println!("{}", msg);
    }

    let cam_index = args.cam_index;
    let mut session_args = config.launcher.session_args.clone();
    session_args.push("--cam-index".to_string());
    session_args.push(cam_index.to_string());

    let sup = SessionSupervisor::launch(
        &config.launcher.session_program,
        &session_args,
        signal.clone(),
        Box::new(move || camera::probe(cam_index)),
        Duration::from_millis(config.timing.poll_interval_ms),
    )?;

    // Wait for the watcher's verdict: every startup path ends in exactly
    // one event.
    loop {
        match sup.wait_event(Duration::from_millis(250)) {
            Some(event) => {
                let ended = report_watch_event(event, notifier);
                if !ended {
                    *supervisor = Some(sup);
                }
                break;
            }
            None => continue,
        }
    }
    Ok(())
}

/// Print the single user-facing message for a watcher event. Returns true
/// when the event means the session is gone.
fn report_watch_event(event: WatchEvent, notifier: &mut Notifier) -> bool {
    match event {
        WatchEvent::Ready => {
            if let Some(msg) = notifier.notify(LauncherEvent::CameraReady) {
                println!("{}", msg.green());
            }
            false
        }
        WatchEvent::StaleSignal | WatchEvent::DeviceVanished => {
            if let Some(msg) = notifier.notify(LauncherEvent::CameraUnavailable) {
                println!("{}", msg.red());
            }
            if let Some(msg) = notifier.notify(LauncherEvent::SessionEnded) {
                println!("{}", msg);
            }
            true
        }
        WatchEvent::Exited(code) => {
            if let Some(msg) = notifier.notify(LauncherEvent::SessionEnded) {
                match code {
                    Some(0) | None => println!("{}", msg),
                    Some(c) => println!("{} (exit code {c})", msg),
                }
            }
            true
        }
    }
}

/// Open the captures directory in the platform file browser.
fn open_captures_directory(dir: &Path) {
    if !dir.exists() {
        println!("The folder '{}' does not exist yet.", dir.display());
        return;
    }
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    if let Err(e) = Command::new(opener).arg(dir).spawn() {
        eprintln!(
            "{}",
            format!("Failed to open the folder {}: {}", dir.display(), e).red()
        );
    }
}
