use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use frametap::{
    CaptureConfig, Frame, FrameQueue, FrameTap, Image, Monitor, PermissionCheck, PermissionStatus, Rect,
    Target, Window,
};
use tracing::{debug, info};

use crate::args::Mode;

// ── Listing ───────────────────────────────────────────────────────────────────

fn monitor_line(m: &Monitor) -> String {
    format!("[{}] {}  {}x{} @ {},{}  scale={:.1}", m.id, m.name, m.width, m.height, m.x, m.y, m.scale)
}

fn window_line(w: &Window) -> String {
    format!("[{}] {}  {}x{} @ {},{}", w.id, w.name, w.width, w.height, w.x, w.y)
}

pub fn list_monitors() -> ExitCode {
    let monitors = frametap::get_monitors();
    if monitors.is_empty() {
        println!("No monitors found.");
    }
    for m in &monitors {
        println!("{}", monitor_line(m));
    }
    ExitCode::SUCCESS
}

pub fn list_windows() -> ExitCode {
    let windows = frametap::get_windows();
    if windows.is_empty() {
        println!("No windows found.");
    }
    for w in &windows {
        println!("{}", window_line(w));
    }
    ExitCode::SUCCESS
}

fn print_report(report: &PermissionCheck, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", report.summary)?;
    for line in &report.details {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

pub fn check_permissions() -> Result<ExitCode> {
    let report = frametap::check_permissions();
    print_report(&report, &mut io::stdout())?;
    Ok(match report.status {
        PermissionStatus::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Fails with the report on stderr when capture cannot work at all.
fn ensure_capture_possible() -> Result<()> {
    let report = frametap::check_permissions();
    if report.status == PermissionStatus::Error {
        print_report(&report, &mut io::stderr())?;
        bail!("Cannot proceed -- fix the issues above.");
    }
    Ok(())
}

// ── Configuration ─────────────────────────────────────────────────────────────

pub fn load_config(path: Option<&Path>) -> Result<CaptureConfig> {
    let Some(path) = path else { return Ok(CaptureConfig::default()) };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: CaptureConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    debug!("loaded {:?} from {}", config, path.display());
    Ok(config)
}

// ── Targets ───────────────────────────────────────────────────────────────────

fn resolve(mode: Mode) -> Result<Target> {
    match mode {
        Mode::Screen => Ok(Target::Screen),
        Mode::Region(rect) => Ok(Target::Region(rect)),
        Mode::Monitor(id) => frametap::get_monitors()
            .into_iter()
            .find(|m| m.id == id)
            .map(Target::Monitor)
            .with_context(|| {
                format!("monitor ID {id} not found.\nRun 'frametap --list-monitors' to see available IDs.")
            }),
        Mode::Window(id) => frametap::get_windows()
            .into_iter()
            .find(|w| w.id == id)
            .map(Target::Window)
            .with_context(|| {
                format!("window ID {id} not found.\nRun 'frametap --list-windows' to see available IDs.")
            }),
        Mode::Interactive => pick_interactively(&mut io::stdin().lock()),
    }
}

// ── Interactive menus ─────────────────────────────────────────────────────────

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("unexpected end of input");
    }
    Ok(line.trim().to_owned())
}

/// 1-based menu choice among `len` entries.
fn menu_index(answer: &str, len: usize) -> Option<usize> {
    answer.parse::<usize>().ok().filter(|n| (1..=len).contains(n)).map(|n| n - 1)
}

fn pick_interactively(input: &mut impl BufRead) -> Result<Target> {
    let report = frametap::check_permissions();
    print_report(&report, &mut io::stdout())?;
    if report.status == PermissionStatus::Error {
        bail!("Cannot proceed -- fix the issues above.");
    }

    println!("\nCapture mode:");
    println!("  1) Screen (pick a monitor)");
    println!("  2) Window (pick a window)");
    println!("  3) Region (enter coordinates)");
    match prompt(input, "\nChoice [1-3]: ")?.as_str() {
        "1" => {
            let monitors = frametap::get_monitors();
            if monitors.is_empty() {
                bail!("No monitors found.");
            }
            println!("\nMonitors:");
            for (i, m) in monitors.iter().enumerate() {
                println!("  {}) [{}] {}  {}x{}  scale={:.1}", i + 1, m.id, m.name, m.width, m.height, m.scale);
            }
            let pick = menu_index(&prompt(input, "\nMonitor number: ")?, monitors.len())
                .context("Invalid selection.")?;
            Ok(Target::Monitor(monitors[pick].clone()))
        }
        "2" => {
            let windows = frametap::get_windows();
            if windows.is_empty() {
                bail!("No windows found.");
            }
            println!("\nWindows:");
            for (i, w) in windows.iter().enumerate() {
                println!("  {}) {}  {}x{}", i + 1, w.name, w.width, w.height);
            }
            let pick = menu_index(&prompt(input, "\nWindow number: ")?, windows.len())
                .context("Invalid selection.")?;
            Ok(Target::Window(windows[pick].clone()))
        }
        "3" => {
            let mut coord = |label: &str| -> Result<f64> {
                prompt(input, label)?.parse::<f64>().context("Invalid region.")
            };
            let rect = Rect::new(coord("x: ")?, coord("y: ")?, coord("width: ")?, coord("height: ")?);
            if !(rect.width > 0.0 && rect.height > 0.0) {
                bail!("Invalid region.");
            }
            Ok(Target::Region(rect))
        }
        _ => bail!("Invalid choice."),
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// Drop alpha: BMP output is 24-bit.
fn to_rgb(shot: &Image) -> Vec<u8> {
    shot.data.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect()
}

fn save_bmp(shot: &Image, path: &Path) -> Result<()> {
    let width = u32::try_from(shot.width).context("image too wide for BMP")?;
    let height = u32::try_from(shot.height).context("image too tall for BMP")?;
    let rgb = image::RgbImage::from_raw(width, height, to_rgb(shot))
        .context("image buffer does not match its dimensions")?;
    rgb.save_with_format(path, image::ImageFormat::Bmp)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn screenshot(mode: Mode, config: CaptureConfig, output: &Path) -> Result<ExitCode> {
    if mode != Mode::Interactive {
        ensure_capture_possible()?;
    }
    let target = resolve(mode)?;
    let tap = FrameTap::with_config(target, config).context("opening capture session")?;
    let shot = tap.screenshot().context("taking screenshot")?;
    if shot.is_empty() {
        bail!("Screenshot returned no data.");
    }
    save_bmp(&shot, output)?;
    println!("Saved {}x{} screenshot to {}", shot.width, shot.height, output.display());
    Ok(ExitCode::SUCCESS)
}

/// Frame count and timing of a finished stream.
#[derive(Debug, Default, PartialEq)]
struct StreamStats {
    frames: usize,
    last_size: (usize, usize),
    interval_sum_ms: f64,
    intervals: usize,
}

impl StreamStats {
    fn record(&mut self, frame: &Frame) {
        self.frames += 1;
        self.last_size = (frame.image.width, frame.image.height);
        // Zero marks the first frame after start or resume.
        if frame.duration_ms > 0.0 {
            self.interval_sum_ms += frame.duration_ms;
            self.intervals += 1;
        }
    }

    fn mean_interval_ms(&self) -> Option<f64> {
        (self.intervals > 0).then(|| self.interval_sum_ms / self.intervals as f64)
    }
}

pub fn stream(mode: Mode, config: CaptureConfig, secs: u64) -> Result<ExitCode> {
    ensure_capture_possible()?;
    let target = resolve(mode)?;
    let mut tap = FrameTap::with_config(target, config).context("opening capture session")?;

    let queue = Arc::new(FrameQueue::new());
    let sink = Arc::clone(&queue);
    tap.on_frame(move |frame| sink.push(frame.clone()));
    tap.start().context("starting stream")?;
    info!("streaming for {secs}s");

    let mut stats = StreamStats::default();
    let deadline = Instant::now() + Duration::from_secs(secs);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        if let Some(frame) = queue.pop_timeout(left.min(Duration::from_millis(100))) {
            stats.record(&frame);
        }
    }
    tap.stop();
    queue.close();
    while let Some(frame) = queue.try_pop() {
        stats.record(&frame);
    }

    let (w, h) = stats.last_size;
    match stats.mean_interval_ms() {
        Some(mean) => println!("Streamed {} frames ({w}x{h}) in {secs}s, mean interval {mean:.1}ms", stats.frames),
        None => println!("Streamed {} frames ({w}x{h}) in {secs}s", stats.frames),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: usize, duration_ms: f64) -> Frame {
        Frame { image: Image { data: vec![0; width * 4], width, height: 1 }, duration_ms }
    }

    #[test]
    fn listing_lines() {
        let m = Monitor { id: 0, name: "DP-1".into(), x: 1920, y: 0, width: 2560, height: 1440, scale: 1.5 };
        assert_eq!(monitor_line(&m), "[0] DP-1  2560x1440 @ 1920,0  scale=1.5");
        let w = Window { id: 4194311, name: "Terminal".into(), x: -5, y: 10, width: 800, height: 600 };
        assert_eq!(window_line(&w), "[4194311] Terminal  800x600 @ -5,10");
    }

    #[test]
    fn report_is_indented() {
        let report = PermissionCheck::new(PermissionStatus::Ok, "X11 connection OK.").detail("DISPLAY=:0");
        let mut out = Vec::new();
        print_report(&report, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "X11 connection OK.\n  DISPLAY=:0\n");
    }

    #[test]
    fn menu_choices_are_one_based() {
        assert_eq!(menu_index("1", 3), Some(0));
        assert_eq!(menu_index("3", 3), Some(2));
        assert_eq!(menu_index("0", 3), None);
        assert_eq!(menu_index("4", 3), None);
        assert_eq!(menu_index("x", 3), None);
    }

    #[test]
    fn rgb_drops_alpha() {
        let shot = Image { data: vec![1, 2, 3, 255, 4, 5, 6, 0], width: 2, height: 1 };
        assert_eq!(to_rgb(&shot), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn bmp_round_trips_through_the_image_crate() {
        let path = std::env::temp_dir().join(format!("frametap-cli-{}.bmp", std::process::id()));
        let shot = Image { data: vec![200, 150, 100, 255, 10, 20, 30, 255], width: 2, height: 1 };
        save_bmp(&shot, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgb8();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.dimensions(), (2, 1));
        assert_eq!(back.get_pixel(0, 0).0, [200, 150, 100]);
        assert_eq!(back.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn stream_stats_skip_baseline_frames() {
        let mut stats = StreamStats::default();
        assert_eq!(stats.mean_interval_ms(), None);
        stats.record(&frame(4, 0.0));
        stats.record(&frame(4, 10.0));
        stats.record(&frame(8, 20.0));
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.last_size, (8, 1));
        assert_eq!(stats.mean_interval_ms(), Some(15.0));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert_eq!(load_config(None).unwrap(), CaptureConfig::default());
        assert!(load_config(Some(Path::new("/nonexistent/frametap.json"))).is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("frametap-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "frame_interval_ms": 40 }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.frame_interval_ms, 40);
        assert_eq!(config.acquire_timeout_ms, 100);
    }
}
