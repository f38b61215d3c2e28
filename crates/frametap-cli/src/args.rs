use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use frametap::Rect;

#[derive(Debug, Parser)]
#[command(name = "frametap", version)]
#[command(about = "Screenshots of monitors, windows and screen regions")]
#[command(group(ArgGroup::new("mode").args(["monitor", "window", "region", "interactive"])))]
pub struct Args {
    /// List available monitors and exit
    #[arg(long)]
    pub list_monitors: bool,

    /// List available windows and exit
    #[arg(long)]
    pub list_windows: bool,

    /// Check capture permissions and exit
    #[arg(long)]
    pub check_permissions: bool,

    /// Capture a monitor by ID (from --list-monitors)
    #[arg(long, value_name = "ID")]
    pub monitor: Option<i32>,

    /// Capture a window by ID (from --list-windows)
    #[arg(long, value_name = "ID")]
    pub window: Option<u64>,

    /// Capture a screen region
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_region, allow_hyphen_values = true)]
    pub region: Option<Rect>,

    /// Menu-driven capture
    #[arg(long)]
    pub interactive: bool,

    /// Stream the target for SECS seconds and report frame timing
    #[arg(long, value_name = "SECS", conflicts_with = "interactive")]
    pub stream: Option<u64>,

    /// Output file
    #[arg(short, long, default_value = "screenshot.bmp")]
    pub output: PathBuf,

    /// JSON capture configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// What to capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Screen,
    Monitor(i32),
    Window(u64),
    Region(Rect),
    Interactive,
}

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Help,
    ListMonitors,
    ListWindows,
    CheckPermissions,
    Screenshot(Mode),
    Stream(Mode, u64),
}

impl Args {
    pub fn mode(&self) -> Option<Mode> {
        if let Some(id) = self.monitor {
            Some(Mode::Monitor(id))
        } else if let Some(id) = self.window {
            Some(Mode::Window(id))
        } else if let Some(rect) = self.region {
            Some(Mode::Region(rect))
        } else if self.interactive {
            Some(Mode::Interactive)
        } else {
            None
        }
    }

    pub fn action(&self) -> Action {
        if self.list_monitors {
            return Action::ListMonitors;
        }
        if self.list_windows {
            return Action::ListWindows;
        }
        if self.check_permissions {
            return Action::CheckPermissions;
        }
        match (self.mode(), self.stream) {
            (mode, Some(secs)) => Action::Stream(mode.unwrap_or(Mode::Screen), secs),
            (Some(mode), None) => Action::Screenshot(mode),
            (None, None) => Action::Help,
        }
    }
}

/// `x,y,w,h` with a positive width and height.
pub fn parse_region(s: &str) -> Result<Rect, String> {
    let invalid = || format!("Invalid region '{s}'. Expected: x,y,w,h");
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let [x, y, w, h] = parts[..] else { return Err(invalid()) };
    if !(w > 0.0 && h > 0.0) {
        return Err(invalid());
    }
    Ok(Rect::new(x, y, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("frametap").chain(argv.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn region_with_output() {
        let args = parse(&["--region", "10,20,1920,1080", "--output", "out.bmp"]).unwrap();
        assert_eq!(args.action(), Action::Screenshot(Mode::Region(Rect::new(10.0, 20.0, 1920.0, 1080.0))));
        assert_eq!(args.output, PathBuf::from("out.bmp"));
    }

    #[test]
    fn zero_sized_region_is_rejected() {
        let err = parse(&["--region", "0,0,0,0"]).unwrap_err();
        assert!(!err.to_string().is_empty());
        assert!(err.to_string().contains("Invalid region '0,0,0,0'. Expected: x,y,w,h"));
    }

    #[test]
    fn region_parsing() {
        assert_eq!(parse_region("-100,-100,200,200"), Ok(Rect::new(-100.0, -100.0, 200.0, 200.0)));
        assert_eq!(parse_region(" 1, 2, 3.5, 4 "), Ok(Rect::new(1.0, 2.0, 3.5, 4.0)));
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,3,4,5").is_err());
        assert!(parse_region("a,b,c,d").is_err());
        assert!(parse_region("0,0,-5,10").is_err());
        assert!(parse_region("0,0,NaN,10").is_err());
    }

    #[test]
    fn negative_origin_region_from_the_command_line() {
        let args = parse(&["--region", "-100,-100,200,200"]).unwrap();
        assert_eq!(args.region, Some(Rect::new(-100.0, -100.0, 200.0, 200.0)));
    }

    #[test]
    fn capture_modes_are_exclusive() {
        assert!(parse(&["--monitor", "0", "--window", "42"]).is_err());
        assert!(parse(&["--interactive", "--region", "0,0,10,10"]).is_err());
        assert!(parse(&["--interactive", "--stream", "3"]).is_err());
    }

    #[test]
    fn defaults() {
        let args = parse(&["--monitor", "1"]).unwrap();
        assert_eq!(args.output, PathBuf::from("screenshot.bmp"));
        assert_eq!(args.action(), Action::Screenshot(Mode::Monitor(1)));
        assert_eq!(parse(&[]).unwrap().action(), Action::Help);
    }

    #[test]
    fn listing_wins_over_capture() {
        let args = parse(&["--list-monitors", "--monitor", "1"]).unwrap();
        assert_eq!(args.action(), Action::ListMonitors);
        assert_eq!(parse(&["--check-permissions"]).unwrap().action(), Action::CheckPermissions);
    }

    #[test]
    fn stream_defaults_to_the_screen() {
        assert_eq!(parse(&["--stream", "2"]).unwrap().action(), Action::Stream(Mode::Screen, 2));
        assert_eq!(
            parse(&["--stream", "2", "--window", "7"]).unwrap().action(),
            Action::Stream(Mode::Window(7), 2)
        );
    }
}
