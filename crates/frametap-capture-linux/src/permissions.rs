//! Health probes behind `check_permissions`.
//!
//! Probing is kept apart from report assembly so the wording and status
//! rules can be tested without a session.

use std::fs;

use frametap_core::{PermissionCheck, PermissionStatus};
use tracing::debug;

use crate::{wayland, x11, DisplayServer};

const NO_DISPLAY_DETAIL: &str = "No display server found. Set $WAYLAND_DISPLAY or $DISPLAY. \
                                 Run from within a graphical session (GNOME, KDE, Sway, X11, etc.).";

/// Probe results for a Wayland session.
#[derive(Debug, Clone, Default)]
pub(crate) struct WaylandProbe {
    pub display: String,
    pub pipewire_running: bool,
    pub portal_available: bool,
    /// `$XDG_CURRENT_DESKTOP`, for the portal backend hint.
    pub desktop: Option<String>,
}

pub(crate) fn check(server: Option<DisplayServer>) -> PermissionCheck {
    match server {
        None => no_display_report(),
        Some(DisplayServer::X11) => {
            let display = std::env::var("DISPLAY").unwrap_or_default();
            x11_report(&display, x11::can_connect())
        }
        Some(DisplayServer::Wayland) => {
            let probe = WaylandProbe {
                display: std::env::var("WAYLAND_DISPLAY").unwrap_or_default(),
                pipewire_running: pipewire_running(),
                portal_available: wayland::screencast_available(),
                desktop: std::env::var("XDG_CURRENT_DESKTOP").ok(),
            };
            debug!("Wayland probe: {:?}", probe);
            wayland_report(&probe)
        }
    }
}

fn no_display_report() -> PermissionCheck {
    PermissionCheck::new(PermissionStatus::Error, "No display server detected").detail(NO_DISPLAY_DETAIL)
}

pub(crate) fn x11_report(display: &str, connected: bool) -> PermissionCheck {
    if connected {
        PermissionCheck::new(PermissionStatus::Ok, "X11 connection OK.")
            .detail(format!("X11 display: {display}"))
    } else {
        PermissionCheck::new(PermissionStatus::Error, "Cannot connect to X11 display")
            .detail(format!("XOpenDisplay(\"{display}\") failed."))
            .detail("Check $DISPLAY and your X authority (xauth list, $XAUTHORITY).")
    }
}

pub(crate) fn wayland_report(probe: &WaylandProbe) -> PermissionCheck {
    let mut report = PermissionCheck::new(PermissionStatus::Ok, "Wayland + PipeWire + portal ready.")
        .detail(format!("Wayland display: {}", probe.display));
    let mut missing = Vec::new();

    if probe.pipewire_running {
        report.details.push("PipeWire is running.".into());
    } else {
        missing.push("PipeWire");
        report.warn("PipeWire is not running. Screen capture requires PipeWire.");
        report.warn("Install and start it: pipewire and wireplumber (systemctl --user start pipewire wireplumber).");
    }

    if probe.portal_available {
        report.details.push("xdg-desktop-portal ScreenCast interface is available.".into());
    } else {
        missing.push("ScreenCast portal");
        report.warn("xdg-desktop-portal ScreenCast interface not available.");
        report.warn(format!(
            "Install xdg-desktop-portal and {}.",
            portal_backend_hint(probe.desktop.as_deref())
        ));
    }

    if !missing.is_empty() {
        report.summary = format!("Wayland session: {} unavailable", missing.join(" and "));
    }
    report
}

/// Portal backend package for the desktop named in `$XDG_CURRENT_DESKTOP`
/// (a colon-separated list).
pub(crate) fn portal_backend_hint(desktop: Option<&str>) -> &'static str {
    let desktop = desktop.unwrap_or_default().to_ascii_lowercase();
    let has = |name: &str| desktop.split(':').any(|d| d.trim() == name);
    if has("gnome") || has("unity") || has("ubuntu") {
        "xdg-desktop-portal-gnome"
    } else if has("kde") {
        "xdg-desktop-portal-kde"
    } else if has("hyprland") {
        "xdg-desktop-portal-hyprland"
    } else if has("sway") || has("river") || has("wayfire") || has("labwc") || has("wlroots") {
        "xdg-desktop-portal-wlr"
    } else {
        "your compositor's portal backend (xdg-desktop-portal-gnome, -kde, -wlr or -hyprland)"
    }
}

/// Any process whose `comm` is `pipewire`.
fn pipewire_running() -> bool {
    let Ok(entries) = fs::read_dir("/proc") else { return false };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit())))
        .any(|entry| {
            fs::read_to_string(entry.path().join("comm")).is_ok_and(|comm| comm.trim_end() == "pipewire")
        })
}
