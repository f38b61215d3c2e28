use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_uchar, c_ulong};
use std::ptr;

use ::x11::{xinerama, xlib};
use frametap_core::{Monitor, Window};
use tracing::debug;

use super::display::XDisplay;

/// Xinerama heads when active, else the whole default screen.
pub fn monitors() -> Vec<Monitor> {
    let Ok(display) = XDisplay::open() else { return Vec::new() };
    let d = display.raw();

    let mut event_base: c_int = 0;
    let mut error_base: c_int = 0;
    let xinerama = unsafe {
        xinerama::XineramaQueryExtension(d, &mut event_base, &mut error_base) != 0
            && xinerama::XineramaIsActive(d) != 0
    };

    if xinerama {
        let mut count: c_int = 0;
        let screens = unsafe { xinerama::XineramaQueryScreens(d, &mut count) };
        if !screens.is_null() {
            let heads = unsafe { std::slice::from_raw_parts(screens, count.max(0) as usize) };
            let result = heads
                .iter()
                .enumerate()
                .map(|(i, s)| Monitor {
                    id: s.screen_number,
                    name: format!("Screen {i}"),
                    x: i32::from(s.x_org),
                    y: i32::from(s.y_org),
                    width: i32::from(s.width),
                    height: i32::from(s.height),
                    scale: 1.0,
                })
                .collect();
            unsafe { xlib::XFree(screens.cast()) };
            return result;
        }
    }

    let (width, height) = display.size();
    vec![Monitor {
        id: 0,
        name: "Default".into(),
        x: 0,
        y: 0,
        width: width as i32,
        height: height as i32,
        scale: 1.0,
    }]
}

/// EWMH client list, mapped and named windows only.
pub fn windows() -> Vec<Window> {
    let Ok(display) = XDisplay::open() else { return Vec::new() };
    let Some(client_list) = display.atom("_NET_CLIENT_LIST") else {
        debug!("_NET_CLIENT_LIST missing; window manager is not EWMH compliant");
        return Vec::new();
    };
    let Some(ids) = window_property::<xlib::Window>(&display, display.root(), client_list, xlib::XA_WINDOW, 0, !0)
    else {
        return Vec::new();
    };

    let mut result = Vec::new();
    for id in ids {
        // Stale ids between the property read and this call are expected.
        let Ok(attrs) = display.window_attributes(id) else { continue };
        if attrs.map_state != xlib::IsViewable {
            continue;
        }
        let name = window_name(&display, id);
        if name.is_empty() {
            continue;
        }
        result.push(Window {
            id: id as u64,
            name,
            x: attrs.x,
            y: attrs.y,
            width: attrs.width,
            height: attrs.height,
        });
    }
    result
}

fn window_name(display: &XDisplay, id: xlib::Window) -> String {
    if let (Some(net_wm_name), Some(utf8)) = (display.atom("_NET_WM_NAME"), display.atom("UTF8_STRING")) {
        if let Some(bytes) = window_property::<u8>(display, id, net_wm_name, utf8, 0, 256) {
            let name = String::from_utf8_lossy(&bytes).into_owned();
            if !name.is_empty() {
                return name;
            }
        }
    }

    let mut text = MaybeUninit::<xlib::XTextProperty>::zeroed();
    let ok = display
        .trap(|d| unsafe { xlib::XGetWMName(d, id, text.as_mut_ptr()) })
        .unwrap_or(0);
    if ok == 0 {
        return String::new();
    }
    let text = unsafe { text.assume_init() };
    if text.value.is_null() {
        return String::new();
    }
    let name = unsafe { CStr::from_ptr(text.value as *const _) }.to_string_lossy().into_owned();
    unsafe { xlib::XFree(text.value.cast()) };
    name
}

/// Read a property as `T`-sized items (`u8` for format 8, `c_ulong`-backed
/// XIDs for format 32).
fn window_property<T: Copy>(
    display: &XDisplay,
    window: xlib::Window,
    property: xlib::Atom,
    kind: xlib::Atom,
    offset: i64,
    length: i64,
) -> Option<Vec<T>> {
    let mut actual_type: xlib::Atom = 0;
    let mut actual_format: c_int = 0;
    let mut nitems: c_ulong = 0;
    let mut bytes_after: c_ulong = 0;
    let mut data: *mut c_uchar = ptr::null_mut();

    let status = display
        .trap(|d| unsafe {
            xlib::XGetWindowProperty(
                d,
                window,
                property,
                offset as _,
                length as _,
                xlib::False,
                kind,
                &mut actual_type,
                &mut actual_format,
                &mut nitems,
                &mut bytes_after,
                &mut data,
            )
        })
        .ok()?;
    if status != xlib::Success as c_int || data.is_null() {
        return None;
    }
    let items = unsafe { std::slice::from_raw_parts(data as *const T, nitems as usize) }.to_vec();
    unsafe { xlib::XFree(data.cast()) };
    Some(items)
}
