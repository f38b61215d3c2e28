use frametap_core::{Monitor, Window};
use tracing::debug;
use wayland_client::protocol::{wl_output, wl_registry};
use wayland_client::{Connection, Dispatch, QueueHandle, WEnum};

/// What the compositor told us about one `wl_output`.
#[derive(Debug, Default)]
struct OutputInfo {
    make: String,
    model: String,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    scale: i32,
    has_mode: bool,
}

#[derive(Default)]
struct Outputs {
    outputs: Vec<OutputInfo>,
}

impl Dispatch<wl_registry::WlRegistry, ()> for Outputs {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global { name, interface, version } = event {
            if interface == "wl_output" && version >= 2 {
                let index = state.outputs.len();
                state.outputs.push(OutputInfo { scale: 1, ..OutputInfo::default() });
                registry.bind::<wl_output::WlOutput, _, _>(name, version.min(4), qh, index);
            }
        }
    }
}

impl Dispatch<wl_output::WlOutput, usize> for Outputs {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        index: &usize,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let Some(info) = state.outputs.get_mut(*index) else { return };
        match event {
            wl_output::Event::Geometry { x, y, make, model, .. } => {
                info.x = x;
                info.y = y;
                info.make = make;
                info.model = model;
            }
            wl_output::Event::Mode { flags: WEnum::Value(flags), width, height, .. }
                if flags.contains(wl_output::Mode::Current) =>
            {
                info.width = width;
                info.height = height;
                info.has_mode = true;
            }
            wl_output::Event::Scale { factor } => info.scale = factor,
            _ => {}
        }
    }
}

fn display_name(info: &OutputInfo, index: usize) -> String {
    let name = format!("{} {}", info.make.trim(), info.model.trim());
    let name = name.trim();
    if name.is_empty() {
        format!("Display {index}")
    } else {
        name.to_owned()
    }
}

fn to_monitors(outputs: Vec<OutputInfo>) -> Vec<Monitor> {
    outputs
        .into_iter()
        .enumerate()
        .filter(|(_, info)| info.has_mode)
        .map(|(i, info)| Monitor {
            id: i as i32,
            name: display_name(&info, i),
            x: info.x,
            y: info.y,
            width: info.width,
            height: info.height,
            scale: info.scale.max(1) as f32,
        })
        .collect()
}

/// `wl_output` globals that reported a current mode.
pub fn monitors() -> Vec<Monitor> {
    let connection = match Connection::connect_to_env() {
        Ok(connection) => connection,
        Err(e) => {
            debug!("Wayland connect failed: {e}");
            return Vec::new();
        }
    };
    let mut queue = connection.new_event_queue();
    let qh = queue.handle();
    connection.display().get_registry(&qh, ());

    let mut state = Outputs::default();
    // First roundtrip delivers the globals, the second their output events.
    for _ in 0..2 {
        if let Err(e) = queue.roundtrip(&mut state) {
            debug!("Wayland roundtrip failed: {e}");
            return Vec::new();
        }
    }
    to_monitors(state.outputs)
}

/// Wayland offers no window list; the portal picker chooses instead.
pub fn windows() -> Vec<Window> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_falls_back_to_index() {
        let info = OutputInfo { make: "Dell".into(), model: "U2720Q".into(), ..OutputInfo::default() };
        assert_eq!(display_name(&info, 0), "Dell U2720Q");
        assert_eq!(display_name(&OutputInfo::default(), 3), "Display 3");
    }

    #[test]
    fn outputs_without_current_mode_are_skipped() {
        let outputs = vec![
            OutputInfo { width: 2560, height: 1440, scale: 2, has_mode: true, ..OutputInfo::default() },
            OutputInfo::default(),
            OutputInfo { x: 2560, width: 1920, height: 1080, scale: 0, has_mode: true, ..OutputInfo::default() },
        ];
        let monitors = to_monitors(outputs);
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].scale, 2.0);
        assert_eq!(monitors[1].id, 2);
        assert_eq!(monitors[1].x, 2560);
        assert_eq!(monitors[1].scale, 1.0);
    }
}
