use serde::{Deserialize, Serialize};

// MARK: - Rect

/// Screen-space rectangle in logical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// An empty rect means "no crop": capture the whole target.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

// MARK: - Monitor

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub scale: f32,
}

impl Monitor {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x as f64, self.y as f64, self.width as f64, self.height as f64)
    }
}

// MARK: - Window

/// A capturable top-level window. `id` is the native handle and may go stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: u64,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

// MARK: - Target

/// What a capture session is bound to.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Target {
    /// Primary monitor (Windows) or the root window (X11).
    #[default]
    Screen,
    Region(Rect),
    Monitor(Monitor),
    Window(Window),
}

impl Target {
    /// Initial cropping rectangle implied by the target.
    pub fn region(&self) -> Rect {
        match self {
            Self::Region(rect) => *rect,
            _ => Rect::default(),
        }
    }
}

// MARK: - Image

/// RGBA8 image, top-down, tightly packed (`stride == width * 4`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// RGBA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// MARK: - Frame

/// A streamed image plus the time since the previous delivered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: Image,
    pub duration_ms: f64,
}

// MARK: - Permissions

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Health of the capture stack, recomputed on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionCheck {
    pub status: PermissionStatus,
    /// One line, suitable for a status bar.
    pub summary: String,
    pub details: Vec<String>,
}

impl PermissionCheck {
    pub fn new(status: PermissionStatus, summary: impl Into<String>) -> Self {
        Self { status, summary: summary.into(), details: Vec::new() }
    }

    pub fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }

    /// Raise the status to `Warning` unless it is already `Error`.
    pub fn warn(&mut self, line: impl Into<String>) {
        if self.status == PermissionStatus::Ok {
            self.status = PermissionStatus::Warning;
        }
        self.details.push(line.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_emptiness() {
        assert!(Rect::default().is_empty());
        assert!(Rect::new(0.0, 0.0, 10.0, 0.0).is_empty());
        assert!(Rect::new(0.0, 0.0, -5.0, 10.0).is_empty());
        assert!(Rect::new(0.0, 0.0, f64::NAN, 10.0).is_empty());
        assert!(!Rect::new(-10.0, -10.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn image_pixel_lookup() {
        let image = Image { data: vec![1, 2, 3, 4, 5, 6, 7, 8], width: 2, height: 1 };
        assert_eq!(image.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(image.pixel(2, 0), None);
        assert_eq!(image.pixel(0, 1), None);
    }

    #[test]
    fn target_region_only_for_region_target() {
        let rect = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(Target::Region(rect).region(), rect);
        assert!(Target::Screen.region().is_empty());
    }

    #[test]
    fn permission_warn_does_not_downgrade_error() {
        let mut report = PermissionCheck::new(PermissionStatus::Error, "broken");
        report.warn("also this");
        assert_eq!(report.status, PermissionStatus::Error);

        let mut report = PermissionCheck::new(PermissionStatus::Ok, "fine");
        report.warn("almost");
        assert_eq!(report.status, PermissionStatus::Warning);
        assert_eq!(report.details, vec!["almost".to_string()]);
    }
}
