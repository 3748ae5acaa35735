use serde::{Deserialize, Serialize};

/// One captured screen frame, handed in by the capture collaborator as an
/// RGBA8 pixel buffer. The engine never interprets pixels beyond hashing
/// and the local heuristic analyzer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self { pixels, width, height }
    }

    /// A placeholder frame for when no capture is available. Hashes to the
    /// sentinel key, so it never pollutes the cache.
    pub fn empty() -> Self {
        Self { pixels: Vec::new(), width: 0, height: 0 }
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Perceptual hash of a frame, used as the analysis cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    /// Returned for malformed frames. Sentinel keys always miss the cache.
    pub fn sentinel() -> Self {
        Self(String::new())
    }

    pub fn from_hash(encoded: String) -> Self {
        Self(encoded)
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Menu,
    Text,
    Input,
    Other,
}

/// Axis-aligned element bounds in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Bounds must lie within the source screenshot. Enforced when an
    /// analysis is assembled; elements violating this are dropped.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= frame_width
            && self.y.saturating_add(self.height) <= frame_height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIElement {
    pub kind: ElementKind,
    pub bounds: Bounds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub is_interactive: bool,
    pub detection_confidence: f32,
}

/// Result of analyzing one screenshot. Immutable once constructed; the
/// cache owns it and the ranker borrows it through an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenAnalysis {
    pub fingerprint: FingerprintKey,
    pub description: String,
    /// Detection order, not semantic order.
    pub ui_elements: Vec<UIElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<String>,
    pub confidence: f32,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl ScreenAnalysis {
    pub fn interactive_elements(&self) -> impl Iterator<Item = &UIElement> {
        self.ui_elements.iter().filter(|e| e.is_interactive)
    }
}
