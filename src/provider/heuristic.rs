use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::perception::types::{Bounds, ElementKind, Frame, UIElement};
use crate::provider::{RawAnalysis, VisionBackend};

const GRID: u32 = 4;
const CONTRAST_THRESHOLD: f32 = 28.0;
const REGION_CONFIDENCE: f32 = 0.2;

/// Local last-resort analyzer. No network, no model: tiles the frame and
/// flags high-contrast regions as generic content so the user still hears
/// *something* about screen structure when every real backend is down.
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionBackend for HeuristicAnalyzer {
    fn name(&self) -> &str {
        "local_heuristic"
    }

    async fn analyze(
        &self,
        frame: &Frame,
        _hint: Option<&str>,
    ) -> Result<RawAnalysis, ProviderError> {
        if !frame.is_well_formed() {
            return Ok(RawAnalysis {
                description: "No screen content is available right now.".to_string(),
                ui_elements: Vec::new(),
                game_state: None,
                confidence: 0.0,
            });
        }

        let regions = scan_regions(frame);
        let description = if regions.is_empty() {
            "The screen appears mostly uniform. Detailed narration is unavailable right now."
                .to_string()
        } else {
            format!(
                "Detailed narration is unavailable right now. {} distinct region{} of content detected on screen.",
                regions.len(),
                if regions.len() == 1 { "" } else { "s" },
            )
        };

        tracing::debug!(regions = regions.len(), "heuristic analysis complete");

        Ok(RawAnalysis {
            description,
            ui_elements: regions,
            game_state: None,
            confidence: REGION_CONFIDENCE,
        })
    }
}

/// Per-tile luminance spread. Tiles with enough contrast against their own
/// mean are likely to hold text or UI chrome rather than flat backdrop.
fn scan_regions(frame: &Frame) -> Vec<UIElement> {
    let tile_w = (frame.width / GRID).max(1);
    let tile_h = (frame.height / GRID).max(1);
    let mut regions = Vec::new();

    for ty in 0..GRID {
        for tx in 0..GRID {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = if tx == GRID - 1 { frame.width } else { x0 + tile_w };
            let y1 = if ty == GRID - 1 { frame.height } else { y0 + tile_h };

            if tile_contrast(frame, x0, y0, x1, y1) >= CONTRAST_THRESHOLD {
                regions.push(UIElement {
                    kind: ElementKind::Other,
                    bounds: Bounds {
                        x: x0,
                        y: y0,
                        width: x1 - x0,
                        height: y1 - y0,
                    },
                    label: None,
                    is_interactive: false,
                    detection_confidence: REGION_CONFIDENCE,
                });
            }
        }
    }
    regions
}

fn tile_contrast(frame: &Frame, x0: u32, y0: u32, x1: u32, y1: u32) -> f32 {
    // Sample every 4th pixel in each direction; exact statistics are not
    // worth the scan cost at this confidence level.
    const STEP: u32 = 4;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    let mut y = y0;
    while y < y1 {
        let mut x = x0;
        while x < x1 {
            let i = ((y * frame.width + x) * 4) as usize;
            let luma = 0.299 * frame.pixels[i] as f64
                + 0.587 * frame.pixels[i + 1] as f64
                + 0.114 * frame.pixels[i + 2] as f64;
            sum += luma;
            sum_sq += luma * luma;
            count += 1;
            x += STEP;
        }
        y += STEP;
    }

    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    variance.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(value: u8) -> Frame {
        Frame::new(vec![value; 128 * 128 * 4], 128, 128)
    }

    #[tokio::test]
    async fn uniform_screen_yields_no_regions() {
        let raw = HeuristicAnalyzer::new()
            .analyze(&flat_frame(40), None)
            .await
            .expect("heuristic never fails on well-formed frames");
        assert!(raw.ui_elements.is_empty());
        assert!(raw.description.contains("uniform"));
    }

    #[tokio::test]
    async fn contrasting_panel_is_detected() {
        let mut frame = flat_frame(20);
        // Bright panel in the top-left tile.
        for y in 4..28u32 {
            for x in 4..28u32 {
                let i = ((y * 128 + x) * 4) as usize;
                frame.pixels[i] = 240;
                frame.pixels[i + 1] = 240;
                frame.pixels[i + 2] = 240;
            }
        }
        let raw = HeuristicAnalyzer::new()
            .analyze(&frame, None)
            .await
            .expect("heuristic never fails on well-formed frames");
        assert!(!raw.ui_elements.is_empty());
        assert!(raw.ui_elements.iter().all(|e| !e.is_interactive));
    }

    #[tokio::test]
    async fn malformed_frame_degrades_gracefully() {
        let raw = HeuristicAnalyzer::new()
            .analyze(&Frame::empty(), None)
            .await
            .expect("heuristic never fails");
        assert!(raw.ui_elements.is_empty());
        assert_eq!(raw.confidence, 0.0);
    }
}
