use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Copy the column range `[x0, x1)` into a new frame with the same timestamp.
    pub fn crop_columns(&self, x0: u32, x1: u32) -> Frame {
        let x0 = x0.min(self.width);
        let x1 = x1.clamp(x0, self.width);
        let out_width = x1 - x0;
        let stride = self.width as usize * 4;
        let mut rgba = Vec::with_capacity(out_width as usize * self.height as usize * 4);

        for row in self.rgba.chunks_exact(stride).take(self.height as usize) {
            rgba.extend_from_slice(&row[x0 as usize * 4..x1 as usize * 4]);
        }

        Frame {
            rgba,
            width: out_width,
            height: self.height,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl PlayerSlot {
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::Player1, PlayerSlot::Player2];

    pub fn index(&self) -> usize {
        match self {
            PlayerSlot::Player1 => 0,
            PlayerSlot::Player2 => 1,
        }
    }

    pub fn side(&self) -> FrameSide {
        match self {
            PlayerSlot::Player1 => FrameSide::Left,
            PlayerSlot::Player2 => FrameSide::Right,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayerSlot::Player1 => "Player 1",
            PlayerSlot::Player2 => "Player 2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSide {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extended,
    Contracted,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Extended => "EXTENDED",
            Phase::Contracted => "CONTRACTED",
        }
    }
}

/// Read-only copy of one player's progress, handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub slot: PlayerSlot,
    pub side: FrameSide,
    pub rep_count: u32,
    pub phase: Phase,
    pub form_correct: bool,
    pub score: f64,
    pub last_rep_at: Option<f64>,
    pub last_rep_score: Option<f64>,
    pub next_target_at: Option<f64>,
    pub rhythm_hits: u32,
    pub last_rhythm_score: Option<u32>,
    pub zone_hits: u32,
    pub last_detected_at: Option<f64>,
    pub present: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Seconds since session start at which the snapshot was taken.
    pub taken_at: f64,
    pub device_available: bool,
    pub players: [PlayerSnapshot; 2],
}

impl SessionSnapshot {
    pub fn player(&self, slot: PlayerSlot) -> &PlayerSnapshot {
        &self.players[slot.index()]
    }

    pub fn total_reps(&self) -> u32 {
        self.players.iter().map(|p| p.rep_count).sum()
    }
}

/// Camera image with overlays drawn, paired with the state it depicts.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub snapshot: SessionSnapshot,
}

impl AnnotatedFrame {
    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.frame.width, self.frame.height, self.frame.rgba.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(&[x as u8, 0, 0, 255]);
            }
        }
        Frame::new(rgba, width, height)
    }

    #[test]
    fn test_crop_columns_keeps_rows() {
        let frame = gradient_frame(8, 3);
        let right = frame.crop_columns(4, 8);
        assert_eq!(right.width, 4);
        assert_eq!(right.height, 3);
        assert_eq!(right.rgba.len(), 4 * 3 * 4);
        assert_eq!(right.rgba[0], 4);
        assert_eq!(right.rgba[4 * 4], 4);
        assert_eq!(right.timestamp, frame.timestamp);
    }

    #[test]
    fn test_crop_columns_clamps_range() {
        let frame = gradient_frame(4, 2);
        let cropped = frame.crop_columns(2, 100);
        assert_eq!(cropped.width, 2);
        let empty = frame.crop_columns(6, 1);
        assert_eq!(empty.width, 0);
        assert!(empty.rgba.is_empty());
    }

    #[test]
    fn test_slot_sides() {
        assert_eq!(PlayerSlot::Player1.side(), FrameSide::Left);
        assert_eq!(PlayerSlot::Player2.side(), FrameSide::Right);
        assert_eq!(PlayerSlot::Player2.index(), 1);
    }
}
