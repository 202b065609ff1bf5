use serde::{Deserialize, Serialize};

pub const FULL_FORM_SCORE: u32 = 100;
pub const PARTIAL_FORM_SCORE: u32 = 50;
pub const ZONE_HIT_SCORE: u32 = 100;

/// Where the timing half of a repetition's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Proximity to the rhythm schedule.
    #[default]
    Rhythm,
    /// Whether an on-screen target was in the scoring zone when the
    /// contraction began.
    TargetZone,
    /// No timing component; a repetition is worth at most half.
    FormOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RepScore {
    pub form: u32,
    pub timing: u32,
    pub total: f64,
}

/// Form and timing each carry half of a repetition's value.
pub fn score_repetition(form_ok: bool, timing: Option<u32>) -> RepScore {
    let form = if form_ok {
        FULL_FORM_SCORE
    } else {
        PARTIAL_FORM_SCORE
    };
    let timing = timing.unwrap_or(0);
    RepScore {
        form,
        timing,
        total: f64::from(form + timing) / 2.0,
    }
}

/// Latch fed by the renderer's "target in zone" signal.
///
/// An occupancy is claimed by the first tick the player spends contracted
/// while the target is in the zone, whether the contraction started before
/// or after the target arrived. Each occupancy scores at most once.
#[derive(Debug, Clone, Default)]
pub struct ZoneGate {
    in_zone: bool,
    armed: bool,
    pending_hit: bool,
}

impl ZoneGate {
    pub fn set_in_zone(&mut self, in_zone: bool) {
        if in_zone && !self.in_zone {
            self.armed = true;
        }
        if !in_zone {
            self.armed = false;
        }
        self.in_zone = in_zone;
    }

    pub fn in_zone(&self) -> bool {
        self.in_zone
    }

    /// Call on every contracted tick. Returns true when this tick claimed the
    /// current occupancy.
    pub fn on_contracted_tick(&mut self) -> bool {
        if self.in_zone && self.armed {
            self.armed = false;
            self.pending_hit = true;
            true
        } else {
            false
        }
    }

    /// Timing score for the repetition that just completed.
    pub fn take_hit(&mut self) -> u32 {
        if std::mem::take(&mut self.pending_hit) {
            ZONE_HIT_SCORE
        } else {
            0
        }
    }
}
