//! Dead reckoning for remote units.
//!
//! A remote unit is drawn at `dead_reckoning_position + error`. The dead
//! reckoning position follows the unit's last known velocity every frame and
//! jumps straight to each authoritative position the server sends. The jump
//! itself is not shown: the gap between where the unit was drawn and where the
//! server says it is becomes the error term, which then decays geometrically
//! towards zero.
//!
//! The decay rate adapts to the size of the correction. Small corrections
//! (under 0.25 units) decay slowly and look smooth, large ones (over 1 unit)
//! decay fast so that a teleport does not turn into a long slide.

use shared::math::lerp;
use shared::Vec3;

/// Decay factor used for small corrections.
pub const SLOW_CORRECTION: f32 = 0.85;
/// Decay factor used for large corrections.
pub const FAST_CORRECTION: f32 = 0.2;
/// Corrections shorter than this use the slow factor.
pub const SMALL_ERROR: f32 = 0.25;
/// Corrections longer than this use the fast factor.
pub const LARGE_ERROR: f32 = 1.0;
/// Residual errors shorter than this snap to zero.
pub const ERROR_EPSILON: f32 = 0.01;

/// Per-frame decay factor for a correction of `error_length` units.
///
/// Non-increasing in `error_length`: 0.85 up to 0.25 units, 0.2 from 1 unit,
/// linear in between.
pub fn error_correction_factor(error_length: f32) -> f32 {
    let t = if error_length < SMALL_ERROR {
        0.0
    } else if error_length > LARGE_ERROR {
        1.0
    } else {
        (error_length - SMALL_ERROR) / (LARGE_ERROR - SMALL_ERROR)
    };

    lerp(SLOW_CORRECTION, FAST_CORRECTION, t)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadReckoning {
    position: Vec3,
    error: Vec3,
    correction_factor: f32,
    rendered: Vec3,
}

impl DeadReckoning {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            error: Vec3::ZERO,
            correction_factor: SLOW_CORRECTION,
            rendered: position,
        }
    }

    /// Extrapolated position, without the error term.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn error(&self) -> Vec3 {
        self.error
    }

    pub fn correction_factor(&self) -> f32 {
        self.correction_factor
    }

    /// Position the unit was last drawn at.
    pub fn rendered(&self) -> Vec3 {
        self.rendered
    }

    /// Advances one frame and returns the position to draw.
    pub fn advance(&mut self, velocity: Vec3, dt: f32) -> Vec3 {
        self.position = self.position.add(&velocity.scale(dt));
        self.rendered = self.position.add(&self.error);

        self.error = self.error.scale(self.correction_factor);
        if self.error.length() < ERROR_EPSILON {
            self.error = Vec3::ZERO;
        }

        self.rendered
    }

    /// Accepts an authoritative position, turning the discontinuity into error.
    pub fn correct(&mut self, authoritative: Vec3) {
        self.error = self.rendered.sub(&authoritative);
        self.position = authoritative;
        self.correction_factor = error_correction_factor(self.error.length());
    }

    /// Moves instantly to `position` with no smoothing.
    pub fn hard_set(&mut self, position: Vec3) {
        self.position = position;
        self.rendered = position;
        self.error = Vec3::ZERO;
    }

    /// Keeps both the extrapolated and drawn heights at or above `min_y`.
    pub fn clamp_height(&mut self, min_y: f32) {
        if self.position.y < min_y {
            self.position.y = min_y;
        }
        if self.rendered.y < min_y {
            self.rendered.y = min_y;
        }
    }
}
