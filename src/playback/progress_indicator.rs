/// Default arrow-key step in seconds
pub const DEFAULT_SEEK_STEP: f64 = 5.0;

/// Horizontal extent of the bar in host coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub width: f64,
}

/// Request to move playback to `time` seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekIntent {
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Other,
}

/// Scrub bar that turns pointer and key input into seek intents.
///
/// It only mirrors the output's time; the controller stays the single
/// writer of the playback position.
#[derive(Debug, Clone)]
pub struct ProgressIndicator {
    bounds: Bounds,
    current_time: f64,
    duration: f64,
    step: f64,
    dragging: bool,
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_SEEK_STEP)
    }
}

impl ProgressIndicator {
    pub fn new(step: f64) -> Self {
        ProgressIndicator {
            bounds: Bounds::default(),
            current_time: 0.0,
            duration: f64::NAN,
            step,
            dragging: false,
        }
    }

    /// Call on layout changes
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Mirror the output's position
    pub fn update(&mut self, current_time: f64, duration: f64) {
        self.current_time = current_time;
        self.duration = duration;
    }

    /// Share of the bar to fill, in `[0, 1]`
    pub fn fill_fraction(&self) -> f64 {
        if !self.duration.is_finite() || self.duration <= 0.0 || !self.current_time.is_finite() {
            return 0.0;
        }
        (self.current_time / self.duration).clamp(0.0, 1.0)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn pointer_down(&mut self, x: f64) -> Option<SeekIntent> {
        let intent = self.intent_at(x)?;
        self.dragging = true;
        Some(intent)
    }

    pub fn pointer_move(&mut self, x: f64) -> Option<SeekIntent> {
        if !self.dragging {
            return None;
        }
        self.intent_at(x)
    }

    pub fn pointer_up(&mut self, x: f64) -> Option<SeekIntent> {
        if !self.dragging {
            return None;
        }
        self.dragging = false;
        self.intent_at(x)
    }

    pub fn key_down(&mut self, key: Key) -> Option<SeekIntent> {
        if !self.duration.is_finite() {
            return None;
        }
        let offset = match key {
            Key::ArrowLeft => -self.step,
            Key::ArrowRight => self.step,
            Key::Other => return None,
        };
        Some(SeekIntent {
            time: (self.current_time + offset).clamp(0.0, self.duration),
        })
    }

    /// Drop any drag in progress
    pub fn release(&mut self) {
        self.dragging = false;
    }

    fn intent_at(&self, x: f64) -> Option<SeekIntent> {
        if !self.duration.is_finite() || self.bounds.width <= 0.0 {
            return None;
        }
        let fraction = ((x - self.bounds.left) / self.bounds.width).clamp(0.0, 1.0);
        Some(SeekIntent {
            time: fraction * self.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator() -> ProgressIndicator {
        let mut indicator = ProgressIndicator::default();
        indicator.set_bounds(Bounds {
            left: 100.0,
            width: 200.0,
        });
        indicator.update(30.0, 120.0);
        indicator
    }

    #[test]
    fn test_fill_fraction() {
        assert_eq!(indicator().fill_fraction(), 0.25);

        let mut unknown = indicator();
        unknown.update(30.0, f64::NAN);
        assert_eq!(unknown.fill_fraction(), 0.0);
    }

    #[test]
    fn test_drag_emits_intents() {
        let mut indicator = indicator();
        assert_eq!(indicator.pointer_move(200.0), None);

        assert_eq!(indicator.pointer_down(200.0), Some(SeekIntent { time: 60.0 }));
        assert!(indicator.is_dragging());
        assert_eq!(indicator.pointer_move(50.0), Some(SeekIntent { time: 0.0 }));
        assert_eq!(indicator.pointer_up(400.0), Some(SeekIntent { time: 120.0 }));
        assert!(!indicator.is_dragging());
    }

    #[test]
    fn test_arrow_keys_step() {
        let mut indicator = indicator();
        assert_eq!(indicator.key_down(Key::ArrowRight), Some(SeekIntent { time: 35.0 }));
        assert_eq!(indicator.key_down(Key::ArrowLeft), Some(SeekIntent { time: 25.0 }));
        assert_eq!(indicator.key_down(Key::Other), None);

        indicator.update(2.0, 120.0);
        assert_eq!(indicator.key_down(Key::ArrowLeft), Some(SeekIntent { time: 0.0 }));
    }

    #[test]
    fn test_no_intent_without_duration_or_width() {
        let mut indicator = indicator();
        indicator.update(30.0, f64::INFINITY);
        assert_eq!(indicator.pointer_down(150.0), None);
        assert_eq!(indicator.key_down(Key::ArrowRight), None);

        let mut collapsed = ProgressIndicator::default();
        collapsed.update(30.0, 120.0);
        assert_eq!(collapsed.pointer_down(10.0), None);
    }

    #[test]
    fn test_release_ends_drag() {
        let mut indicator = indicator();
        indicator.pointer_down(150.0);
        indicator.release();
        assert_eq!(indicator.pointer_move(250.0), None);
    }
}
