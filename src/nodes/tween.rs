//! Scalar tweens used by node entry and exit effects.
//!
//! A [`Tween`] interpolates one `f32` from `from` to `to` over `duration`
//! seconds. [`play`] drives a tween on the local task set with a fixed step
//! and reports every intermediate value, so a node can await it from
//! `before_unmount` or hand it to the graph as a fire-and-forget entry effect.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

/// Step used by [`play`], roughly one frame at 60 fps.
pub const TWEEN_STEP: Duration = Duration::from_millis(16);

/// Curve mapping normalized progress to normalized output.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Easing {
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    QuartIn,
    ExpoOut,
    /// Overshoots the target by `s` before settling.
    BackOut(f32),
}

/// Progress `t` is clamped to `[0, 1]` first.
pub fn ease(e: Easing, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match e {
        Easing::Linear => t,
        Easing::QuadIn => t * t,
        Easing::QuadOut => t * (2.0 - t),
        Easing::QuadInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
        Easing::CubicIn => t * t * t,
        Easing::CubicOut => {
            let p = t - 1.0;
            p * p * p + 1.0
        }
        Easing::CubicInOut => {
            if t < 0.5 {
                4.0 * t * t * t
            } else {
                let p = 2.0 * t - 2.0;
                0.5 * p * p * p + 1.0
            }
        }
        Easing::QuartIn => t * t * t * t,
        Easing::ExpoOut => {
            if t >= 1.0 {
                1.0
            } else {
                1.0 - 2f32.powf(-10.0 * t)
            }
        }
        Easing::BackOut(s) => {
            let p = t - 1.0;
            p * p * ((s + 1.0) * p + s) + 1.0
        }
    }
}

pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// One-shot scalar tween.
#[derive(Clone, Debug, PartialEq)]
pub struct Tween {
    /// Starting value.
    pub from: f32,
    /// Ending value.
    pub to: f32,
    /// Seconds.
    pub duration: f32,
    pub easing: Easing,
    /// Elapsed seconds, clamped to `duration`.
    pub time: f32,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: f32) -> Self {
        Tween {
            from,
            to,
            duration,
            easing: Easing::Linear,
            time: 0.0,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn value(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        lerp_f32(self.from, self.to, ease(self.easing, self.time / self.duration))
    }

    /// Advance by `dt` seconds and return the new value.
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.time = (self.time + dt).clamp(0.0, self.duration.max(0.0));
        self.value()
    }

    pub fn finished(&self) -> bool {
        self.time >= self.duration
    }
}

/// Run `tween` to completion, calling `apply` with each value.
pub async fn play(mut tween: Tween, mut apply: impl FnMut(f32)) {
    let mut ticker = interval(TWEEN_STEP);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    apply(tween.value());
    // First tick completes immediately.
    ticker.tick().await;
    while !tween.finished() {
        ticker.tick().await;
        apply(tween.advance(TWEEN_STEP.as_secs_f32()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_ease_endpoints() {
        let easings = [
            Easing::Linear,
            Easing::QuadIn,
            Easing::QuadOut,
            Easing::QuadInOut,
            Easing::CubicIn,
            Easing::CubicOut,
            Easing::CubicInOut,
            Easing::QuartIn,
            Easing::ExpoOut,
            Easing::BackOut(1.7),
        ];
        for easing in easings {
            assert!(approx_eq(ease(easing, 0.0), 0.0), "{:?} at 0", easing);
            assert!(approx_eq(ease(easing, 1.0), 1.0), "{:?} at 1", easing);
        }
    }

    #[test]
    fn test_ease_clamps_input() {
        assert!(approx_eq(ease(Easing::QuadIn, -0.5), 0.0));
        assert!(approx_eq(ease(Easing::QuadIn, 1.5), 1.0));
    }

    #[test]
    fn test_back_out_overshoots() {
        assert!(ease(Easing::BackOut(1.7), 0.7) > 1.0);
    }

    #[test]
    fn test_tween_advance_clamps_at_end() {
        let mut tween = Tween::new(0.0, 2.0, 1.0);
        assert!(approx_eq(tween.advance(0.5), 1.0));
        assert!(approx_eq(tween.advance(5.0), 2.0));
        assert!(tween.finished());
    }

    #[test]
    fn test_zero_duration_jumps_to_target() {
        let tween = Tween::new(1.0, 0.0, 0.0);
        assert!(tween.finished());
        assert!(approx_eq(tween.value(), 0.0));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_play_reports_until_target() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        play(Tween::new(0.0, 1.0, 0.1), move |v| sink.borrow_mut().push(v)).await;
        let seen = seen.borrow();
        assert!(approx_eq(seen[0], 0.0));
        assert!(approx_eq(*seen.last().unwrap(), 1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
