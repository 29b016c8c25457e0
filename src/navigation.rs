//! Input gestures mapped to story navigation.

use std::time::{Duration, Instant};

/// What a navigation input asks the player to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    /// Next story.
    Advance,
    /// Previous story.
    Retreat,
    /// Back to the gallery.
    Close,
}

/// Keys the fullscreen player reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    /// Leaves fullscreen.
    Escape,
    /// Previous story.
    Up,
    /// Next story.
    Down,
    /// Previous story.
    Left,
    /// Next story.
    Right,
}

/// Maps a key to what it does in fullscreen.
pub const fn key_intent(key: NavKey) -> NavIntent {
    match key {
        NavKey::Escape => NavIntent::Close,
        NavKey::Down | NavKey::Right => NavIntent::Advance,
        NavKey::Up | NavKey::Left => NavIntent::Retreat,
    }
}

/// Scrolling down advances, scrolling up retreats.
pub fn wheel_intent(delta_y: f32) -> Option<NavIntent> {
    if delta_y > 0.0 {
        Some(NavIntent::Advance)
    } else if delta_y < 0.0 {
        Some(NavIntent::Retreat)
    } else {
        None
    }
}

/// The last story of a full batch, where advancing first loads the next batch.
pub const fn is_batch_tail(index: usize, batch_size: usize) -> bool {
    match index.checked_rem(batch_size) {
        Some(rem) => rem.saturating_add(1) == batch_size,
        None => false,
    }
}

/// Lets one navigation through per cooldown window.
#[derive(Debug, Clone)]
pub struct NavThrottle {
    cooldown: Duration,
    last: Option<Instant>,
}

impl NavThrottle {
    /// Allows one navigation per `cooldown`.
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Whether a navigation at `now` may proceed. Rejected attempts do not
    /// extend the window.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last
            && now.saturating_duration_since(last) < self.cooldown
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

/// Turns a touch start/end pair into a navigation.
#[derive(Debug, Clone)]
pub struct SwipeTracker {
    threshold: f32,
    start_y: Option<f32>,
}

impl SwipeTracker {
    /// Swipes must travel more than `threshold` pixels.
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            start_y: None,
        }
    }

    /// Records where a touch began.
    pub const fn start(&mut self, y: f32) {
        self.start_y = Some(y);
    }

    /// Swiping up (finger moving towards the top) advances.
    pub fn end(&mut self, y: f32) -> Option<NavIntent> {
        let start = self.start_y.take()?;
        let travel = start - y;
        if travel.abs() <= self.threshold {
            return None;
        }
        Some(if travel > 0.0 {
            NavIntent::Advance
        } else {
            NavIntent::Retreat
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {super::*, assert2::check as assert};

    #[test]
    fn test_keys() {
        assert!(key_intent(NavKey::Escape) == NavIntent::Close);
        assert!(key_intent(NavKey::Down) == NavIntent::Advance);
        assert!(key_intent(NavKey::Right) == NavIntent::Advance);
        assert!(key_intent(NavKey::Up) == NavIntent::Retreat);
        assert!(key_intent(NavKey::Left) == NavIntent::Retreat);
    }

    #[test]
    fn test_wheel_direction() {
        assert!(wheel_intent(3.0) == Some(NavIntent::Advance));
        assert!(wheel_intent(-1.0) == Some(NavIntent::Retreat));
        assert!(wheel_intent(0.0).is_none());
    }

    #[test]
    fn test_batch_tail() {
        let tails: Vec<_> = (0..9).filter(|&i| is_batch_tail(i, 4)).collect();
        assert!(tails == [3, 7]);
        assert!(!is_batch_tail(3, 0));
    }

    #[test]
    fn test_throttle_collapses_bursts() {
        let mut throttle = NavThrottle::new(Duration::from_millis(250));
        let t0 = Instant::now();

        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(100)));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(249)));
        assert!(throttle.try_acquire(t0 + Duration::from_millis(250)));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(300)));
    }

    #[test]
    fn test_swipe_threshold() {
        let mut swipe = SwipeTracker::new(50.0);

        swipe.start(300.0);
        assert!(swipe.end(260.0).is_none());

        swipe.start(300.0);
        assert!(swipe.end(240.0) == Some(NavIntent::Advance));

        swipe.start(100.0);
        assert!(swipe.end(200.0) == Some(NavIntent::Retreat));

        // no start, no swipe
        assert!(swipe.end(0.0).is_none());
    }
}
