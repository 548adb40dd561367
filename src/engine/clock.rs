//! Playback clock for Pitchlab
//!
//! Tracks where in the recording the listener is. The clock never advances
//! on its own: every operation takes the audio context time `now` (seconds),
//! and the position is derived from it, so a speed change mid-playback
//! keeps the reported position continuous.

use std::fmt;
use tracing::debug;

/// Lifecycle of the engine as seen by a front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No track decoded (default state)
    #[default]
    Unloaded,
    Paused,
    Playing,
    /// Offline render running; transport is frozen
    Exporting,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Unloaded => write!(f, "Unloaded"),
            EngineState::Paused => write!(f, "Paused"),
            EngineState::Playing => write!(f, "Playing"),
            EngineState::Exporting => write!(f, "Exporting"),
        }
    }
}

/// Raw transport values the position math works on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    /// Context time at which track position 0 would have played at the
    /// current speed
    pub start_reference_time: f64,
    /// Position held while paused (seconds of track time)
    pub paused_offset_seconds: f64,
    pub current_speed: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: false,
            start_reference_time: 0.0,
            paused_offset_seconds: 0.0,
            current_speed: 1.0,
        }
    }
}

/// Position math for one loaded track
///
/// # Example
/// ```
/// use pitchlab::engine::PlaybackClock;
///
/// let mut clock = PlaybackClock::new(30.0, 1.0);
/// clock.play(100.0);
/// clock.set_speed(104.0, 1.5);
/// assert!((clock.position(106.0) - 7.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    transport: TransportState,
    duration: f64,
}

impl PlaybackClock {
    /// Clock for a freshly loaded track: paused at 0
    pub fn new(duration_secs: f64, speed: f64) -> Self {
        Self {
            transport: TransportState {
                current_speed: sanitize_speed(speed),
                ..Default::default()
            },
            duration: duration_secs.max(0.0),
        }
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Start (or resume) playback from the paused offset
    pub fn play(&mut self, now: f64) {
        if self.transport.is_playing {
            return;
        }
        self.transport.start_reference_time =
            now - self.transport.paused_offset_seconds / self.transport.current_speed;
        self.transport.is_playing = true;
        debug!(
            offset = self.transport.paused_offset_seconds,
            speed = self.transport.current_speed,
            "clock started"
        );
    }

    /// Freeze the position
    ///
    /// Pausing at or past the end behaves like the auto-stop: the offset
    /// rewinds to 0.
    pub fn pause(&mut self, now: f64) {
        if !self.transport.is_playing {
            return;
        }
        if self.check_end(now) {
            return;
        }
        self.transport.paused_offset_seconds = self.running_position(now).max(0.0);
        self.transport.is_playing = false;
        debug!(offset = self.transport.paused_offset_seconds, "clock paused");
    }

    /// Move to `target` seconds, clamped to the track
    ///
    /// Playing: stop, set the offset, restart. Paused: only set the offset.
    /// Returns the clamped target.
    pub fn seek(&mut self, now: f64, target: f64) -> f64 {
        let target = if target.is_finite() {
            target.clamp(0.0, self.duration)
        } else {
            0.0
        };
        let was_playing = self.transport.is_playing;
        if was_playing {
            self.transport.is_playing = false;
        }
        self.transport.paused_offset_seconds = target;
        if was_playing {
            self.play(now);
        }
        target
    }

    /// Change speed without a jump in position
    pub fn set_speed(&mut self, now: f64, speed: f64) {
        let speed = sanitize_speed(speed);
        if self.transport.is_playing {
            let offset = self.running_position(now);
            self.transport.start_reference_time = now - offset / speed;
        }
        self.transport.current_speed = speed;
    }

    /// Auto-stop check; true when playback ran off the end and the clock
    /// rewound to 0
    pub fn check_end(&mut self, now: f64) -> bool {
        if self.transport.is_playing && self.running_position(now) >= self.duration {
            self.transport.is_playing = false;
            self.transport.paused_offset_seconds = 0.0;
            debug!(duration = self.duration, "clock reached end of track");
            return true;
        }
        false
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Track position in seconds
    pub fn position(&self, now: f64) -> f64 {
        if self.transport.is_playing {
            self.running_position(now).clamp(0.0, self.duration)
        } else {
            self.transport.paused_offset_seconds
        }
    }

    fn running_position(&self, now: f64) -> f64 {
        (now - self.transport.start_reference_time) * self.transport.current_speed
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing
    }

    pub fn speed(&self) -> f64 {
        self.transport.current_speed
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn transport(&self) -> &TransportState {
        &self.transport
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

// ============================================================================
// Tests
// ============================================================================
