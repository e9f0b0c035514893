//! Scheduled parameter values on the audio device clock.

/// How the parameter reaches an event's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// Jump at the event time.
    Set,
    /// Ramp linearly from the previous event, arriving at the event time.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub value: f64,
    pub curve: Curve,
}

/// Ordered automation events for one parameter.
///
/// Events with equal times keep insertion order, so when two points collide
/// the one scheduled last wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    default: f64,
    events: Vec<AutomationEvent>,
}

impl ParamTimeline {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    pub fn set_value_at(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            time,
            value,
            curve: Curve::Set,
        });
    }

    pub fn linear_ramp_to(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            time,
            value,
            curve: Curve::Linear,
        });
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn insert(&mut self, event: AutomationEvent) {
        let at = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(at, event);
    }

    /// Parameter value at device time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let next = self.events.partition_point(|e| e.time <= t);
        let (prev_time, prev_value) = match next {
            0 => (f64::NEG_INFINITY, self.default),
            i => (self.events[i - 1].time, self.events[i - 1].value),
        };
        match self.events.get(next) {
            Some(e) if e.curve == Curve::Linear => {
                if !prev_time.is_finite() || e.time <= prev_time {
                    // A ramp with no start point holds the prior value.
                    prev_value
                } else {
                    let frac = (t - prev_time) / (e.time - prev_time);
                    prev_value + (e.value - prev_value) * frac
                }
            }
            _ => prev_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_before_events() {
        let mut gain = ParamTimeline::new(1.0);
        gain.set_value_at(0.0, 2.0);
        assert_eq!(gain.value_at(1.0), 1.0);
        assert_eq!(gain.value_at(2.0), 0.0);
    }

    #[test]
    fn test_fade_in_ramp() {
        let mut gain = ParamTimeline::new(1.0);
        gain.set_value_at(0.0, 2.0);
        gain.linear_ramp_to(1.0, 3.0);
        assert!((gain.value_at(2.5) - 0.5).abs() < 1e-12);
        assert_eq!(gain.value_at(3.0), 1.0);
        assert_eq!(gain.value_at(10.0), 1.0);
    }

    #[test]
    fn test_fade_out_after_hold() {
        let mut gain = ParamTimeline::new(1.0);
        gain.set_value_at(0.8, 0.0);
        gain.set_value_at(0.8, 4.0);
        gain.linear_ramp_to(0.0, 5.0);
        assert_eq!(gain.value_at(2.0), 0.8);
        assert!((gain.value_at(4.5) - 0.4).abs() < 1e-12);
        assert_eq!(gain.value_at(5.0), 0.0);
    }

    #[test]
    fn test_equal_times_last_writer_wins() {
        let mut gain = ParamTimeline::new(1.0);
        gain.set_value_at(0.2, 1.0);
        gain.set_value_at(0.9, 1.0);
        assert_eq!(gain.value_at(1.0), 0.9);
    }

    #[test]
    fn test_out_of_order_inserts_sorted() {
        let mut gain = ParamTimeline::new(0.0);
        gain.linear_ramp_to(1.0, 2.0);
        gain.set_value_at(0.0, 1.0);
        assert!((gain.value_at(1.5) - 0.5).abs() < 1e-12);
    }
}
