// crates/kinoline-core/src/time.rs
//
// Time arithmetic for the playback engine. Everything that compares or adds
// times goes through RationalTime / TimeRange — never raw f64 seconds — so
// that a mix of timeline rate and media rate can't silently compare apples
// to oranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An integer or near-integer `value` at a `rate` (frames per second).
///
/// Equality is numeric: two `RationalTime`s at different rates are equal if
/// they denote the same instant once rescaled to a common rate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RationalTime {
    pub value: f64,
    pub rate: f64,
}

const EPSILON: f64 = 1e-6;

impl RationalTime {
    pub fn new(value: f64, rate: f64) -> Self {
        Self { value, rate }
    }

    /// Sentinel for "no time" — used where the original distinguishes an
    /// absent/uninitialized RationalTime from a real zero time.
    pub fn invalid() -> Self {
        Self { value: 0.0, rate: -1.0 }
    }

    pub fn is_invalid(&self) -> bool {
        self.rate <= 0.0
    }

    pub fn to_seconds(&self) -> f64 {
        self.value / self.rate
    }

    /// Rescale to another rate, preserving the instant in time.
    pub fn rescaled_to(&self, rate: f64) -> RationalTime {
        if (self.rate - rate).abs() < EPSILON {
            return RationalTime::new(self.value, rate);
        }
        RationalTime::new(self.to_seconds() * rate, rate)
    }

    /// One frame's duration at this rate, as a RationalTime.
    pub fn one_frame(&self) -> RationalTime {
        RationalTime::new(1.0, self.rate)
    }

    pub fn floor(&self) -> RationalTime {
        RationalTime::new(self.value.floor(), self.rate)
    }
}

impl PartialEq for RationalTime {
    fn eq(&self, other: &Self) -> bool {
        if self.is_invalid() || other.is_invalid() {
            return self.is_invalid() == other.is_invalid();
        }
        (self.to_seconds() - other.to_seconds()).abs() < EPSILON
    }
}

impl PartialOrd for RationalTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.to_seconds().partial_cmp(&other.to_seconds())
    }
}

impl std::ops::Add for RationalTime {
    type Output = RationalTime;
    fn add(self, rhs: RationalTime) -> RationalTime {
        let rhs = rhs.rescaled_to(self.rate);
        RationalTime::new(self.value + rhs.value, self.rate)
    }
}

impl std::ops::Sub for RationalTime {
    type Output = RationalTime;
    fn sub(self, rhs: RationalTime) -> RationalTime {
        let rhs = rhs.rescaled_to(self.rate);
        RationalTime::new(self.value - rhs.value, self.rate)
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.rate)
    }
}

impl FromStr for RationalTime {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        let (v, r) = s.split_once('/').ok_or_else(|| Error::Parse(s.to_string()))?;
        let value: f64 = v.parse().map_err(|_| Error::Parse(s.to_string()))?;
        let rate: f64 = r.parse().map_err(|_| Error::Parse(s.to_string()))?;
        Ok(RationalTime::new(value, rate))
    }
}

/// A half-open-on-the-outside, inclusive-in-practice time span: `start_time`
/// plus `duration`, both at the same rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    pub fn new(start_time: RationalTime, duration: RationalTime) -> Self {
        Self { start_time, duration }
    }

    /// Construct a range spanning `[start, end]` inclusive of `end`.
    pub fn from_start_end_inclusive(start: RationalTime, end: RationalTime) -> Self {
        let end = end.rescaled_to(start.rate);
        let duration = RationalTime::new(end.value - start.value + 1.0, start.rate);
        TimeRange::new(start, duration)
    }

    pub fn end_time_exclusive(&self) -> RationalTime {
        self.start_time + self.duration
    }

    pub fn end_time_inclusive(&self) -> RationalTime {
        self.end_time_exclusive() - self.start_time.one_frame()
    }

    pub fn contains(&self, t: RationalTime) -> bool {
        let t = t.rescaled_to(self.start_time.rate);
        t >= self.start_time && t <= self.end_time_inclusive()
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start_time <= other.end_time_inclusive() && other.start_time <= self.end_time_inclusive()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_time, self.duration)
    }
}

impl FromStr for TimeRange {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        let (start, duration) = s.split_once('-').ok_or_else(|| Error::Parse(s.to_string()))?;
        Ok(TimeRange::new(start.parse()?, duration.parse()?))
    }
}

/// Convert a sorted-or-unsorted set of RationalTimes into a minimal list of
/// contiguous inclusive ranges whose union equals the input set.
///
/// Walks the sorted times and closes the current run whenever the gap to the
/// next time exceeds one frame at that time's rate.
pub fn to_ranges(mut times: Vec<RationalTime>) -> Vec<TimeRange> {
    if times.is_empty() {
        return Vec::new();
    }
    times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    times.dedup_by(|a, b| a == b);

    let mut out = Vec::new();
    let mut run_start = times[0];
    let mut run_end = times[0];
    for &t in &times[1..] {
        if (t - run_end).value > 1.0 + EPSILON {
            out.push(TimeRange::from_start_end_inclusive(run_start, run_end));
            run_start = t;
        }
        run_end = t;
    }
    out.push(TimeRange::from_start_end_inclusive(run_start, run_end));
    out
}

/// Wrap `t` into `range` (an inclusive TimeRange), one step at a time.
///
/// This does not loop arbitrarily far past the boundary — callers stepping
/// by more than one frame per tick are expected to call this once per
/// boundary crossing, matching the player's per-tick time advance.
pub fn loop_time(t: RationalTime, range: TimeRange) -> RationalTime {
    let end = range.end_time_inclusive();
    if t < range.start_time {
        end
    } else if t > end {
        range.start_time
    } else {
        t
    }
}

/// Clamp `t` into `range`, returning the clamped time and whether clamping
/// occurred (used by Loop::Once / Loop::PingPong).
pub fn clamp_time(t: RationalTime, range: TimeRange) -> (RationalTime, bool) {
    let end = range.end_time_inclusive();
    if t < range.start_time {
        (range.start_time, true)
    } else if t > end {
        (end, true)
    } else {
        (t, false)
    }
}

/// Encode hour/minute/second/frame into the packed BCD timecode word used by
/// `timecode_to_string` / `string_to_timecode`.
pub fn time_to_timecode(hour: u32, minute: u32, seconds: u32, frame: u32) -> u32 {
    ((hour / 10 & 0x0f) << 28) | ((hour % 10 & 0x0f) << 24) |
    ((minute / 10 & 0x0f) << 20) | ((minute % 10 & 0x0f) << 16) |
    ((seconds / 10 & 0x0f) << 12) | ((seconds % 10 & 0x0f) << 8) |
    ((frame / 10 & 0x0f) << 4) | (frame % 10 & 0x0f)
}

pub fn timecode_to_time(code: u32) -> (u32, u32, u32, u32) {
    let hour = (code >> 28 & 0x0f) * 10 + (code >> 24 & 0x0f);
    let minute = (code >> 20 & 0x0f) * 10 + (code >> 16 & 0x0f);
    let seconds = (code >> 12 & 0x0f) * 10 + (code >> 8 & 0x0f);
    let frame = (code >> 4 & 0x0f) * 10 + (code & 0x0f);
    (hour, minute, seconds, frame)
}

pub fn timecode_to_string(code: u32) -> String {
    let (h, m, s, f) = timecode_to_time(code);
    format!("{h:02}:{m:02}:{s:02}:{f:02}")
}

pub fn string_to_timecode(s: &str) -> Result<u32, Error> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 4 {
        return Err(Error::Parse(s.to_string()));
    }
    let nums: Result<Vec<u32>, _> = parts.iter().map(|p| p.parse::<u32>()).collect();
    let nums = nums.map_err(|_| Error::Parse(s.to_string()))?;
    Ok(time_to_timecode(nums[0], nums[1], nums[2], nums[3]))
}

/// Format a film keycode tuple as a colon-joined string.
pub fn keycode_to_string(id: i64, kind: i64, prefix: i64, count: i64, offset: i64) -> String {
    format!("{id}:{kind}:{prefix}:{count}:{offset}")
}

pub fn string_to_keycode(s: &str) -> Result<(i64, i64, i64, i64, i64), Error> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 5 {
        return Err(Error::Parse(s.to_string()));
    }
    let nums: Result<Vec<i64>, _> = parts.iter().map(|p| p.parse::<i64>()).collect();
    let nums = nums.map_err(|_| Error::Parse(s.to_string()))?;
    Ok((nums[0], nums[1], nums[2], nums[3], nums[4]))
}

/// Format a duration in seconds as `MM:SS:FF` at 30fps.
///
/// ```
/// use kinoline_core::time::format_time;
/// assert_eq!(format_time(0.0), "00:00:00");
/// assert_eq!(format_time(61.5), "01:01:15");
/// ```
pub fn format_time(s: f64) -> String {
    let m = (s / 60.0) as u32;
    let sc = (s % 60.0) as u32;
    let fr = ((s * 30.0) as u32) % 30;
    format!("{m:02}:{sc:02}:{fr:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_time_equality_crosses_rate() {
        let a = RationalTime::new(24.0, 24.0);
        let b = RationalTime::new(48.0, 48.0);
        assert_eq!(a, b);
    }

    #[test]
    fn rescale_preserves_instant() {
        let a = RationalTime::new(12.0, 24.0);
        let b = a.rescaled_to(48.0);
        assert_eq!(b.value, 24.0);
        assert_eq!(a, b);
    }

    #[test]
    fn rational_time_round_trip() {
        let t = RationalTime::new(42.0, 24.0);
        let s = t.to_string();
        let parsed: RationalTime = s.parse().unwrap();
        assert_eq!(t, parsed);
    }

    #[test]
    fn time_range_round_trip() {
        let r = TimeRange::new(RationalTime::new(0.0, 24.0), RationalTime::new(10.0, 24.0));
        let s = r.to_string();
        let parsed: TimeRange = s.parse().unwrap();
        assert_eq!(parsed.start_time, r.start_time);
        assert_eq!(parsed.duration, r.duration);
    }

    #[test]
    fn time_range_contains_inclusive() {
        let r = TimeRange::new(RationalTime::new(0.0, 24.0), RationalTime::new(10.0, 24.0));
        assert!(r.contains(RationalTime::new(9.0, 24.0)));
        assert!(!r.contains(RationalTime::new(10.0, 24.0)));
    }

    #[test]
    fn to_ranges_minimal_runs() {
        let times = vec![
            RationalTime::new(0.0, 24.0),
            RationalTime::new(1.0, 24.0),
            RationalTime::new(2.0, 24.0),
            RationalTime::new(5.0, 24.0),
            RationalTime::new(6.0, 24.0),
        ];
        let ranges = to_ranges(times);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start_time.value, 0.0);
        assert_eq!(ranges[0].end_time_inclusive().value, 2.0);
        assert_eq!(ranges[1].start_time.value, 5.0);
        assert_eq!(ranges[1].end_time_inclusive().value, 6.0);
    }

    #[test]
    fn loop_time_wraps_at_boundaries() {
        let range = TimeRange::new(RationalTime::new(10.0, 24.0), RationalTime::new(11.0, 24.0));
        // inclusive end is 20/24
        let under = RationalTime::new(9.0, 24.0);
        let over = RationalTime::new(21.0, 24.0);
        assert_eq!(loop_time(under, range).value, 20.0);
        assert_eq!(loop_time(over, range).value, 10.0);
    }

    #[test]
    fn timecode_round_trip() {
        for h in [0u32, 1, 23, 99] {
            let code = time_to_timecode(h, 59, 59, 29);
            let s = timecode_to_string(code);
            let parsed = string_to_timecode(&s).unwrap();
            assert_eq!(parsed, code);
        }
    }

    #[test]
    fn keycode_round_trip() {
        let s = keycode_to_string(1, 2, 3, 4, 5);
        assert_eq!(string_to_keycode(&s).unwrap(), (1, 2, 3, 4, 5));
    }
}
