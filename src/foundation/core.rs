use crate::foundation::error::{ShotgraphError, ShotgraphResult};

pub use kurbo::{Point, Rect, Size, Vec2};

/// Fixed shift applied to every timeline position while collating, so that
/// custom start frames below zero stay representable. Negated exactly once,
/// at script emission.
pub const COLLATE_HEAD_ROOM: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameSpan {
    pub first: i64,
    pub last: i64, // inclusive
}

impl FrameSpan {
    pub fn new(first: i64, last: i64) -> ShotgraphResult<Self> {
        if first > last {
            return Err(ShotgraphError::validation(format!(
                "FrameSpan first must be <= last (got {first}..{last})"
            )));
        }
        Ok(Self { first, last })
    }

    pub fn len(self) -> i64 {
        self.last - self.first + 1
    }

    pub fn contains(self, frame: i64) -> bool {
        self.first <= frame && frame <= self.last
    }

    pub fn intersects(self, other: Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }

    pub fn shift(self, delta: i64) -> Self {
        Self {
            first: self.first + delta,
            last: self.last + delta,
        }
    }

    pub fn with_handles(self, handle_in: i64, handle_out: i64) -> Self {
        Self {
            first: self.first - handle_in,
            last: self.last + handle_out,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> ShotgraphResult<Self> {
        if den == 0 {
            return Err(ShotgraphError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ShotgraphError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Nominal integer rate (30 for 30000/1001, 24 for 24/1).
    pub fn nominal(self) -> i64 {
        self.as_f64().round().max(1.0) as i64
    }

    /// NTSC-style rates (x000/1001) are the only ones that may drop frames.
    pub fn supports_drop_frame(self) -> bool {
        self.den == 1001 && self.num % 1000 == 0
    }

    /// Rate rendered the way the script format expects: integral rates
    /// without a fraction, fractional rates with their exact value.
    pub fn script_value(self) -> String {
        if self.num % self.den == 0 {
            format!("{}", self.num / self.den)
        } else {
            format!("{}", self.as_f64())
        }
    }
}

/// Render a frame count as a timecode string.
///
/// Drop-frame counting only applies to NTSC rates; the separator switches to
/// `;` in that case, following SMPTE convention. Negative frames clamp to 0.
pub fn frames_to_timecode(frame: i64, fps: Fps, drop_frame: bool) -> String {
    let total = frame.max(0);
    let nominal = fps.nominal();

    let (counted, sep) = if drop_frame && fps.supports_drop_frame() {
        let dropped = nominal / 15; // 2 at 29.97, 4 at 59.94
        let frames_per_min = 60 * nominal - dropped;
        let frames_per_10min = 10 * frames_per_min + dropped;
        let tens = total / frames_per_10min;
        let rem = total % frames_per_10min;
        let extra = if rem < dropped {
            0
        } else {
            (rem - dropped) / frames_per_min
        };
        (total + dropped * (9 * tens + extra), ';')
    } else {
        (total, ':')
    };

    let ff = counted % nominal;
    let secs = counted / nominal;
    let ss = secs % 60;
    let mm = (secs / 60) % 60;
    let hh = (secs / 3600) % 24;
    format!("{hh:02}:{mm:02}:{ss:02}{sep}{ff:02}")
}

/// Derive a stable guid for a synthetic object from a base guid and a salt.
///
/// FNV-1a over the concatenation keeps copies deterministic across runs
/// without pulling in a hash crate.
pub fn derive_guid(base: &str, salt: &str) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in base.bytes().chain([0x1f]).chain(salt.bytes()) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{base}-{hash:016x}")
}
