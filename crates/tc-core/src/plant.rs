//! Measurement/command contract shared by every process the loop can drive.
//!
//! A plant has exactly two heater/sensor pairs. Implementations include the
//! simulated FOPDT model (`tc-sim`) and the serial hardware driver (`tc-loop`).

use core::fmt;

use crate::error::{TcError, TcResult};

/// Number of heater/sensor pairs on the process.
pub const CHANNELS: usize = 2;

/// Lowest heater command accepted by the actuator (percent).
pub const HEATER_MIN: f64 = 0.0;

/// Highest heater command accepted by the actuator (percent).
pub const HEATER_MAX: f64 = 100.0;

/// One heater/sensor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub enum Channel {
    One,
    Two,
}

impl Channel {
    pub const ALL: [Channel; CHANNELS] = [Channel::One, Channel::Two];

    /// 0-based slot used for array storage.
    pub fn index(self) -> usize {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }

    /// 1-based number as printed on the board.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl TryFrom<u8> for Channel {
    type Error = TcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            _ => Err(TcError::InvalidArg {
                what: "channel must be 1 or 2",
            }),
        }
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.number()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Temperatures read from both sensors (°C).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurements {
    pub t1: f64,
    pub t2: f64,
}

impl Measurements {
    pub fn new(t1: f64, t2: f64) -> Self {
        Self { t1, t2 }
    }

    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::One => self.t1,
            Channel::Two => self.t2,
        }
    }

    pub fn as_array(&self) -> [f64; CHANNELS] {
        [self.t1, self.t2]
    }
}

/// Heater commands for both channels (percent of full power).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Commands {
    pub u1: f64,
    pub u2: f64,
}

impl Commands {
    pub fn new(u1: f64, u2: f64) -> Self {
        Self { u1, u2 }
    }

    /// Both heaters off.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::One => self.u1,
            Channel::Two => self.u2,
        }
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        match channel {
            Channel::One => self.u1 = value,
            Channel::Two => self.u2 = value,
        }
    }

    /// Commands limited to the actuator range. NaN maps to 0 (heater off).
    pub fn clamped(&self) -> Self {
        Self {
            u1: clamp_heater(self.u1),
            u2: clamp_heater(self.u2),
        }
    }

    pub fn as_array(&self) -> [f64; CHANNELS] {
        [self.u1, self.u2]
    }
}

fn clamp_heater(u: f64) -> f64 {
    if u.is_nan() {
        HEATER_MIN
    } else {
        u.clamp(HEATER_MIN, HEATER_MAX)
    }
}

/// A two-channel temperature process.
///
/// `write` takes both channels at once: the simulated plant's dead-time
/// queues must see exactly one push per control tick. `stop` must be
/// idempotent and release the underlying resource; any I/O after it returns
/// [`TcError::Stopped`].
pub trait Plant: Send {
    fn read(&mut self) -> TcResult<Measurements>;

    fn write(&mut self, commands: Commands) -> TcResult<()>;

    fn stop(&mut self) -> TcResult<()>;
}

impl<P: Plant + ?Sized> Plant for Box<P> {
    fn read(&mut self) -> TcResult<Measurements> {
        (**self).read()
    }

    fn write(&mut self, commands: Commands) -> TcResult<()> {
        (**self).write(commands)
    }

    fn stop(&mut self) -> TcResult<()> {
        (**self).stop()
    }
}
