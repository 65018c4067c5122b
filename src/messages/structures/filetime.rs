use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nom::error::context;
use nom::number::complete::le_u32;
use nom::sequence::tuple;

use crate::messages::{utils::write_u32, NomError, Wire};

/// Windows FILETIME: 100ns ticks since 1601-01-01 UTC.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct FileTime {
    pub low: u32,
    pub high: u32,
}

const TICKS_PER_SECOND: u64 = 10_000_000;
const NANOS_PER_TICK: u64 = 100;
/// Seconds between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE: u64 = 11_644_473_600;

impl From<SystemTime> for FileTime {
    fn from(value: SystemTime) -> Self {
        let ticks = match value.duration_since(UNIX_EPOCH) {
            Ok(since) => to_ticks(Duration::from_secs(EPOCH_DIFFERENCE).saturating_add(since)),
            Err(e) => to_ticks(Duration::from_secs(EPOCH_DIFFERENCE).saturating_sub(e.duration())),
        };
        Self::from_u64(ticks)
    }
}

fn to_ticks(since_1601: Duration) -> u64 {
    since_1601
        .as_secs()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(u64::from(since_1601.subsec_nanos()) / NANOS_PER_TICK)
}

impl FileTime {
    pub const fn from_u64(ticks: u64) -> Self {
        Self {
            low: (ticks & 0xffff_ffff) as u32,
            high: (ticks >> 32) as u32,
        }
    }

    pub const fn as_u64(&self) -> u64 {
        ((self.high as u64) << 32) | (self.low as u64)
    }

    pub fn to_system_time(&self) -> Option<SystemTime> {
        let ticks = self.as_u64();
        let since_1601 = Duration::from_secs(ticks / TICKS_PER_SECOND)
            + Duration::from_nanos((ticks % TICKS_PER_SECOND) * NANOS_PER_TICK);
        let epoch_difference = Duration::from_secs(EPOCH_DIFFERENCE);
        if since_1601 >= epoch_difference {
            UNIX_EPOCH.checked_add(since_1601 - epoch_difference)
        } else {
            UNIX_EPOCH.checked_sub(epoch_difference - since_1601)
        }
    }

    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl<'a> Wire<'a> for FileTime {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut written = 0;

        written += write_u32(writer, self.low)?;
        written += write_u32(writer, self.high)?;

        Ok(written)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (low, high)) = context("FileTime", tuple((le_u32, le_u32)))(input)?;
        Ok((rest, Self { low, high }))
    }
}
