use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use core::time::Duration;

use eyre::{bail, eyre, Report, Result as EyreResult, WrapErr};
use humantime::{format_duration, parse_duration};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Staggered dial schedule written as `count@duration` groups, e.g.
/// `5@10s,15@1m`: the first five targets are dialled after ten seconds, the
/// next fifteen after a minute. Targets beyond the listed groups are dialled
/// immediately.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectDelays {
    groups: Vec<(usize, Duration)>,
}

impl ConnectDelays {
    /// Number of targets covered by the listed groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups
            .iter()
            .fold(0_usize, |total, (count, _)| total.saturating_add(*count))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn delay_for(&self, index: usize) -> Duration {
        let mut start = 0_usize;

        for (count, delay) in &self.groups {
            let end = start.saturating_add(*count);
            if index < end {
                return *delay;
            }
            start = end;
        }

        Duration::ZERO
    }

    /// Delay for each of `targets` dials, spread by up to `jitter_pct`
    /// percent in either direction.
    pub fn schedule<R: Rng + ?Sized>(
        &self,
        targets: usize,
        jitter_pct: u32,
        rng: &mut R,
    ) -> Vec<Duration> {
        (0..targets)
            .map(|index| jitter(self.delay_for(index), jitter_pct, rng))
            .collect()
    }
}

fn jitter<R: Rng + ?Sized>(delay: Duration, pct: u32, rng: &mut R) -> Duration {
    let spread = delay
        .saturating_mul(pct)
        .checked_div(100)
        .unwrap_or_default();

    if spread.is_zero() {
        return delay;
    }

    let offset = rng.gen_range(Duration::ZERO..=spread.saturating_mul(2));

    delay.saturating_sub(spread).saturating_add(offset)
}

impl FromStr for ConnectDelays {
    type Err = Report;

    fn from_str(s: &str) -> EyreResult<Self> {
        let s = s.trim();

        // harness params sometimes carry an explicitly quoted empty string
        if s.is_empty() || s == "\"\"" {
            return Ok(Self::default());
        }

        let groups = s
            .split(',')
            .map(|group| {
                let Some((count, delay)) = group.trim().split_once('@') else {
                    bail!("badly formatted connect delay {group:?}, expected count@duration");
                };

                let count = count
                    .parse::<usize>()
                    .wrap_err_with(|| format!("bad count in connect delay {group:?}"))?;
                let delay = parse_duration(delay)
                    .map_err(|err| eyre!("bad duration in connect delay {group:?}: {err}"))?;

                Ok((count, delay))
            })
            .collect::<EyreResult<Vec<_>>>()?;

        Ok(Self { groups })
    }
}

impl TryFrom<String> for ConnectDelays {
    type Error = Report;

    fn try_from(value: String) -> EyreResult<Self> {
        value.parse()
    }
}

impl From<ConnectDelays> for String {
    fn from(delays: ConnectDelays) -> Self {
        delays.to_string()
    }
}

impl Display for ConnectDelays {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, (count, delay)) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{count}@{}", format_duration(*delay))?;
        }

        Ok(())
    }
}
