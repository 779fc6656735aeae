//! Alignment of irregular station timestamps onto a fixed grid.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::BTreeMap;

/// Resampling request: a grid interval and how far a reading may sit from a grid point.
///
/// Grid points with no reading within the tolerance stay missing; nothing is interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resample {
    pub interval: Duration,
    /// Defaults to half the interval.
    pub tolerance: Option<Duration>,
}

impl Resample {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tolerance: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn effective_tolerance(&self) -> Duration {
        self.tolerance.unwrap_or(self.interval / 2)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.interval > Duration::zero()
            && self.effective_tolerance() >= Duration::zero()
    }

    /// Grid points from `start` to `end`, both inclusive.
    ///
    /// The grid is anchored on `start`, or on the first timestamp without one,
    /// floored to the interval. A window like `now - 3h` therefore still lands
    /// on whole hours.
    pub(crate) fn grid(
        &self,
        index: &[DateTime<Utc>],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<DateTime<Utc>> {
        let Some(start) = start.or_else(|| index.first().copied()) else {
            return Vec::new();
        };
        let start = start.duration_trunc(self.interval).unwrap_or(start);
        let Some(end) = end.or_else(|| index.last().copied()) else {
            return Vec::new();
        };
        let mut grid = Vec::new();
        let mut point = start;
        while point <= end {
            grid.push(point);
            match point.checked_add_signed(self.interval) {
                Some(next) => point = next,
                None => break,
            }
        }
        grid
    }
}

/// Picks, for every grid point, the nearest non-missing reading within `tolerance`.
/// Equidistant readings resolve to the earlier one.
fn nearest<T: Clone>(
    index: &[DateTime<Utc>],
    grid: &[DateTime<Utc>],
    tolerance: Duration,
    present: impl Fn(usize) -> Option<T>,
) -> Vec<Option<T>> {
    grid.iter()
        .map(|point| {
            let split = index.partition_point(|t| t < point);
            let before = (0..split)
                .rev()
                .take_while(|&i| *point - index[i] <= tolerance)
                .find_map(|i| present(i).map(|v| (*point - index[i], v)));
            let after = (split..index.len())
                .take_while(|&i| index[i] - *point <= tolerance)
                .find_map(|i| present(i).map(|v| (index[i] - *point, v)));
            match (before, after) {
                (Some((db, vb)), Some((da, va))) => Some(if da < db { va } else { vb }),
                (Some((_, v)), None) | (None, Some((_, v))) => Some(v),
                (None, None) => None,
            }
        })
        .collect()
}

pub(crate) struct Resampled {
    pub index: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<String, Vec<f64>>,
    pub text: BTreeMap<String, Vec<Option<String>>>,
}

pub(crate) fn resample(
    resample: &Resample,
    index: &[DateTime<Utc>],
    columns: &BTreeMap<String, Vec<f64>>,
    text: &BTreeMap<String, Vec<Option<String>>>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Resampled {
    let grid = resample.grid(index, window.map(|w| w.0), window.map(|w| w.1));
    let tolerance = resample.effective_tolerance();

    let columns = columns
        .iter()
        .map(|(name, values)| {
            let aligned = nearest(index, &grid, tolerance, |i| {
                let v = values[i];
                (!v.is_nan()).then_some(v)
            })
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
            (name.clone(), aligned)
        })
        .collect();

    let text = text
        .iter()
        .map(|(name, values)| {
            let aligned = nearest(index, &grid, tolerance, |i| values[i].clone());
            (name.clone(), aligned)
        })
        .collect();

    Resampled {
        index: grid,
        columns,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_grid_anchoring() {
        let rs = Resample::new(Duration::hours(1));
        let grid = rs.grid(&[at(0, 7), at(2, 50)], None, None);
        assert_eq!(grid, vec![at(0, 0), at(1, 0), at(2, 0)]);

        let explicit = rs.grid(&[], Some(at(0, 30)), Some(at(2, 30)));
        assert_eq!(explicit, vec![at(0, 0), at(1, 0), at(2, 0)]);

        assert!(rs.grid(&[], None, None).is_empty());
    }

    #[test]
    fn test_aligns_to_nearest_within_tolerance() {
        let rs = Resample::new(Duration::hours(1)).with_tolerance(Duration::minutes(10));
        let index = vec![at(0, 5), at(0, 55), at(2, 30), at(3, 1)];
        let mut columns = BTreeMap::new();
        columns.insert("air_temp".to_string(), vec![1.0, 2.0, 3.0, f64::NAN]);
        let out = resample(
            &rs,
            &index,
            &columns,
            &BTreeMap::new(),
            Some((at(0, 0), at(3, 0))),
        );
        assert_eq!(out.index, vec![at(0, 0), at(1, 0), at(2, 0), at(3, 0)]);
        let values = &out.columns["air_temp"];
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], 2.0);
        // 2:30 is beyond the tolerance of both neighbouring grid points.
        assert!(values[2].is_nan());
        // The only reading near 3:00 is missing itself.
        assert!(values[3].is_nan());
    }

    #[test]
    fn test_equidistant_prefers_earlier_and_rows_survive() {
        let rs = Resample::new(Duration::minutes(30));
        let index = vec![at(0, 50), at(1, 10)];
        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), vec![5.0, 7.0]);
        let mut text = BTreeMap::new();
        text.insert("metar".to_string(), vec![Some("A".to_string()), None]);
        let out = resample(&rs, &index, &columns, &text, Some((at(1, 0), at(3, 0))));
        assert_eq!(out.index.len(), 5);
        assert_eq!(out.columns["x"][0], 5.0);
        assert!(out.columns["x"][1..].iter().all(|v| v.is_nan()));
        assert_eq!(out.text["metar"][0], Some("A".to_string()));
        assert_eq!(out.text["metar"][1], None);
    }

    #[test]
    fn test_recent_window_lands_on_whole_hours() {
        let rs = Resample::new(Duration::hours(1));
        let now = at(3, 7) + Duration::seconds(42) + Duration::milliseconds(123);
        let index = vec![at(0, 0), at(1, 0), at(2, 0), at(3, 0)];
        let mut columns = BTreeMap::new();
        columns.insert("air_temp".to_string(), vec![0.0, 1.0, 2.0, 3.0]);
        let out = resample(
            &rs,
            &index,
            &columns,
            &BTreeMap::new(),
            Some((now - Duration::hours(3), now)),
        );
        assert_eq!(out.index, vec![at(0, 0), at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(out.columns["air_temp"], vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_default_tolerance_is_half_interval() {
        let rs = Resample::new(Duration::minutes(20));
        assert_eq!(rs.effective_tolerance(), Duration::minutes(10));
        assert!(rs.is_valid());
        assert!(!Resample::new(Duration::zero()).is_valid());
    }
}
