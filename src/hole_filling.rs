use crate::enums::HoleFilling;
use crate::error::ReconstructionError;

use log::warn;
use ndarray::{Array3, ArrayView3, Zip};

/// Outcome of a hole filling pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HoleFillingReport {
    /// Voxels without any contribution after binning.
    pub empty_voxels: usize,
    /// Empty voxels that received a value.
    pub filled: usize,
    /// Empty voxels left at zero because no neighbour was found in range.
    pub unfillable: usize,
}

pub struct HoleFiller {
    strategy: HoleFilling,
}

impl HoleFiller {
    /// # Errors
    ///
    /// Returns error if the strategy's radius is zero.
    pub fn new(strategy: HoleFilling) -> Result<Self, ReconstructionError> {
        match strategy {
            HoleFilling::FixedRegion { radius: 0 } | HoleFilling::GrowingRegion { max_radius: 0 } => {
                Err(ReconstructionError::InvalidHoleFillingRadius)
            }
            _ => Ok(Self { strategy }),
        }
    }

    /// Fill the voxels flagged in `empty`. `empty` is the mask captured right
    /// after normalization; voxels filled here never serve as sources.
    pub fn fill(&self, volume: &mut Array3<f32>, empty: &ArrayView3<'_, bool>) -> HoleFillingReport {
        let empty_voxels = empty.iter().filter(|&&e| e).count();
        if empty_voxels == 0 {
            return HoleFillingReport::default();
        }

        let frozen = volume.view();
        let filled = Zip::indexed(empty).par_map_collect(|(z, y, x), &is_empty| {
            if !is_empty {
                return None;
            }
            let voxel = [z, y, x];
            match self.strategy {
                HoleFilling::None => None,
                HoleFilling::FixedRegion { radius } => neighbourhood_mean(&frozen, empty, voxel, radius, 0),
                HoleFilling::GrowingRegion { max_radius } => (1..=max_radius)
                    .find_map(|radius| neighbourhood_mean(&frozen, empty, voxel, radius, radius)),
            }
        });

        let mut count = 0;
        Zip::from(volume).and(&filled).for_each(|value, fill| {
            if let Some(fill) = fill {
                *value = *fill;
                count += 1;
            }
        });

        let report = HoleFillingReport {
            empty_voxels,
            filled: count,
            unfillable: empty_voxels - count,
        };
        if report.unfillable > 0 && !matches!(self.strategy, HoleFilling::None) {
            warn!(
                "{} of {} empty voxels had no neighbour within range and stay zero",
                report.unfillable, report.empty_voxels
            );
        }
        report
    }
}

/// Mean of the non-empty voxels whose Chebyshev distance to `center` lies in
/// `inner..=radius`.
fn neighbourhood_mean(
    volume: &ArrayView3<'_, f32>,
    empty: &ArrayView3<'_, bool>,
    center: [usize; 3],
    radius: usize,
    inner: usize,
) -> Option<f32> {
    let (nz, ny, nx) = volume.dim();
    let range = |c: usize, n: usize| c.saturating_sub(radius)..(c + radius + 1).min(n);
    let [cz, cy, cx] = center;

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for z in range(cz, nz) {
        let dz = z.abs_diff(cz);
        for y in range(cy, ny) {
            let dyz = dz.max(y.abs_diff(cy));
            for x in range(cx, nx) {
                if dyz.max(x.abs_diff(cx)) < inner || empty[[z, y, x]] {
                    continue;
                }
                sum += f64::from(volume[[z, y, x]]);
                count += 1;
            }
        }
    }
    (count > 0).then(|| (sum / count as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_seed(shape: (usize, usize, usize), seed: [usize; 3], value: f32) -> (Array3<f32>, Array3<bool>) {
        let mut volume = Array3::zeros(shape);
        let mut empty = Array3::from_elem(shape, true);
        volume[seed] = value;
        empty[seed] = false;
        (volume, empty)
    }

    #[test]
    fn fixed_region_leaves_distant_voxels_empty() {
        let (mut volume, empty) = single_seed((1, 1, 8), [0, 0, 0], 40.0);
        let filler = HoleFiller::new(HoleFilling::FixedRegion { radius: 2 }).unwrap();
        let report = filler.fill(&mut volume, &empty.view());
        assert_eq!(report, HoleFillingReport { empty_voxels: 7, filled: 2, unfillable: 5 });
        assert_eq!(volume.as_slice().unwrap(), &[40.0, 40.0, 40.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn growing_region_reaches_every_voxel_in_range() {
        let (mut volume, empty) = single_seed((3, 3, 8), [1, 1, 0], 40.0);
        let filler = HoleFiller::new(HoleFilling::GrowingRegion { max_radius: 8 }).unwrap();
        let report = filler.fill(&mut volume, &empty.view());
        assert_eq!(report.unfillable, 0);
        assert_eq!(report.filled, 71);
        assert!(volume.iter().all(|&v| v == 40.0));
    }

    #[test]
    fn growing_region_stops_at_max_radius() {
        let (mut volume, empty) = single_seed((1, 1, 6), [0, 0, 0], 10.0);
        let filler = HoleFiller::new(HoleFilling::GrowingRegion { max_radius: 3 }).unwrap();
        let report = filler.fill(&mut volume, &empty.view());
        assert_eq!(report.filled, 3);
        assert_eq!(report.unfillable, 2);
    }

    #[test]
    fn growing_region_averages_nearest_shell_only() {
        let mut volume = Array3::zeros((1, 1, 7));
        let mut empty = Array3::from_elem((1, 1, 7), true);
        for (x, value) in [(2, 10.0), (4, 30.0), (6, 1000.0)] {
            volume[[0, 0, x]] = value;
            empty[[0, 0, x]] = false;
        }
        let filler = HoleFiller::new(HoleFilling::GrowingRegion { max_radius: 5 }).unwrap();
        filler.fill(&mut volume, &empty.view());
        assert_relative_eq!(volume[[0, 0, 3]], 20.0);
        assert_relative_eq!(volume[[0, 0, 0]], 10.0);
        assert_relative_eq!(volume[[0, 0, 5]], 515.0);
    }

    #[test]
    fn filled_voxels_do_not_feed_later_searches() {
        let (mut volume, empty) = single_seed((1, 1, 5), [0, 0, 0], 8.0);
        let filler = HoleFiller::new(HoleFilling::FixedRegion { radius: 1 }).unwrap();
        let report = filler.fill(&mut volume, &empty.view());
        assert_eq!(report.filled, 1);
        assert_eq!(volume[[0, 0, 2]], 0.0);
    }

    #[test]
    fn none_reports_every_empty_voxel() {
        let (mut volume, empty) = single_seed((2, 2, 2), [0, 0, 0], 5.0);
        let report = HoleFiller::new(HoleFilling::None)
            .unwrap()
            .fill(&mut volume, &empty.view());
        assert_eq!(report, HoleFillingReport { empty_voxels: 7, filled: 0, unfillable: 7 });
    }

    #[test]
    fn rejects_zero_radius() {
        assert!(HoleFiller::new(HoleFilling::FixedRegion { radius: 0 }).is_err());
        assert!(HoleFiller::new(HoleFilling::GrowingRegion { max_radius: 0 }).is_err());
    }
}
