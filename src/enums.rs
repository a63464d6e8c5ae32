#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// How source pixels are deposited into the voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum BinFilling {
    /// Each pixel lands in exactly one voxel with weight 1.
    #[default]
    NearestNeighbor,
    /// Each pixel is splatted with one Gaussian kernel of the given variance
    /// (squared voxel units) for the whole run.
    FixedGaussian { variance: f64 },
    /// Each pixel is splatted with a kernel whose variance shrinks with the
    /// local gradient magnitude of its source image.
    AdaptiveGaussian,
}

impl BinFilling {
    pub fn needs_kernels(&self) -> bool {
        !matches!(self, BinFilling::NearestNeighbor)
    }
}

/// How voxels that received no contribution are patched after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoleFilling {
    /// Empty voxels are left at zero.
    None,
    /// Average of the non-empty voxels within a fixed cubic neighbourhood.
    FixedRegion { radius: usize },
    /// Grow the neighbourhood one voxel at a time until a non-empty voxel is
    /// found or `max_radius` is reached.
    GrowingRegion { max_radius: usize },
}

impl Default for HoleFilling {
    fn default() -> Self {
        HoleFilling::GrowingRegion { max_radius: 3 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Processor {
    /// A single owner applies every update in order.
    Sequential,
    /// Rayon workers each own a partial volume, merged by addition.
    #[default]
    Parallel,
}
