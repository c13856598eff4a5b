//! Panel geometry and the map from scan order to framebuffer pixels.
//!
//! The encoder walks the panel in scan order: for every row address, every
//! column of the chain, every lane. [`Geometry::map`] holds, for each step of
//! that walk, the index of the framebuffer pixel to show there.
//!
//! Panels stacked vertically are treated as one long chain, and with
//! `serpentine` every other panel is mounted upside down (the usual way to
//! cable a stack). The orientation rotates the whole arrangement relative to
//! the framebuffer.

use crate::Hub75Error;

/// Maximum color depth in bit planes.
pub const MAX_PLANES: usize = 10;

/// Rotation of the panels relative to the framebuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    R180,
    /// Counter-clockwise.
    Ccw,
    /// Clockwise.
    Cw,
}

impl Orientation {
    fn swaps_axes(self) -> bool {
        matches!(self, Orientation::Ccw | Orientation::Cw)
    }

    /// Framebuffer index of panel pixel `(x, y)` for a panel chain of
    /// `width` x `height` pixels.
    fn index(self, width: usize, height: usize, x: usize, y: usize) -> usize {
        match self {
            Orientation::Normal => y * width + x,
            Orientation::R180 => (height - 1 - y) * width + (width - 1 - x),
            // the framebuffer is `height` pixels wide here
            Orientation::Ccw => (width - 1 - x) * height + y,
            Orientation::Cw => x * height + (height - 1 - y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    width: usize,
    height: usize,
    n_addr_lines: usize,
    n_planes: usize,
    n_temporal_planes: usize,
    n_lanes: usize,
    map: Vec<usize>,
}

impl Geometry {
    /// Geometry of standard two-lane panels.
    ///
    /// # Arguments
    /// * `width`, `height` - The framebuffer dimensions. With
    ///   [`Orientation::Cw`] or [`Orientation::Ccw`] the panels themselves
    ///   are `height` pixels wide
    /// * `n_addr_lines` - Address lines of one panel (a panel has
    ///   `2 << n_addr_lines` rows)
    /// * `n_planes` - Color depth in bit planes, 1 to 10
    /// * `orientation` - Rotation of the panels relative to the framebuffer
    /// * `serpentine` - Every other stacked panel is mounted upside down
    ///
    /// # Returns
    /// The geometry with its scan-order map computed, temporal dithering off
    ///
    /// # Errors
    /// [`Hub75Error::InvalidGeometry`] if the panel height (`2 <<
    /// n_addr_lines`) doesn't divide the chain height or `n_planes` is out of
    /// `1..=10`.
    pub fn new(
        width: usize,
        height: usize,
        n_addr_lines: usize,
        n_planes: usize,
        orientation: Orientation,
        serpentine: bool,
    ) -> Result<Self, Hub75Error> {
        const N_LANES: usize = 2;
        check_dimensions(width, height, n_addr_lines, n_planes, N_LANES)?;

        let (panel_width, panel_height) = if orientation.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        };
        let rows_per_panel = N_LANES << n_addr_lines;
        if panel_height % rows_per_panel != 0 {
            return Err(Hub75Error::InvalidGeometry(
                "height is not a multiple of the panel height",
            ));
        }
        let n_addr = 1 << n_addr_lines;
        let pixels_across = panel_width * (panel_height / rows_per_panel);

        let mut map = Vec::with_capacity(width * height);
        for addr in 0..n_addr {
            for column in 0..pixels_across {
                let panel = column / panel_width;
                let x = column % panel_width;
                for lane in 0..N_LANES {
                    let row = addr + lane * n_addr;
                    let (x, y) = if serpentine && panel % 2 == 1 {
                        (panel_width - 1 - x, (panel + 1) * rows_per_panel - 1 - row)
                    } else {
                        (x, panel * rows_per_panel + row)
                    };
                    map.push(orientation.index(panel_width, panel_height, x, y));
                }
            }
        }

        Ok(Self {
            width,
            height,
            n_addr_lines,
            n_planes,
            n_temporal_planes: 0,
            n_lanes: N_LANES,
            map,
        })
    }

    /// Geometry with a caller supplied map, e.g. from [`multilane_map`].
    ///
    /// # Errors
    /// [`Hub75Error::InvalidGeometry`] if the map doesn't have one entry per
    /// pixel or points outside the framebuffer.
    pub fn with_map(
        width: usize,
        height: usize,
        n_addr_lines: usize,
        n_planes: usize,
        n_lanes: usize,
        map: Vec<usize>,
    ) -> Result<Self, Hub75Error> {
        check_dimensions(width, height, n_addr_lines, n_planes, n_lanes)?;
        let pixels = width * height;
        if map.len() != pixels {
            return Err(Hub75Error::InvalidGeometry("map length doesn't match the pixel count"));
        }
        if map.len() % (n_lanes << n_addr_lines) != 0 {
            return Err(Hub75Error::InvalidGeometry(
                "pixel count is not a multiple of the rows per panel",
            ));
        }
        if map.iter().any(|&i| i >= pixels) {
            return Err(Hub75Error::InvalidGeometry("map points outside the framebuffer"));
        }
        Ok(Self {
            width,
            height,
            n_addr_lines,
            n_planes,
            n_temporal_planes: 0,
            n_lanes,
            map,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn n_addr_lines(&self) -> usize {
        self.n_addr_lines
    }

    pub fn n_planes(&self) -> usize {
        self.n_planes
    }

    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    /// Spreads the lowest `n` bit planes over `n` successive frames.
    ///
    /// Each frame shifts all the upper planes but only one of the low ones,
    /// lit `n` times longer, which shortens the frame. 0 and 1 disable
    /// dithering.
    ///
    /// # Errors
    /// [`Hub75Error::InvalidGeometry`] if `n` exceeds the bit plane count.
    pub fn with_temporal_planes(mut self, n: usize) -> Result<Self, Hub75Error> {
        if n > self.n_planes {
            return Err(Hub75Error::InvalidGeometry(
                "more temporal planes than bit planes",
            ));
        }
        self.n_temporal_planes = n;
        Ok(self)
    }

    pub fn n_temporal_planes(&self) -> usize {
        self.n_temporal_planes
    }

    /// Frames it takes to show every bit plane once.
    pub fn temporal_phases(&self) -> usize {
        self.n_temporal_planes.max(1)
    }

    /// Number of row addresses scanned.
    pub fn n_addr(&self) -> usize {
        1 << self.n_addr_lines
    }

    /// Columns shifted per row, across the whole chain.
    pub fn pixels_across(&self) -> usize {
        self.map.len() / (self.n_lanes << self.n_addr_lines)
    }

    pub fn map(&self) -> &[usize] {
        &self.map
    }
}

fn check_dimensions(
    width: usize,
    height: usize,
    n_addr_lines: usize,
    n_planes: usize,
    n_lanes: usize,
) -> Result<(), Hub75Error> {
    if width == 0 || height == 0 {
        return Err(Hub75Error::InvalidGeometry("empty framebuffer"));
    }
    if n_lanes == 0 {
        return Err(Hub75Error::InvalidGeometry("no lanes"));
    }
    // more address lines than any pin word could carry
    if n_addr_lines >= 16 {
        return Err(Hub75Error::InvalidGeometry("too many address lines"));
    }
    if n_planes == 0 || n_planes > MAX_PLANES {
        return Err(Hub75Error::InvalidGeometry("bit planes must be in 1..=10"));
    }
    Ok(())
}

/// Map for panels driven with `n_lanes` lanes of one panel height each,
/// stacked top to bottom.
///
/// # Errors
/// [`Hub75Error::InvalidGeometry`] unless `height == n_lanes << n_addr_lines`.
pub fn multilane_map(
    width: usize,
    height: usize,
    n_addr_lines: usize,
    n_lanes: usize,
) -> Result<Vec<usize>, Hub75Error> {
    if n_addr_lines >= 16 || height != n_lanes << n_addr_lines {
        return Err(Hub75Error::InvalidGeometry(
            "height doesn't match lanes and address lines",
        ));
    }
    let n_addr = 1 << n_addr_lines;
    let mut map = Vec::with_capacity(width * height);
    for addr in 0..n_addr {
        for x in 0..width {
            for lane in 0..n_lanes {
                let y = addr + lane * n_addr;
                map.push(x + width * y);
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(map: &[usize]) -> bool {
        let mut sorted = map.to_vec();
        sorted.sort_unstable();
        sorted.iter().enumerate().all(|(i, &v)| i == v)
    }

    #[test]
    fn test_single_panel() {
        let g = Geometry::new(64, 32, 4, 10, Orientation::Normal, false).unwrap();
        assert_eq!(g.pixels_across(), 64);
        assert_eq!(g.n_addr(), 16);
        assert!(is_permutation(g.map()));
        // address 0, column 0: rows 0 and 16
        assert_eq!(&g.map()[..4], &[0, 16 * 64, 1, 16 * 64 + 1]);
    }

    #[test]
    fn test_stacked_panels_chain() {
        // 1 address line: four rows per panel, eight panels in a 64x32 stack
        let g = Geometry::new(64, 32, 1, 10, Orientation::Normal, false).unwrap();
        assert_eq!(g.pixels_across(), 512);
        assert!(is_permutation(g.map()));
        // first column of the second panel
        assert_eq!(g.map()[64 * 2], 4 * 64);
    }

    #[test]
    fn test_serpentine_flips_odd_panels() {
        let g = Geometry::new(8, 8, 1, 4, Orientation::Normal, true).unwrap();
        assert!(is_permutation(g.map()));
        // first column of the second panel is its bottom right pixel
        let column = 8;
        assert_eq!(g.map()[column * 2], 7 * 8 + 7);
        assert_eq!(g.map()[column * 2 + 1], 5 * 8 + 7);
    }

    #[test]
    fn test_orientations_are_permutations() {
        for orientation in [
            Orientation::Normal,
            Orientation::R180,
            Orientation::Ccw,
            Orientation::Cw,
        ] {
            let g = Geometry::new(32, 64, 4, 8, orientation, true).unwrap();
            assert!(is_permutation(g.map()), "{orientation:?}");
        }
    }

    #[test]
    fn test_r180_reverses_normal() {
        let normal = Geometry::new(64, 32, 4, 10, Orientation::Normal, false).unwrap();
        let rotated = Geometry::new(64, 32, 4, 10, Orientation::R180, false).unwrap();
        let last = 64 * 32 - 1;
        for (n, r) in normal.map().iter().zip(rotated.map()) {
            assert_eq!(*r, last - n);
        }
    }

    #[test]
    fn test_cw_uses_transposed_panels() {
        // a 32 wide, 64 tall framebuffer shown on a 64x32 panel turned sideways
        let g = Geometry::new(32, 64, 4, 10, Orientation::Cw, false).unwrap();
        assert_eq!(g.pixels_across(), 64);
        assert!(is_permutation(g.map()));
        // the sideways panel chain is only 30 rows tall
        assert!(Geometry::new(30, 64, 4, 10, Orientation::Cw, false).is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(Geometry::new(64, 30, 4, 10, Orientation::Normal, false).is_err());
        assert!(Geometry::new(64, 32, 4, 0, Orientation::Normal, false).is_err());
        assert!(Geometry::new(64, 32, 4, 11, Orientation::Normal, false).is_err());
        assert!(Geometry::new(0, 32, 4, 10, Orientation::Normal, false).is_err());
    }

    #[test]
    fn test_temporal_planes() {
        let g = Geometry::new(64, 32, 4, 8, Orientation::Normal, false).unwrap();
        assert_eq!(g.temporal_phases(), 1);
        let g = g.with_temporal_planes(4).unwrap();
        assert_eq!(g.n_temporal_planes(), 4);
        assert_eq!(g.temporal_phases(), 4);
        let g = g.with_temporal_planes(1).unwrap();
        assert_eq!(g.temporal_phases(), 1);
        assert!(g.clone().with_temporal_planes(8).is_ok());
        assert!(g.with_temporal_planes(9).is_err());
    }

    #[test]
    fn test_multilane_map() {
        let map = multilane_map(4, 12, 1, 6).unwrap();
        assert_eq!(map.len(), 48);
        assert!(is_permutation(&map));
        // address 0, column 0, lanes 0..6 are rows 0, 2, 4, ...
        assert_eq!(&map[..6], &[0, 8, 16, 24, 32, 40]);
        let g = Geometry::with_map(4, 12, 1, 8, 6, map).unwrap();
        assert_eq!(g.pixels_across(), 4);
        assert!(multilane_map(4, 10, 1, 6).is_err());
    }

    #[test]
    fn test_with_map_validation() {
        assert!(Geometry::with_map(2, 4, 1, 8, 2, vec![0; 7]).is_err());
        assert!(Geometry::with_map(2, 4, 1, 8, 2, vec![0, 1, 2, 3, 4, 5, 6, 8]).is_err());
        assert!(Geometry::with_map(2, 4, 1, 8, 2, (0..8).collect()).is_ok());
    }
}
