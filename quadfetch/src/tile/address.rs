//! Quad-tree tile addresses.
//!
//! A [`TileAddress`] names one node of the Web Mercator quad-tree. It carries
//! two zoom levels: `z`, the zoom actually requested from a data source, and
//! `scaled_z`, the zoom at which the tile is displayed. The two differ when a
//! tile is *overzoomed*, i.e. displayed at a finer zoom than the source can
//! provide.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Deepest zoom level an address may take.
pub const MAX_ZOOM: u8 = 30;

/// Tile edge length, in pixels, that corresponds to a zoom bias of zero.
pub const BASE_TILE_SIZE: u32 = 256;

/// Immutable identifier of a map tile.
///
/// Identity and ordering use `(x, y, z, scaled_z)`; `source_max_zoom` records
/// the clamp applied by [`TileAddress::with_max_source_zoom`] and is carried
/// along by [`parent`](TileAddress::parent) and
/// [`child`](TileAddress::child), but two addresses naming the same tile are
/// equal regardless of it.
#[derive(Debug, Clone, Copy)]
pub struct TileAddress {
    /// Column, 0 at the west edge of projection space
    pub x: u32,
    /// Row, 0 at the north edge of projection space
    pub y: u32,
    /// Zoom requested from the source
    pub z: u8,
    /// Maximum zoom the source provides
    pub source_max_zoom: u8,
    /// Display zoom
    pub scaled_z: u8,
}

impl TileAddress {
    /// Creates an address whose display zoom equals its source zoom.
    pub const fn new(x: u32, y: u32, z: u8) -> Self {
        Self {
            x,
            y,
            z,
            source_max_zoom: MAX_ZOOM,
            scaled_z: z,
        }
    }

    /// Creates an address with an explicit display zoom.
    pub const fn with_scaled_zoom(x: u32, y: u32, z: u8, scaled_z: u8) -> Self {
        Self {
            x,
            y,
            z,
            source_max_zoom: MAX_ZOOM,
            scaled_z,
        }
    }

    /// Returns true when the tile is displayed finer than its source data.
    pub fn is_overzoomed(&self) -> bool {
        self.scaled_z > self.z
    }

    /// Checks that the coordinates lie inside the grid of zoom `z`.
    ///
    /// When `zoom_limit` is given, the zoom must also be strictly below it.
    pub fn is_valid(&self, zoom_limit: Option<u8>) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let max = 1u64 << self.z;
        let in_grid = u64::from(self.x) < max && u64::from(self.y) < max;
        match zoom_limit {
            Some(limit) => in_grid && self.z < limit,
            None => in_grid,
        }
    }

    /// Returns the enclosing tile one level up.
    ///
    /// Source coordinates are halved and both zoom levels drop by one, so an
    /// address that was clamped by `with_max_source_zoom` keeps shrinking in
    /// source space. The root tile is its own parent.
    pub fn parent(&self) -> TileAddress {
        if self.z == 0 {
            return *self;
        }
        TileAddress {
            x: self.x >> 1,
            y: self.y >> 1,
            z: self.z - 1,
            source_max_zoom: self.source_max_zoom,
            scaled_z: self.scaled_z.saturating_sub(1).max(self.z - 1),
        }
    }

    /// Returns one of the four children of this tile.
    ///
    /// `index` selects the quadrant: `x` gains `index / 2` and `y` gains
    /// `index % 2`. The child is clamped to `max_zoom`, so children of a tile
    /// already at the source's maximum zoom resolve to the same source tile
    /// with a finer display zoom.
    pub fn child(&self, index: u8, max_zoom: u8) -> Option<TileAddress> {
        if index > 3 || self.z >= MAX_ZOOM {
            return None;
        }
        let i = u32::from(index / 2);
        let j = u32::from(index % 2);

        let child = TileAddress {
            x: (self.x << 1) + i,
            y: (self.y << 1) + j,
            z: self.z + 1,
            source_max_zoom: self.source_max_zoom,
            scaled_z: self.scaled_z.saturating_add(1),
        };
        Some(child.with_max_source_zoom(max_zoom))
    }

    /// Clamps the address to a source that stops at `max_zoom`.
    ///
    /// The returned address covers the same area of the world at the
    /// coarsest source zoom that contains it, and keeps the display zoom.
    pub fn with_max_source_zoom(&self, max_zoom: u8) -> TileAddress {
        if self.z <= max_zoom {
            return TileAddress {
                source_max_zoom: max_zoom,
                ..*self
            };
        }
        let over = u32::from(self.z - max_zoom);
        TileAddress {
            x: self.x >> over,
            y: self.y >> over,
            z: max_zoom,
            source_max_zoom: max_zoom,
            scaled_z: self.scaled_z,
        }
    }

    /// Requests coarser source data for sources with tiles larger than 256px.
    ///
    /// A bias of 1 (512px tiles) displays one source tile over four 256px
    /// display tiles.
    pub fn zoom_bias_adjusted(&self, zoom_bias: u8) -> TileAddress {
        if zoom_bias == 0 {
            return *self;
        }
        let bias = zoom_bias.min(self.z);
        TileAddress {
            x: self.x >> bias,
            y: self.y >> bias,
            z: self.z - bias,
            source_max_zoom: self.source_max_zoom,
            scaled_z: self.z,
        }
    }

    /// The address as stored by caches and archives: source coordinates only.
    pub fn source_tile(&self) -> TileAddress {
        TileAddress {
            scaled_z: self.z,
            ..*self
        }
    }

    /// Iterates from this address up to the root, this address included.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: Some(*self) }
    }

    /// Bing-style quadkey of the source tile. The root has an empty quadkey.
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for level in (1..=self.z).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }

    /// Row index with the origin at the south edge, as used by TMS servers.
    pub fn tms_y(&self) -> u32 {
        let max = (1u64 << self.z) - 1;
        (max - u64::from(self.y).min(max)) as u32
    }
}

/// Zoom bias for a source whose tiles are `tile_size` pixels wide.
///
/// 256px gives 0, 512px gives 1, 1024px gives 2. Sizes that are not a power
/// of two, or smaller than 256px, fall back to 0.
pub fn zoom_bias_from_tile_size(tile_size: u32) -> u8 {
    if tile_size < BASE_TILE_SIZE || !tile_size.is_power_of_two() {
        if tile_size != 0 && tile_size != BASE_TILE_SIZE {
            tracing::warn!(
                tile_size,
                "Tile size must be a power of two >= 256, using 256px"
            );
        }
        return 0;
    }
    (tile_size / BASE_TILE_SIZE).trailing_zeros() as u8
}

impl PartialEq for TileAddress {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TileAddress {}

impl Ord for TileAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.x, self.y, self.z, self.scaled_z).cmp(&(other.x, other.y, other.z, other.scaled_z))
    }
}

impl PartialOrd for TileAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for TileAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.x, self.y, self.z, self.scaled_z).hash(state);
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/s:{}", self.x, self.y, self.z, self.scaled_z)
    }
}

/// Iterator returned by [`TileAddress::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors {
    next: Option<TileAddress>,
}

impl Iterator for Ancestors {
    type Item = TileAddress;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current.z == 0 {
            None
        } else {
            Some(current.parent())
        };
        Some(current)
    }
}
