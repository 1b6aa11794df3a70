//! Binary map files.
//!
//! Layout, all integers little-endian `i32`:
//!
//! ```text
//! version  max_factions  width  height  height_factor  water_level
//! title[128]  author[128]  description[256]
//! start positions: max_factions x (x: i32, y: i32)
//! heights:  width*height x f32
//! surfaces: width*height x i8
//! objects:  width*height x i8
//! ```
//!
//! Version 2 files reuse the description block for an extended header:
//! `short_description[128]  magic  cliff_level  camera_height  meta[116]`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AssetError, GameError, Result};
use crate::math::{tile_center, Point3, Tile};

/// Magic value of the version 2 extended header.
pub const MAP_MAGIC: i32 = 0x0102_0304;
/// Newest version understood.
pub const MAX_MAP_VERSION: i32 = 2;
/// Smallest accepted side length.
pub const MIN_MAP_SIZE: i32 = 16;
/// Largest accepted side length.
pub const MAX_MAP_SIZE: i32 = 1024;
/// Largest faction count.
pub const MAX_FACTIONS: i32 = 8;

const TITLE_LEN: usize = 128;
const AUTHOR_LEN: usize = 128;
const DESCRIPTION_LEN: usize = 256;
const SHORT_DESCRIPTION_LEN: usize = 128;
const META_LEN: usize = 116;

/// Fields only present in version 2 maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapExtension {
    /// Height above which terrain counts as cliff.
    pub cliff_level: i32,
    /// Suggested camera height.
    pub camera_height: i32,
}

/// A decoded map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    /// File format version (1 or 2).
    pub version: i32,
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    /// Vertical scale of height samples.
    pub height_factor: i32,
    /// Water height.
    pub water_level: i32,
    /// Map title.
    pub title: String,
    /// Map author.
    pub author: String,
    /// Description (the short description for version 2).
    pub description: String,
    /// Version 2 header fields.
    pub extension: Option<MapExtension>,
    /// Start tile per faction slot.
    pub start_positions: Vec<Tile>,
    /// Height sample per tile, row-major.
    pub heights: Vec<f32>,
    /// Surface type per tile.
    pub surfaces: Vec<i8>,
    /// Object id per tile; zero is free ground.
    pub objects: Vec<i8>,
}

/// Little-endian reader over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> std::result::Result<&'a [u8], AssetError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                AssetError::Truncated(format!(
                    "{what} needs {len} bytes at offset {}, file has {}",
                    self.offset,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn i32(&mut self, what: &str) -> std::result::Result<i32, AssetError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4, what)?);
        Ok(i32::from_le_bytes(raw))
    }

    fn text(&mut self, len: usize, what: &str) -> std::result::Result<String, AssetError> {
        let raw = self.take(len, what)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

fn write_text(out: &mut Vec<u8>, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let used = bytes.len().min(len.saturating_sub(1));
    out.extend_from_slice(&bytes[..used]);
    out.resize(out.len() + (len - used), 0);
}

impl MapData {
    /// A flat, empty map of the given size with evenly spread start tiles.
    #[must_use]
    pub fn flat(width: u32, height: u32, factions: u32) -> Self {
        let tiles = (width as usize) * (height as usize);
        let factions = factions.max(1);
        #[allow(clippy::cast_possible_wrap)]
        let start_positions = (0..factions)
            .map(|i| {
                let angle = std::f32::consts::TAU * i as f32 / factions as f32;
                let (w, h) = (width as f32, height as f32);
                Tile::new(
                    (w / 2.0 + angle.cos() * w * 0.35) as i32,
                    (h / 2.0 + angle.sin() * h * 0.35) as i32,
                )
            })
            .collect();
        Self {
            version: 1,
            width,
            height,
            height_factor: 1,
            water_level: 0,
            title: "Flat".to_string(),
            author: String::new(),
            description: String::new(),
            extension: None,
            start_positions,
            heights: vec![0.0; tiles],
            surfaces: vec![0; tiles],
            objects: vec![0; tiles],
        }
    }

    /// Decode a map file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes).map_err(GameError::from)
    }

    /// Read and decode a map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(AssetError::Io)?;
        let map = Self::parse(&bytes)?;
        tracing::info!(
            path = %path.display(),
            version = map.version,
            width = map.width,
            height = map.height,
            factions = map.start_positions.len(),
            "map loaded"
        );
        Ok(map)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, AssetError> {
        let mut r = Reader::new(bytes);
        let version = r.i32("version")?;
        if !(1..=MAX_MAP_VERSION).contains(&version) {
            return Err(AssetError::UnsupportedVersion {
                found: version,
                supported: MAX_MAP_VERSION,
            });
        }
        let max_factions = r.i32("faction count")?;
        let width = r.i32("width")?;
        let height = r.i32("height")?;
        let height_factor = r.i32("height factor")?;
        let water_level = r.i32("water level")?;
        if !(MIN_MAP_SIZE..=MAX_MAP_SIZE).contains(&width)
            || !(MIN_MAP_SIZE..=MAX_MAP_SIZE).contains(&height)
        {
            return Err(AssetError::DimensionsOutOfRange { width, height });
        }
        if !(1..=MAX_FACTIONS).contains(&max_factions) {
            return Err(AssetError::FactionCountOutOfRange(max_factions));
        }
        let title = r.text(TITLE_LEN, "title")?;
        let author = r.text(AUTHOR_LEN, "author")?;

        let (description, extension) = if version == 2 {
            let short = r.text(SHORT_DESCRIPTION_LEN, "short description")?;
            let magic = r.i32("magic")?;
            if magic != MAP_MAGIC {
                return Err(AssetError::BadMagic {
                    expected: MAP_MAGIC.to_le_bytes(),
                    found: magic.to_le_bytes(),
                });
            }
            let cliff_level = r.i32("cliff level")?;
            let camera_height = r.i32("camera height")?;
            r.take(META_LEN, "meta")?;
            (
                short,
                Some(MapExtension {
                    cliff_level,
                    camera_height,
                }),
            )
        } else {
            (r.text(DESCRIPTION_LEN, "description")?, None)
        };

        let mut start_positions = Vec::new();
        for _ in 0..max_factions {
            let x = r.i32("start x")?;
            let y = r.i32("start y")?;
            start_positions.push(Tile::new(x, y));
        }

        // Dimensions were range-checked above.
        #[allow(clippy::cast_sign_loss)]
        let (width, height) = (width as u32, height as u32);
        let tiles = (width as usize) * (height as usize);
        let heights = r
            .take(tiles * 4, "heights")?
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        #[allow(clippy::cast_possible_wrap)]
        let surfaces = r.take(tiles, "surfaces")?.iter().map(|&b| b as i8).collect();
        #[allow(clippy::cast_possible_wrap)]
        let objects = r.take(tiles, "objects")?.iter().map(|&b| b as i8).collect();

        Ok(Self {
            version,
            width,
            height,
            height_factor,
            water_level,
            title,
            author,
            description,
            extension,
            start_positions,
            heights,
            surfaces,
            objects,
        })
    }

    /// Encode in the file format. Strings are truncated to their fields.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_bytes(&self) -> Vec<u8> {
        let tiles = self.tile_count();
        let mut out = Vec::with_capacity(536 + self.start_positions.len() * 8 + tiles * 6);
        for value in [
            self.version,
            self.start_positions.len() as i32,
            self.width as i32,
            self.height as i32,
            self.height_factor,
            self.water_level,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        write_text(&mut out, &self.title, TITLE_LEN);
        write_text(&mut out, &self.author, AUTHOR_LEN);
        match (self.version, self.extension) {
            (2, extension) => {
                let extension = extension.unwrap_or(MapExtension {
                    cliff_level: 0,
                    camera_height: 0,
                });
                write_text(&mut out, &self.description, SHORT_DESCRIPTION_LEN);
                out.extend_from_slice(&MAP_MAGIC.to_le_bytes());
                out.extend_from_slice(&extension.cliff_level.to_le_bytes());
                out.extend_from_slice(&extension.camera_height.to_le_bytes());
                out.resize(out.len() + META_LEN, 0);
            }
            _ => write_text(&mut out, &self.description, DESCRIPTION_LEN),
        }
        for tile in &self.start_positions {
            out.extend_from_slice(&tile.x.to_le_bytes());
            out.extend_from_slice(&tile.y.to_le_bytes());
        }
        for i in 0..tiles {
            let h = self.heights.get(i).copied().unwrap_or(0.0);
            out.extend_from_slice(&h.to_le_bytes());
        }
        for layer in [&self.surfaces, &self.objects] {
            out.extend((0..tiles).map(|i| layer.get(i).copied().unwrap_or(0) as u8));
        }
        out
    }

    /// Number of tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    fn index(&self, tile: Tile) -> Option<usize> {
        let x = u32::try_from(tile.x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(tile.y).ok().filter(|&y| y < self.height)?;
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Tile lies on the map.
    #[must_use]
    pub fn contains(&self, tile: Tile) -> bool {
        self.index(tile).is_some()
    }

    /// Height sample scaled by the height factor.
    #[must_use]
    pub fn height_at(&self, tile: Tile) -> Option<f32> {
        #[allow(clippy::cast_precision_loss)]
        let factor = self.height_factor.max(1) as f32;
        self.index(tile)
            .and_then(|i| self.heights.get(i))
            .map(|h| h / factor)
    }

    /// Surface byte at a tile.
    #[must_use]
    pub fn surface_at(&self, tile: Tile) -> Option<i8> {
        self.index(tile).and_then(|i| self.surfaces.get(i)).copied()
    }

    /// Object byte at a tile.
    #[must_use]
    pub fn object_at(&self, tile: Tile) -> Option<i8> {
        self.index(tile).and_then(|i| self.objects.get(i)).copied()
    }

    /// On the map and free of objects.
    #[must_use]
    pub fn is_walkable(&self, tile: Tile) -> bool {
        self.index(tile)
            .and_then(|i| self.objects.get(i))
            .is_some_and(|&object| object == 0)
    }

    /// World position of a faction's start tile.
    #[must_use]
    pub fn start_position(&self, slot: usize) -> Option<Point3> {
        self.start_positions.get(slot).map(|&tile| tile_center(tile))
    }

    /// Map size in world units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn world_size(&self, tile_size: f32) -> (f32, f32) {
        (self.width as f32 * tile_size, self.height as f32 * tile_size)
    }
}
