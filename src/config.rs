use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use strata_map::{HashAlgorithm, RegionHashConfig, WorldSubset};

#[derive(Clone, Debug, Deserialize, Default, Serialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub map: MapConfig,
    pub layer: LayerConfig,
    pub workers: WorkerConfig,
    pub hash_algorithm: HashAlgorithm,
}

impl Config {
    pub fn read_file(path: &str) -> Result<Self, ron::Error> {
        let reader = std::fs::File::open(path)?;

        ron::de::from_reader(reader)
    }

    /// Canonical text of every setting that affects rendered output. Cache settings and worker counts are not part of
    /// it.
    ///
    /// The custom block config is included by content as well as by path, so editing that file in place is a settings
    /// change.
    pub fn fingerprint_text(&self) -> Result<String, ron::Error> {
        let mut text = ron::ser::to_string(&self.render)?;
        text.push('\n');
        text.push_str(&ron::ser::to_string(&self.map)?);
        text.push('\n');
        text.push_str(&self.map.subset.description());
        text.push('\n');
        text.push_str(&ron::ser::to_string(&self.layer)?);
        if let Some(path) = &self.layer.custom_block_config {
            text.push('\n');
            match fs::read(path) {
                Ok(bytes) => text.push_str(&self.hash_algorithm.digest(&bytes).to_string()),
                Err(e) => log::warn!("failed to read custom block config {}: {}", path.display(), e),
            }
        }
        Ok(text)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When off, every visible tile is rendered and no digest is kept between runs.
    pub use_cache: bool,
    pub raw_chunk_cache_size: usize,
    pub geometry_cache_size: usize,
    pub region_hashes: RegionHashConfig,
    /// Parsed region containers kept open at once.
    pub region_file_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            raw_chunk_cache_size: 100,
            geometry_cache_size: 100,
            region_hashes: RegionHashConfig::default(),
            region_file_cache_size: 16,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub rasteriser: String,
    pub max_tiles: i32,
    pub zoom_levels: u32,
    pub tile_size: u32,
    pub colour_depth: u32,
    pub alpha_bits: u32,
    pub samples: u32,
    pub output_dir: PathBuf,
    pub textures: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            rasteriser: "opengl".to_owned(),
            max_tiles: -1,
            zoom_levels: 8,
            tile_size: 512,
            colour_depth: 16,
            alpha_bits: 0,
            samples: 4,
            output_dir: PathBuf::from("map"),
            textures: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MapConfig {
    pub id: String,
    pub name: String,
    /// Radians.
    pub camera_angle: f32,
    /// Radians.
    pub camera_elevation: f32,
    pub dimension: Dimension,
    pub closest_zoom_size: u32,
    pub subset: WorldSubset,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            id: "map0".to_owned(),
            name: "Map".to_owned(),
            camera_angle: std::f32::consts::FRAC_PI_4,
            camera_elevation: std::f32::consts::FRAC_PI_4,
            dimension: Dimension::Overworld,
            closest_zoom_size: 12,
            subset: WorldSubset::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct LayerConfig {
    pub id: String,
    pub name: String,
    pub light_style: LightStyle,
    pub render_style: RenderStyle,
    pub image_format: ImageFormat,
    pub compression_level: f32,
    pub custom_block_config: Option<PathBuf>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            id: "layer0".to_owned(),
            name: "Day".to_owned(),
            light_style: LightStyle::Day,
            render_style: RenderStyle::Normal,
            image_format: ImageFormat::Png,
            compression_level: 0.95,
            custom_block_config: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LightStyle {
    Day,
    Night,
    Cave,
    None,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RenderStyle {
    Normal,
    Cave,
    ExploredCaves,
    Nether,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ImageFormat {
    Png,
    Jpg,
    Gif,
    WebP,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
        }
    }
}

/// Worker threads per render pass phase. Zero means one.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub find_changed: usize,
    pub render: usize,
    pub downsample: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            find_changed: 4,
            render: 1,
            downsample: 4,
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
