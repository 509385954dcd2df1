//! STAC item model.
//!
//! Only the members the tiler needs are kept: the item id, its geographic
//! bounding box and the assets in declaration order.

use serde::Serialize;
use serde_json::Value;

use crate::error::StacError;
use crate::geo::BoundingBox;
use crate::io::Location;

// =============================================================================
// Media types
// =============================================================================

/// Raster media types an asset may declare to be tiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// `image/tiff; application=geotiff`
    GeoTiff,
    /// `image/tiff; application=geotiff; profile=cloud-optimized`
    CloudOptimizedGeoTiff,
    /// `image/vnd.stac.geotiff; cloud-optimized=true`
    StacCloudOptimizedGeoTiff,
    /// `image/tiff`
    Tiff,
    /// `image/x.geotiff`
    XGeoTiff,
    /// `image/jp2`
    Jpeg2000,
    /// `application/x-hdf5`
    Hdf5,
    /// `application/x-hdf`
    Hdf,
}

impl MediaType {
    pub const ALL: [MediaType; 8] = [
        MediaType::GeoTiff,
        MediaType::CloudOptimizedGeoTiff,
        MediaType::StacCloudOptimizedGeoTiff,
        MediaType::Tiff,
        MediaType::XGeoTiff,
        MediaType::Jpeg2000,
        MediaType::Hdf5,
        MediaType::Hdf,
    ];

    /// Canonical media type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::GeoTiff => "image/tiff; application=geotiff",
            MediaType::CloudOptimizedGeoTiff => {
                "image/tiff; application=geotiff; profile=cloud-optimized"
            }
            MediaType::StacCloudOptimizedGeoTiff => "image/vnd.stac.geotiff; cloud-optimized=true",
            MediaType::Tiff => "image/tiff",
            MediaType::XGeoTiff => "image/x.geotiff",
            MediaType::Jpeg2000 => "image/jp2",
            MediaType::Hdf5 => "application/x-hdf5",
            MediaType::Hdf => "application/x-hdf",
        }
    }

    /// Recognise a declared media type.
    ///
    /// Matching ignores ASCII case and whitespace around the `;` separators.
    pub fn parse(media_type: &str) -> Option<MediaType> {
        let wanted = canonicalize(media_type);
        Self::ALL
            .into_iter()
            .find(|candidate| canonicalize(candidate.as_str()) == wanted)
    }

    /// Whether a declared media type makes an asset eligible for tiling.
    pub fn eligible(media_type: &str) -> bool {
        Self::parse(media_type).is_some()
    }
}

fn canonicalize(media_type: &str) -> String {
    media_type
        .split(';')
        .map(|part| part.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

// =============================================================================
// Item
// =============================================================================

/// One asset of a STAC item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetDescriptor {
    pub name: String,

    /// Location of the asset, resolved against the item location.
    pub href: String,

    /// Declared media type, if any.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl AssetDescriptor {
    pub fn new(name: impl Into<String>, href: impl Into<String>, media_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
            media_type: media_type.map(str::to_string),
        }
    }

    /// Whether the declared media type is on the raster allow-list.
    pub fn is_raster(&self) -> bool {
        self.media_type.as_deref().is_some_and(MediaType::eligible)
    }
}

/// A loaded STAC item.
#[derive(Debug, Clone, PartialEq)]
pub struct StacItem {
    pub id: String,

    /// West, south, east, north in geographic coordinates.
    pub bbox: BoundingBox,

    /// Assets in declaration order.
    pub assets: Vec<AssetDescriptor>,
}

impl StacItem {
    /// Look up an asset by name.
    pub fn asset(&self, name: &str) -> Option<&AssetDescriptor> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Parse an item document.
    ///
    /// Relative asset hrefs are resolved against `location`.
    pub fn from_json(document: &[u8], location: &Location) -> Result<Self, StacError> {
        let parse_error = |reason: String| StacError::Parse {
            location: location.to_string(),
            reason,
        };

        let value: Value =
            serde_json::from_slice(document).map_err(|e| parse_error(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| parse_error("document is not a JSON object".to_string()))?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let bbox = object
            .get("bbox")
            .ok_or(StacError::MissingField { field: "bbox" })?;
        let bbox = parse_bbox(bbox).map_err(parse_error)?;

        let assets = object
            .get("assets")
            .ok_or(StacError::MissingField { field: "assets" })?
            .as_object()
            .ok_or_else(|| parse_error("'assets' is not an object".to_string()))?;

        let mut descriptors = Vec::with_capacity(assets.len());
        for (name, asset) in assets {
            let href = asset
                .get("href")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error(format!("asset '{}' has no href", name)))?;
            let href = location
                .join(href)
                .map_err(|e| parse_error(format!("asset '{}': {}", name, e)))?;
            let media_type = asset.get("type").and_then(Value::as_str);
            descriptors.push(AssetDescriptor::new(name, href.to_string(), media_type));
        }

        Ok(Self {
            id,
            bbox,
            assets: descriptors,
        })
    }
}

/// Read a 2D (4 values) or 3D (6 values) bbox.
fn parse_bbox(value: &Value) -> Result<BoundingBox, String> {
    let values: Vec<f64> = value
        .as_array()
        .ok_or_else(|| "'bbox' is not an array".to_string())?
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| "'bbox' has a non-numeric value".to_string()))
        .collect::<Result<_, _>>()?;

    match values.as_slice() {
        [w, s, e, n] => Ok(BoundingBox::new(*w, *s, *e, *n)),
        [w, s, _, e, n, _] => Ok(BoundingBox::new(*w, *s, *e, *n)),
        other => Err(format!("'bbox' has {} values, expected 4 or 6", other.len())),
    }
}
