//! Per-asset metadata aggregation for the info and TileJSON endpoints.

use futures::stream::{self, StreamExt};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::warn;

use crate::error::{RasterError, TileError};
use crate::geo::{transform_bounds, Reprojector};
use crate::raster::{DataType, DatasetRegistry, RasterAccess, RasterDataset};
use crate::stac::AssetDescriptor;

/// Edge samples used when reprojecting asset bounds.
const BOUNDS_SAMPLES: usize = 21;

/// How invalid pixels are signalled in an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodataType {
    Nodata,
    Alpha,
    None,
}

/// Summary of one asset's raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetInfo {
    /// Geographic bounds `[west, south, east, north]`.
    pub bounds: [f64; 4],
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    #[serde(rename = "dtype")]
    pub data_type: DataType,
    pub nodata_type: NodataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata_value: Option<f64>,
    /// Decimation factor of each overview, finest first.
    pub overviews: Vec<usize>,
}

impl AssetInfo {
    /// Build the summary of an opened raster.
    pub fn from_dataset<D: RasterDataset + ?Sized>(dataset: &D) -> Result<Self, RasterError> {
        let metadata = dataset.metadata();
        let reprojector = Reprojector::to_geographic(metadata.crs)?;
        let native = metadata.bounds();
        let bounds = transform_bounds(&reprojector, &native, BOUNDS_SAMPLES).ok_or_else(|| {
            RasterError::Georeference(format!("bounds {:?} cannot be reprojected", native))
        })?;

        let nodata_type = if metadata.alpha_band.is_some() {
            NodataType::Alpha
        } else if metadata.nodata.is_some() {
            NodataType::Nodata
        } else {
            NodataType::None
        };

        Ok(Self {
            bounds: bounds.as_array(),
            crs: metadata.crs.to_string(),
            width: metadata.width,
            height: metadata.height,
            band_count: metadata.band_count,
            data_type: metadata.data_type,
            nodata_type,
            // NaN has no JSON representation
            nodata_value: metadata.nodata.filter(|v| v.is_finite()),
            overviews: dataset
                .overviews()
                .iter()
                .map(|overview| metadata.decimation(overview).round() as usize)
                .collect(),
        })
    }
}

/// Asset summaries keyed by name, in resolver order.
///
/// Failed assets keep their slot with the error message.
#[derive(Debug, Clone, Default)]
pub struct AssetInfoMap {
    entries: Vec<(String, Result<AssetInfo, String>)>,
}

impl AssetInfoMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Result<AssetInfo, String>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, info)| info)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<AssetInfo, String>)> {
        self.entries.iter().map(|(name, info)| (name.as_str(), info))
    }
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    error: &'a str,
}

impl Serialize for AssetInfoMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, info) in &self.entries {
            match info {
                Ok(info) => map.serialize_entry(name, info)?,
                Err(error) => map.serialize_entry(name, &ErrorEntry { error })?,
            }
        }
        map.end()
    }
}

/// Fetch metadata for every asset, at most `workers` at a time.
///
/// A failing asset is recorded in its slot and does not abort the others.
pub async fn aggregate_info<A: RasterAccess>(
    registry: &DatasetRegistry<A>,
    assets: &[&AssetDescriptor],
    workers: usize,
) -> AssetInfoMap {
    let entries = stream::iter(assets.iter().map(|asset| async move {
        let info = registry
            .get(&asset.href)
            .await
            .and_then(|dataset| AssetInfo::from_dataset(&*dataset))
            .map_err(|source| {
                let error = TileError::AssetRead {
                    asset: asset.name.clone(),
                    tile: None,
                    source,
                };
                warn!(asset = %asset.name, error = %error, "Asset metadata unavailable");
                error.to_string()
            });
        (asset.name.clone(), info)
    }).collect::<Vec<_>>())
    .buffered(workers.max(1))
    .collect()
    .await;

    AssetInfoMap { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Crs;
    use crate::raster::{GeoTransform, MemoryAccess, MemoryDataset};

    fn dataset() -> MemoryDataset {
        MemoryDataset::filled(
            20,
            10,
            &[1.0, 2.0],
            GeoTransform::new(-10.0, 5.0, 1.0, 1.0),
            Crs::Wgs84,
        )
    }

    #[test]
    fn test_from_dataset() {
        let ds = dataset().with_nodata(0.0);
        let info = AssetInfo::from_dataset(&ds).unwrap();
        assert_eq!(info.bounds, [-10.0, -5.0, 10.0, 5.0]);
        assert_eq!(info.band_count, 2);
        assert_eq!(info.nodata_type, NodataType::Nodata);
        assert_eq!(info.nodata_value, Some(0.0));
        assert!(info.overviews.is_empty());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["dtype"], "uint8");
        assert_eq!(json["crs"], "EPSG:4326");
    }

    #[test]
    fn test_overview_decimations() {
        let ds = dataset()
            .with_overview(10, 5, vec![0.0; 10 * 5 * 2])
            .unwrap()
            .with_overview(5, 3, vec![0.0; 5 * 3 * 2])
            .unwrap();
        let info = AssetInfo::from_dataset(&ds).unwrap();
        assert_eq!(info.overviews, vec![2, 4]);
        assert_eq!(serde_json::to_value(&info).unwrap()["overviews"], serde_json::json!([2, 4]));
    }

    #[tokio::test]
    async fn test_aggregate_keeps_order_and_errors() {
        let access = MemoryAccess::new()
            .with_dataset("a.tif", dataset())
            .with_dataset("c.tif", dataset().with_alpha_band(1));
        let registry = DatasetRegistry::new(access);

        let a = AssetDescriptor::new("a", "a.tif", Some("image/tiff"));
        let b = AssetDescriptor::new("b", "missing.tif", Some("image/tiff"));
        let c = AssetDescriptor::new("c", "c.tif", Some("image/tiff"));

        let map = aggregate_info(&registry, &[&c, &b, &a], 2).await;
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["c", "b", "a"]);
        assert!(map.get("b").unwrap().is_err());
        assert_eq!(
            map.get("c").unwrap().as_ref().unwrap().nodata_type,
            NodataType::Alpha
        );

        let json = serde_json::to_string(&map).unwrap();
        let c_pos = json.find("\"c\"").unwrap();
        let a_pos = json.find("\"a\"").unwrap();
        assert!(c_pos < a_pos);
        assert!(json.contains("\"error\""));
    }
}
