//! Selection of the assets backing a tile.

use crate::error::TileError;
use crate::stac::{AssetDescriptor, StacItem};

/// Assets of `item` that can be tiled, in declaration order.
///
/// An asset is eligible when its media type is on the raster allow-list and
/// its name is not in `exclude`.
pub fn eligible_assets<'a>(item: &'a StacItem, exclude: &[String]) -> Vec<&'a AssetDescriptor> {
    item.assets
        .iter()
        .filter(|asset| asset.is_raster() && !exclude.contains(&asset.name))
        .collect()
}

/// Resolve the requested asset names against `item`.
///
/// An empty request selects every eligible asset. Otherwise assets are
/// returned in the caller's order.
///
/// # Errors
/// `UnknownAsset` for a name not in the item, `IneligibleAsset` for an asset
/// that is excluded or not a raster.
pub fn resolve<'a>(
    item: &'a StacItem,
    requested: &[String],
    exclude: &[String],
) -> Result<Vec<&'a AssetDescriptor>, TileError> {
    if requested.is_empty() {
        return Ok(eligible_assets(item, exclude));
    }

    requested
        .iter()
        .map(|name| {
            let asset = item.asset(name).ok_or_else(|| TileError::UnknownAsset {
                asset: name.clone(),
            })?;
            if !asset.is_raster() || exclude.contains(&asset.name) {
                return Err(TileError::IneligibleAsset {
                    asset: name.clone(),
                    media_type: asset
                        .media_type
                        .clone()
                        .unwrap_or_else(|| "none".to_string()),
                });
            }
            Ok(asset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;

    const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";

    fn item() -> StacItem {
        StacItem {
            id: "item".to_string(),
            bbox: BoundingBox::new(-10.0, -10.0, 10.0, 10.0),
            assets: vec![
                AssetDescriptor::new("thumbnail", "thumb.png", Some("image/png")),
                AssetDescriptor::new("B04", "B04.tif", Some(COG)),
                AssetDescriptor::new("B03", "B03.tif", Some(COG)),
                AssetDescriptor::new("overview", "overview.tif", Some("image/tiff")),
                AssetDescriptor::new("untyped", "untyped.tif", None),
            ],
        }
    }

    fn names(assets: &[&AssetDescriptor]) -> Vec<String> {
        assets.iter().map(|a| a.name.clone()).collect()
    }

    #[test]
    fn test_eligible_filters_type_and_exclusions() {
        let item = item();
        assert_eq!(
            names(&eligible_assets(&item, &[])),
            vec!["B04", "B03", "overview"]
        );
        assert_eq!(
            names(&eligible_assets(&item, &["overview".to_string()])),
            vec!["B04", "B03"]
        );
    }

    #[test]
    fn test_empty_request_equals_eligible() {
        let item = item();
        let exclusion_sets: [Vec<String>; 3] = [
            vec![],
            vec!["B04".to_string()],
            vec!["B04".to_string(), "B03".to_string(), "thumbnail".to_string()],
        ];
        for exclude in exclusion_sets {
            assert_eq!(
                resolve(&item, &[], &exclude).unwrap(),
                eligible_assets(&item, &exclude)
            );
        }
    }

    #[test]
    fn test_requested_order_is_kept() {
        let item = item();
        let requested = vec!["B03".to_string(), "B04".to_string()];
        assert_eq!(
            names(&resolve(&item, &requested, &[]).unwrap()),
            vec!["B03", "B04"]
        );
    }

    #[test]
    fn test_unknown_and_ineligible_assets() {
        let item = item();
        match resolve(&item, &["B08".to_string()], &[]) {
            Err(TileError::UnknownAsset { asset }) => assert_eq!(asset, "B08"),
            other => panic!("expected UnknownAsset, got {other:?}"),
        }
        match resolve(&item, &["thumbnail".to_string()], &[]) {
            Err(TileError::IneligibleAsset { asset, media_type }) => {
                assert_eq!(asset, "thumbnail");
                assert_eq!(media_type, "image/png");
            }
            other => panic!("expected IneligibleAsset, got {other:?}"),
        }
        assert!(matches!(
            resolve(&item, &["B04".to_string()], &["B04".to_string()]),
            Err(TileError::IneligibleAsset { .. })
        ));
        assert!(matches!(
            resolve(&item, &["untyped".to_string()], &[]),
            Err(TileError::IneligibleAsset { .. })
        ));
    }
}
