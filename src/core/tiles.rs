//! Auxiliary-data tile addressing.
//!
//! Maps geographic bounding boxes to the fixed tiling schemes of the two
//! auxiliary datasets: JRC Global Surface Water seasonality (10 degree tiles
//! named by their northwest corner) and CGIAR SRTM v4.1 (5 degree tiles on a
//! numbered grid starting at 180W, 60N). Only identifiers and URLs are
//! produced here; fetching and caching are left to the caller.

use crate::types::BoundingBox;

/// Download root for JRC Global Surface Water seasonality tiles
pub const GSW_SEASONALITY_BASE_URL: &str =
    "https://storage.googleapis.com/global-surface-water/downloads2/seasonality/";

/// Tile addressing for auxiliary rasters
pub struct TileLocator;

impl TileLocator {
    /// Seasonality tile covering the bounding box's northwest corner,
    /// e.g. `seasonality_0E_60N_v1_1.tif`.
    pub fn water_seasonality_tile(bbox: &BoundingBox) -> String {
        let lon = (bbox.left / 10.0).floor() as i32 * 10;
        let lat = ((bbox.top / 10.0).floor() as i32 + 1) * 10;

        let lon_label = if lon >= 0 {
            format!("{}E", lon)
        } else {
            format!("{}W", -lon)
        };
        let lat_label = if lat >= 0 {
            format!("{}N", lat)
        } else {
            format!("{}S", -lat)
        };

        format!("seasonality_{}_{}_v1_1.tif", lon_label, lat_label)
    }

    /// Full download URL for the seasonality tile covering the bounding box
    pub fn water_seasonality_url(bbox: &BoundingBox) -> String {
        format!(
            "{}{}",
            GSW_SEASONALITY_BASE_URL,
            Self::water_seasonality_tile(bbox)
        )
    }

    /// SRTM v4.1 tile identifier for a single point, e.g. `srtm_37_02`
    pub fn srtm_tile(lon: f64, lat: f64) -> String {
        let tile_x = ((lon + 180.0) / 5.0).floor() as i32 + 1;
        let tile_y = ((60.0 - lat) / 5.0).floor() as i32 + 1;
        format!("srtm_{:02}_{:02}", tile_x, tile_y)
    }

    /// All SRTM tiles intersecting the bounding box, row-major from northwest
    pub fn srtm_tiles(bbox: &BoundingBox) -> Vec<String> {
        let x_first = ((bbox.left + 180.0) / 5.0).floor() as i32 + 1;
        let x_last = ((bbox.right + 180.0) / 5.0).floor() as i32 + 1;
        let y_first = ((60.0 - bbox.top) / 5.0).floor() as i32 + 1;
        let y_last = ((60.0 - bbox.bottom) / 5.0).floor() as i32 + 1;

        let mut tiles = Vec::new();
        for y in y_first..=y_last {
            for x in x_first..=x_last {
                tiles.push(format!("srtm_{:02}_{:02}", x, y));
            }
        }
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn netherlands() -> BoundingBox {
        BoundingBox::new(4.5, 51.8, 4.6, 52.0).unwrap()
    }

    #[test]
    fn seasonality_tile_for_western_europe() {
        assert_eq!(
            TileLocator::water_seasonality_tile(&netherlands()),
            "seasonality_0E_60N_v1_1.tif"
        );
    }

    #[test]
    fn seasonality_url_appends_tile_name() {
        let url = TileLocator::water_seasonality_url(&netherlands());
        assert_eq!(
            url,
            "https://storage.googleapis.com/global-surface-water/downloads2/seasonality/seasonality_0E_60N_v1_1.tif"
        );
    }

    #[test]
    fn seasonality_tile_west_of_greenwich() {
        let bbox = BoundingBox::new(-4.5, 50.0, -4.0, 50.5).unwrap();
        assert_eq!(
            TileLocator::water_seasonality_tile(&bbox),
            "seasonality_10W_60N_v1_1.tif"
        );
    }

    #[test]
    fn seasonality_tile_southern_hemisphere() {
        let bbox = BoundingBox::new(30.0, -18.0, 31.0, -15.0).unwrap();
        assert_eq!(
            TileLocator::water_seasonality_tile(&bbox),
            "seasonality_30E_10S_v1_1.tif"
        );
    }

    #[test]
    fn srtm_tile_for_the_netherlands() {
        assert_eq!(TileLocator::srtm_tile(4.5, 52.0), "srtm_37_02");
    }

    #[test]
    fn srtm_tiles_cover_a_spanning_bbox() {
        let bbox = BoundingBox::new(-2.0, 48.0, 3.0, 52.0).unwrap();
        assert_eq!(
            TileLocator::srtm_tiles(&bbox),
            vec!["srtm_36_02", "srtm_37_02", "srtm_36_03", "srtm_37_03"]
        );
    }

    #[test]
    fn srtm_tiles_single_tile_bbox() {
        assert_eq!(TileLocator::srtm_tiles(&netherlands()), vec!["srtm_37_02"]);
    }
}
