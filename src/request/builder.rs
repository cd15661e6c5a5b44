//! Build the export request for one point.
//!
//! The per-point graph is:
//!
//! ```text
//! ImageCollection.load(id)
//!   -> filter(intersects region) -> filter(date range) [-> tile / orbit filters]
//!   -> map(index calculator, optionally masking each scene first)
//!   -> map(image => Feature(null, reduceRegion(mean, region, scale))
//!                      .set("system:time_start", image.get("system:time_start")))
//! ```
//!
//! Only the region changes between points.

use crate::config::{Config, ExportConfig, QueryConfig};
use crate::expr::{IndexCalculator, Node, SpectralIndices};
use crate::geometry::BufferedPoint;
use crate::table::PointRecord;
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;

const SAMPLE_ARGUMENT: &str = "_MAPPING_VAR_1_0";

/// Scene acquisition time, milliseconds since the epoch.
const TIME_PROPERTY: &str = "system:time_start";

/// Date-bounded, region-bounded scene query.
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub collection_id: String,
    pub region: BufferedPoint,
    pub start_date: String,
    pub end_date: String,
    pub tiles: Option<Vec<String>>,
    pub orbits: Option<Vec<u32>>,
}

impl CollectionQuery {
    /// Server-side image collection matching the query.
    pub fn to_node(&self) -> Node {
        let mut collection = Node::call(
            "ImageCollection.load",
            [("id", Node::constant(self.collection_id.as_str()))],
        );

        collection = filter(
            collection,
            Node::call(
                "Filter.intersects",
                [
                    ("leftField", Node::constant(".geo")),
                    ("rightValue", self.region.to_node()),
                ],
            ),
        );

        let range = Node::call(
            "DateRange",
            [
                ("start", date(&self.start_date)),
                ("end", date(&self.end_date)),
            ],
        );
        collection = filter(
            collection,
            Node::call(
                "Filter.dateRangeContains",
                [
                    ("leftValue", range),
                    ("rightField", Node::constant(TIME_PROPERTY)),
                ],
            ),
        );

        if let Some(tiles) = &self.tiles {
            collection = filter(collection, in_list("MGRS_TILE", json!(tiles)));
        }
        if let Some(orbits) = &self.orbits {
            collection = filter(collection, in_list("SENSING_ORBIT_NUMBER", json!(orbits)));
        }

        collection
    }
}

fn filter(collection: Node, condition: Node) -> Node {
    Node::call("Collection.filter", [("collection", collection), ("filter", condition)])
}

fn date(value: &str) -> Node {
    Node::call("Date", [("value", Node::constant(value))])
}

fn in_list(field: &str, values: serde_json::Value) -> Node {
    Node::call(
        "Filter.inList",
        [
            ("leftField", Node::constant(field)),
            ("rightValue", Node::constant(values)),
        ],
    )
}

/// Everything needed to start one table export.
#[derive(Debug, Clone)]
pub struct ExportDescriptor {
    /// Point this export belongs to
    pub point_index: i64,

    /// Feature collection to export, one feature per scene
    pub collection: Node,

    /// Columns written to the CSV
    pub selectors: Vec<String>,

    /// Region sampled in every scene
    pub region: BufferedPoint,

    /// Sampling scale in meters
    pub scale: f64,

    pub file_format: String,
    pub file_name_prefix: String,
    pub folder: String,

    /// Task description shown in the task list
    pub description: String,
}

/// Builds per-point export descriptors. Performs no I/O.
pub struct RequestBuilder {
    query: QueryConfig,
    export: ExportConfig,
    calculator: Arc<dyn IndexCalculator>,
}

impl RequestBuilder {
    /// Builder using the configured spectral index definitions.
    pub fn new(config: &Config) -> Result<Self> {
        let indices = SpectralIndices::new(&config.indices, &config.export.selectors)
            .context("Failed to compile spectral index definitions")?
            .with_mask(config.query.mask.clone());
        tracing::debug!("Index source bands: {:?}", indices.source_bands());
        Ok(Self::with_calculator(config, Arc::new(indices)))
    }

    /// Builder with a custom index calculator.
    pub fn with_calculator(config: &Config, calculator: Arc<dyn IndexCalculator>) -> Self {
        Self {
            query: config.query.clone(),
            export: config.export.clone(),
            calculator,
        }
    }

    /// Output file name for a point, e.g. `time_series_point_7`.
    pub fn file_name(&self, point_index: i64) -> String {
        format!("{}{}", self.export.file_name_prefix, point_index)
    }

    /// Build the export descriptor for one point.
    pub fn build(&self, point: &PointRecord) -> Result<ExportDescriptor> {
        let region = BufferedPoint::new(
            point.latitude,
            point.longitude,
            self.query.buffer_radius_m,
            self.query.buffer_max_error_m,
        )
        .with_context(|| format!("Invalid geometry for point {}", point.index))?;

        let query = CollectionQuery {
            collection_id: self.query.collection.clone(),
            region,
            start_date: self.query.start_date.clone(),
            end_date: self.query.end_date.clone(),
            tiles: self.query.tiles.clone(),
            orbits: self.query.orbits.clone(),
        };

        let indexed = Node::call(
            "Collection.map",
            [
                ("collection", query.to_node()),
                ("baseAlgorithm", self.calculator.map_function()),
            ],
        );
        let collection = Node::call(
            "Collection.map",
            [
                ("collection", indexed),
                ("baseAlgorithm", self.sample_function(&region)),
            ],
        );

        let file_name = self.file_name(point.index);

        Ok(ExportDescriptor {
            point_index: point.index,
            collection,
            selectors: self.calculator.band_names(),
            region,
            scale: self.export.scale,
            file_format: self.export.file_format.clone(),
            file_name_prefix: file_name.clone(),
            folder: self.export.folder.clone(),
            description: file_name,
        })
    }

    /// Reduce each scene over the region to a single feature stamped with
    /// the scene's acquisition time.
    fn sample_function(&self, region: &BufferedPoint) -> Node {
        let region = region.to_node();
        let scale = self.export.scale;
        Node::lambda(SAMPLE_ARGUMENT, |image| {
            let acquired = Node::call(
                "Element.get",
                [
                    ("object", image.clone()),
                    ("property", Node::constant(TIME_PROPERTY)),
                ],
            );
            let reduced = Node::call(
                "Image.reduceRegion",
                [
                    ("image", image),
                    ("reducer", Node::call_no_args("Reducer.mean")),
                    ("geometry", region),
                    ("scale", Node::constant(json!(scale))),
                ],
            );
            let feature = Node::call(
                "Feature",
                [("geometry", Node::constant(serde_json::Value::Null)), ("metadata", reduced)],
            );
            Node::call(
                "Element.set",
                [
                    ("object", feature),
                    ("key", Node::constant(TIME_PROPERTY)),
                    ("value", acquired),
                ],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_config, QualityMask};
    use crate::expr::Expression;

    fn point(index: i64, latitude: f64, longitude: f64) -> PointRecord {
        PointRecord { index, latitude, longitude }
    }

    fn builder() -> RequestBuilder {
        RequestBuilder::new(&test_config("points.tsv")).unwrap()
    }

    #[test]
    fn test_file_name() {
        let builder = builder();
        assert_eq!(builder.file_name(7), "time_series_point_7");
        let descriptor = builder.build(&point(7, 42.0, -1.0)).unwrap();
        assert_eq!(descriptor.file_name_prefix, "time_series_point_7");
        assert_eq!(descriptor.description, "time_series_point_7");
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = builder().build(&point(1, 42.0, -1.0)).unwrap();
        assert_eq!(descriptor.selectors, vec!["NDVI", "AR", "AS1"]);
        assert_eq!(descriptor.scale, 10.0);
        assert_eq!(descriptor.file_format, "CSV");
        assert_eq!(descriptor.folder, "EarthEngineExports");
        assert_eq!(descriptor.region.radius_m, 50.0);
        assert_eq!(descriptor.region.max_error_m, 0.0);
    }

    #[test]
    fn test_invalid_coordinates_fail() {
        let err = builder().build(&point(3, 120.0, 0.0)).unwrap_err();
        assert!(format!("{:#}", err).contains("point 3"));
    }

    #[test]
    fn test_undefined_index_fails_construction() {
        let config = Config::with_input("points.tsv");
        assert!(RequestBuilder::new(&config).is_err());
    }

    #[test]
    fn test_collection_shape() {
        let descriptor = builder().build(&point(1, 42.0, -1.0)).unwrap();

        let sampled = &descriptor.collection;
        assert_eq!(sampled.function_name(), Some("Collection.map"));
        let indexed = sampled.arg("collection").unwrap();
        assert_eq!(indexed.function_name(), Some("Collection.map"));

        let by_date = indexed.arg("collection").unwrap();
        assert_eq!(by_date.arg("filter").unwrap().function_name(), Some("Filter.dateRangeContains"));
        let by_region = by_date.arg("collection").unwrap();
        assert_eq!(by_region.arg("filter").unwrap().function_name(), Some("Filter.intersects"));
        let load = by_region.arg("collection").unwrap();
        assert_eq!(load.function_name(), Some("ImageCollection.load"));
        assert_eq!(load.arg("id"), Some(&Node::constant("COPERNICUS/S2_SR_HARMONIZED")));
    }

    #[test]
    fn test_date_window() {
        let descriptor = builder().build(&point(1, 42.0, -1.0)).unwrap();
        let text = serde_json::to_string(&Expression::encode(&descriptor.collection)).unwrap();
        assert!(text.contains("\"2017-01-01\""));
        assert!(text.contains("\"2024-12-31\""));
        assert!(!text.contains("MGRS_TILE"));
    }

    #[test]
    fn test_tile_and_orbit_filters() {
        let mut config = test_config("points.tsv");
        config.query.tiles = Some(vec!["30TWN".to_string()]);
        config.query.orbits = Some(vec![51]);
        let descriptor = RequestBuilder::new(&config).unwrap().build(&point(1, 42.0, -1.0)).unwrap();

        let indexed = descriptor.collection.arg("collection").unwrap();
        let by_orbit = indexed.arg("collection").unwrap();
        let orbit_filter = by_orbit.arg("filter").unwrap();
        assert_eq!(orbit_filter.function_name(), Some("Filter.inList"));
        assert_eq!(orbit_filter.arg("rightValue"), Some(&Node::constant(json!([51]))));
        let by_tile = by_orbit.arg("collection").unwrap();
        assert_eq!(by_tile.arg("filter").unwrap().arg("leftField"), Some(&Node::constant("MGRS_TILE")));
    }

    #[test]
    fn test_only_region_varies() {
        let builder = builder();
        let a = builder.build(&point(1, 42.0, -1.0)).unwrap();
        let b = builder.build(&point(1, 43.0, -2.0)).unwrap();
        assert_ne!(a.collection, b.collection);

        let c = builder.build(&point(2, 42.0, -1.0)).unwrap();
        assert_eq!(a.collection, c.collection);
        assert_ne!(a.file_name_prefix, c.file_name_prefix);
    }

    #[test]
    fn test_features_carry_acquisition_time() {
        let descriptor = builder().build(&point(1, 42.0, -1.0)).unwrap();
        let Some(Node::Function { argument_names, body }) = descriptor.collection.arg("baseAlgorithm") else {
            panic!("expected a sampling function");
        };
        assert_eq!(argument_names, &vec![SAMPLE_ARGUMENT.to_string()]);

        assert_eq!(body.function_name(), Some("Element.set"));
        assert_eq!(body.arg("key"), Some(&Node::constant("system:time_start")));
        let value = body.arg("value").unwrap();
        assert_eq!(value.function_name(), Some("Element.get"));
        assert_eq!(value.arg("object"), Some(&Node::argument(SAMPLE_ARGUMENT)));
        assert_eq!(value.arg("property"), Some(&Node::constant("system:time_start")));

        let feature = body.arg("object").unwrap();
        assert_eq!(feature.function_name(), Some("Feature"));
        assert_eq!(feature.arg("metadata").unwrap().function_name(), Some("Image.reduceRegion"));
    }

    #[test]
    fn test_quality_mask_is_opt_in() {
        let descriptor = builder().build(&point(1, 42.0, -1.0)).unwrap();
        let text = serde_json::to_string(&Expression::encode(&descriptor.collection)).unwrap();
        assert!(!text.contains("Image.updateMask"));

        let mut config = test_config("points.tsv");
        config.query.mask = Some(QualityMask { band: "SCL".to_string(), exclude: vec![3, 8, 9, 10] });
        let descriptor = RequestBuilder::new(&config).unwrap().build(&point(1, 42.0, -1.0)).unwrap();
        let text = serde_json::to_string(&Expression::encode(&descriptor.collection)).unwrap();
        assert!(text.contains("Image.updateMask"));
        assert!(text.contains("\"SCL\""));
    }
}
