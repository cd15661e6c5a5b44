//! Spectral index computation applied to every scene.

use super::band_math::BandExpr;
use super::Node;
use crate::config::{IndexDefinition, QualityMask};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeMap;

/// Argument name of the per-scene mapping function.
pub const SCENE_ARGUMENT: &str = "_MAPPING_VAR_0_0";

/// Derives output bands from one scene.
pub trait IndexCalculator: Send + Sync {
    /// Bands present on the mapped scene, in output order.
    fn band_names(&self) -> Vec<String>;

    /// Compute the bands for `image`, returning a scene with only those bands.
    fn compute(&self, image: Node) -> Node;

    /// `compute` wrapped as a function suitable for `Collection.map`.
    fn map_function(&self) -> Node {
        Node::lambda(SCENE_ARGUMENT, |image| self.compute(image))
    }
}

/// Compiled form of one index definition.
#[derive(Debug, Clone)]
enum Formula {
    NormalizedDifference([String; 2]),
    Expression(BandExpr),
}

/// Index calculator built from configured definitions.
#[derive(Debug, Clone)]
pub struct SpectralIndices {
    formulas: Vec<(String, Formula)>,
    mask: Option<QualityMask>,
}

impl SpectralIndices {
    /// Compile the definitions for `selectors`, in selector order.
    pub fn new(definitions: &BTreeMap<String, IndexDefinition>, selectors: &[String]) -> Result<Self> {
        let mut formulas = Vec::with_capacity(selectors.len());
        for name in selectors {
            let definition = definitions
                .get(name)
                .with_context(|| format!("No index definition for band '{}'", name))?;
            let formula = match definition {
                IndexDefinition::NormalizedDifference { bands } => Formula::NormalizedDifference(bands.clone()),
                IndexDefinition::Expression { expression } => Formula::Expression(
                    BandExpr::parse(expression).with_context(|| format!("Invalid expression for index '{}'", name))?,
                ),
            };
            formulas.push((name.clone(), formula));
        }
        Ok(Self { formulas, mask: None })
    }

    /// Mask each scene before the index bands are computed.
    pub fn with_mask(mut self, mask: Option<QualityMask>) -> Self {
        self.mask = mask;
        self
    }

    /// Source bands every formula reads, in first-use order.
    pub fn source_bands(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, formula) in &self.formulas {
            let bands = match formula {
                Formula::NormalizedDifference(bands) => bands.to_vec(),
                Formula::Expression(expr) => expr.bands(),
            };
            for band in bands {
                if !out.contains(&band) {
                    out.push(band);
                }
            }
        }
        out
    }

    /// `Image.updateMask(image, classes not in exclude)`.
    fn apply_mask(image: Node, mask: &QualityMask) -> Node {
        let classes = Node::call(
            "Image.select",
            [
                ("input", image.clone()),
                ("bandSelectors", Node::constant(json!([mask.band]))),
            ],
        );
        let keep = mask
            .exclude
            .iter()
            .map(|value| {
                Node::call(
                    "Image.neq",
                    [
                        ("image1", classes.clone()),
                        ("image2", Node::call("Image.constant", [("value", Node::constant(json!(value)))])),
                    ],
                )
            })
            .reduce(|acc, next| Node::call("Image.and", [("image1", acc), ("image2", next)]));

        match keep {
            Some(keep) => Node::call("Image.updateMask", [("image", image), ("mask", keep)]),
            None => image,
        }
    }

    fn compute_one(name: &str, formula: &Formula, image: &Node) -> Node {
        let computed = match formula {
            Formula::NormalizedDifference(bands) => Node::call(
                "Image.normalizedDifference",
                [
                    ("input", image.clone()),
                    ("bandNames", Node::constant(json!(bands))),
                ],
            ),
            Formula::Expression(expr) => expr.compile(image),
        };
        Node::call(
            "Image.rename",
            [("input", computed), ("names", Node::constant(json!([name])))],
        )
    }
}

impl IndexCalculator for SpectralIndices {
    fn band_names(&self) -> Vec<String> {
        self.formulas.iter().map(|(name, _)| name.clone()).collect()
    }

    fn compute(&self, image: Node) -> Node {
        let image = match &self.mask {
            Some(mask) => Self::apply_mask(image, mask),
            None => image,
        };
        let with_indices = self.formulas.iter().fold(image.clone(), |acc, (name, formula)| {
            Node::call(
                "Image.addBands",
                [
                    ("dstImg", acc),
                    ("srcImg", Self::compute_one(name, formula, &image)),
                ],
            )
        });

        Node::call(
            "Image.select",
            [
                ("input", with_indices),
                ("bandSelectors", Node::constant(json!(self.band_names()))),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> BTreeMap<String, IndexDefinition> {
        crate::config::test_config("points.tsv").indices
    }

    fn selectors() -> Vec<String> {
        vec!["NDVI".to_string(), "AR".to_string(), "AS1".to_string()]
    }

    #[test]
    fn test_band_names_follow_selectors() {
        let indices = SpectralIndices::new(&definitions(), &selectors()).unwrap();
        assert_eq!(indices.band_names(), selectors());
        assert_eq!(indices.source_bands(), vec!["B8", "B4", "B11"]);
    }

    #[test]
    fn test_undefined_selector() {
        let err = SpectralIndices::new(&definitions(), &["NDWI".to_string()]).unwrap_err();
        assert!(err.to_string().contains("NDWI"));
    }

    #[test]
    fn test_invalid_expression_names_index() {
        let mut defs = definitions();
        defs.insert("AR".to_string(), IndexDefinition::Expression { expression: "B11 /".to_string() });
        let err = SpectralIndices::new(&defs, &selectors()).unwrap_err();
        assert!(err.to_string().contains("AR"));
    }

    #[test]
    fn test_compute_selects_only_index_bands() {
        let indices = SpectralIndices::new(&definitions(), &selectors()).unwrap();
        let node = indices.compute(Node::argument("img"));

        assert_eq!(node.function_name(), Some("Image.select"));
        assert_eq!(node.arg("bandSelectors"), Some(&Node::constant(json!(["NDVI", "AR", "AS1"]))));

        // Outermost addBands appends the last selector.
        let add = node.arg("input").unwrap();
        assert_eq!(add.function_name(), Some("Image.addBands"));
        let renamed = add.arg("srcImg").unwrap();
        assert_eq!(renamed.arg("names"), Some(&Node::constant(json!(["AS1"]))));
    }

    #[test]
    fn test_normalized_difference() {
        let indices = SpectralIndices::new(&definitions(), &["NDVI".to_string()]).unwrap();
        let node = indices.compute(Node::argument("img"));
        let renamed = node.arg("input").unwrap().arg("srcImg").unwrap();
        let nd = renamed.arg("input").unwrap();
        assert_eq!(nd.function_name(), Some("Image.normalizedDifference"));
        assert_eq!(nd.arg("bandNames"), Some(&Node::constant(json!(["B8", "B4"]))));
    }

    #[test]
    fn test_map_function_references_scene_argument() {
        let indices = SpectralIndices::new(&definitions(), &["NDVI".to_string()]).unwrap();
        let Node::Function { argument_names, body } = indices.map_function() else {
            panic!("expected a function");
        };
        assert_eq!(argument_names, vec![SCENE_ARGUMENT]);
        let add = body.arg("input").unwrap();
        assert_eq!(add.arg("dstImg"), Some(&Node::argument(SCENE_ARGUMENT)));
    }

    #[test]
    fn test_quality_mask_applied_before_indices() {
        let mask = QualityMask { band: "SCL".to_string(), exclude: vec![3, 8, 9] };
        let indices = SpectralIndices::new(&definitions(), &["NDVI".to_string()])
            .unwrap()
            .with_mask(Some(mask));
        let node = indices.compute(Node::argument("img"));

        let add = node.arg("input").unwrap();
        let masked = add.arg("dstImg").unwrap();
        assert_eq!(masked.function_name(), Some("Image.updateMask"));
        assert_eq!(masked.arg("image"), Some(&Node::argument("img")));

        // Indices read from the masked scene.
        let nd = add.arg("srcImg").unwrap().arg("input").unwrap();
        assert_eq!(nd.arg("input"), Some(masked));

        // neq(3) and neq(8), then and neq(9)
        let keep = masked.arg("mask").unwrap();
        assert_eq!(keep.function_name(), Some("Image.and"));
        let last = keep.arg("image2").unwrap();
        assert_eq!(last.function_name(), Some("Image.neq"));
        assert_eq!(last.arg("image2").unwrap().arg("value"), Some(&Node::constant(json!(9))));
        let classes = last.arg("image1").unwrap();
        assert_eq!(classes.arg("bandSelectors"), Some(&Node::constant(json!(["SCL"]))));
        assert_eq!(keep.arg("image1").unwrap().function_name(), Some("Image.and"));
    }

    #[test]
    fn test_no_mask_by_default() {
        let indices = SpectralIndices::new(&definitions(), &["NDVI".to_string()]).unwrap();
        let node = indices.compute(Node::argument("img"));
        assert_eq!(node.arg("input").unwrap().arg("dstImg"), Some(&Node::argument("img")));
    }
}
