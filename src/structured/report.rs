//! Typed analysis report.

use super::error::{ValidationError, ValidationResult};
use super::field::ObjectReader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Confidence assumed when the provider does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub serving_size: Option<String>,
    pub servings_per_container: Option<String>,
}

/// Nutrient values for one portion basis (per serving, per 100 g, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortionInfo {
    pub calories: Option<f64>,
    pub total_fat: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub trans_fat: Option<f64>,
    pub total_carbohydrates: Option<f64>,
    pub fiber: Option<f64>,
    pub total_sugars: Option<f64>,
    pub added_sugars: Option<f64>,
    pub protein: Option<f64>,
    pub sodium: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedAdditives {
    pub sweeteners: Vec<String>,
    pub colorants: Vec<String>,
    pub preservatives: Vec<String>,
    pub flavorings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductClassification {
    /// NOVA group label.
    pub processing_level: String,
    pub food_category: Option<String>,
    pub risk_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralRating {
    pub score: f64,
    pub justification: String,
    pub product_category: Option<String>,
    pub processing_level: Option<String>,
    pub risk_category: Option<String>,
    /// Point-by-point score breakdown, passed through as reported.
    pub score_breakdown: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRating {
    pub score: f64,
    pub justification: String,
    pub recommended_frequency: Option<String>,
    pub suggested_serving_size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionalEvaluation {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub warnings: Vec<String>,
    pub reference_comparison: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub general_consumption: Option<String>,
    pub optimal_frequency: Option<String>,
    pub suggested_alternatives: Vec<String>,
}

/// Validated provider output.
///
/// Built from the provider's JSON with [`AnalysisReport::from_provider_json`],
/// which accepts the English keys and the Spanish keys some prompt versions
/// produce. Serialized form (what is persisted and cached) always uses the
/// English keys and round-trips through serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub product: Option<ProductInfo>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    pub additives: Option<IdentifiedAdditives>,
    #[serde(default)]
    pub nutritional_information: BTreeMap<String, PortionInfo>,
    pub classification: Option<ProductClassification>,
    pub general_rating: Option<GeneralRating>,
    #[serde(default)]
    pub profile_ratings: BTreeMap<String, ProfileRating>,
    pub nutritional_evaluation: Option<NutritionalEvaluation>,
    pub recommendations: Option<Recommendations>,
    pub executive_summary: Option<String>,
    pub confidence_score: f64,
}

impl AnalysisReport {
    pub fn from_provider_json(value: &Value) -> ValidationResult<Self> {
        let root = ObjectReader::root(value)?;

        let product = match root.object(&["product", "producto"])?.into_option() {
            Some(p) => Some(ProductInfo {
                name: p.string(&["name", "nombre"])?.into_option(),
                brand: p.string(&["brand", "marca"])?.into_option(),
                serving_size: p.string(&["serving_size", "tamano_porcion"])?.into_option(),
                servings_per_container: p
                    .string(&["servings_per_container", "porciones_por_envase"])?
                    .into_option(),
            }),
            None => None,
        };

        let additives = match root
            .object(&["additives", "identified_additives", "aditivos_identificados"])?
            .into_option()
        {
            Some(a) => Some(IdentifiedAdditives {
                sweeteners: a.string_list(&["sweeteners", "endulcorantes"])?.unwrap_or_default(),
                colorants: a.string_list(&["colorants", "colorantes"])?.unwrap_or_default(),
                preservatives: a.string_list(&["preservatives", "conservantes"])?.unwrap_or_default(),
                flavorings: a.string_list(&["flavorings", "saborizantes"])?.unwrap_or_default(),
            }),
            None => None,
        };

        let mut nutritional_information = BTreeMap::new();
        if let Some(info) = root
            .object(&["nutritional_information", "informacion_nutricional"])?
            .into_option()
        {
            for (basis, portion) in info.object_entries()? {
                nutritional_information.insert(basis, read_portion(&portion)?);
            }
        }

        let classification = match root
            .object(&["classification", "product_classification", "clasificacion_producto"])?
            .into_option()
        {
            Some(c) => {
                let level = ["processing_level", "nivel_procesamiento"];
                let risk = ["risk_category", "categoria_riesgo"];
                Some(ProductClassification {
                    processing_level: c.string(&level)?.require(&c.path_of(&level))?,
                    food_category: c.string(&["food_category", "categoria_alimento"])?.into_option(),
                    risk_category: c.string(&risk)?.require(&c.path_of(&risk))?,
                })
            }
            None => None,
        };

        let general_rating = match root
            .object(&["general_rating", "calificacion_general"])?
            .into_option()
        {
            Some(g) => {
                let (score, justification) = read_scored(&g)?;
                let breakdown = ["score_breakdown", "desglose_calculo"];
                let score_breakdown = match g.raw(&breakdown).into_option() {
                    Some(v @ Value::Object(_)) => Some(v.clone()),
                    Some(other) => {
                        return Err(ValidationError::malformed(g.path_of(&breakdown), "object", other))
                    }
                    None => None,
                };
                Some(GeneralRating {
                    score,
                    justification,
                    product_category: g.string(&["product_category", "categoria_producto"])?.into_option(),
                    processing_level: g
                        .string(&["processing_level", "nivel_procesamiento"])?
                        .into_option(),
                    risk_category: g.string(&["risk_category", "categoria_riesgo"])?.into_option(),
                    score_breakdown,
                })
            }
            None => None,
        };

        let mut profile_ratings = BTreeMap::new();
        if let Some(ratings) = root
            .object(&["profile_ratings", "calificaciones"])?
            .into_option()
        {
            for (profile, r) in ratings.object_entries()? {
                let (score, justification) = read_scored(&r)?;
                profile_ratings.insert(
                    profile,
                    ProfileRating {
                        score,
                        justification,
                        recommended_frequency: r
                            .string(&["recommended_frequency", "frecuencia_recomendada"])?
                            .into_option(),
                        suggested_serving_size: r
                            .string(&["suggested_serving_size", "tamano_porcion_sugerido"])?
                            .into_option(),
                    },
                );
            }
        }

        let nutritional_evaluation = match root
            .object(&["nutritional_evaluation", "evaluacion_nutricional"])?
            .into_option()
        {
            Some(e) => Some(NutritionalEvaluation {
                strengths: e.string_list(&["strengths", "fortalezas"])?.unwrap_or_default(),
                weaknesses: e.string_list(&["weaknesses", "debilidades"])?.unwrap_or_default(),
                warnings: e.string_list(&["warnings", "advertencias"])?.unwrap_or_default(),
                reference_comparison: e
                    .string(&["reference_comparison", "comparacion_referencia"])?
                    .into_option(),
            }),
            None => None,
        };

        let recommendations = match root
            .object(&["recommendations", "recomendaciones"])?
            .into_option()
        {
            Some(r) => Some(Recommendations {
                general_consumption: r
                    .string(&["general_consumption", "consumo_general"])?
                    .into_option(),
                optimal_frequency: r.string(&["optimal_frequency", "frecuencia_optima"])?.into_option(),
                suggested_alternatives: r
                    .string_list(&["suggested_alternatives", "alternativas_sugeridas"])?
                    .unwrap_or_default(),
            }),
            None => None,
        };

        let confidence = ["confidence_score", "puntuacion_confianza"];
        let confidence_score = root.number(&confidence)?.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(ValidationError::new(
                format!("must be within [0, 1], got {}", confidence_score),
                root.path_of(&confidence),
            ));
        }

        Ok(Self {
            product,
            ingredients: root
                .string_list(&["ingredients", "ingredientes"])?
                .unwrap_or_default(),
            allergens: root
                .string_list(&["allergens", "identified_allergens", "alergenos_identificados"])?
                .unwrap_or_default(),
            additives,
            nutritional_information,
            classification,
            general_rating,
            profile_ratings,
            nutritional_evaluation,
            recommendations,
            executive_summary: root
                .string(&["executive_summary", "resumen_ejecutivo"])?
                .into_option(),
            confidence_score,
        })
    }

    pub fn product_name(&self) -> Option<&str> {
        self.product.as_ref().and_then(|p| p.name.as_deref())
    }

    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

fn read_portion(p: &ObjectReader<'_>) -> ValidationResult<PortionInfo> {
    Ok(PortionInfo {
        calories: p.nutrient(&["calories", "calorias"])?.into_option(),
        total_fat: p.nutrient(&["total_fat", "grasas_totales"])?.into_option(),
        saturated_fat: p.nutrient(&["saturated_fat", "grasas_saturadas"])?.into_option(),
        trans_fat: p.nutrient(&["trans_fat", "grasas_trans"])?.into_option(),
        total_carbohydrates: p
            .nutrient(&["total_carbohydrates", "carbohidratos_totales"])?
            .into_option(),
        fiber: p.nutrient(&["fiber", "dietary_fiber", "fibra"])?.into_option(),
        total_sugars: p.nutrient(&["total_sugars", "azucares_totales"])?.into_option(),
        added_sugars: p.nutrient(&["added_sugars", "azucares_anadidos"])?.into_option(),
        protein: p.nutrient(&["protein", "proteina"])?.into_option(),
        sodium: p.nutrient(&["sodium", "sodio"])?.into_option(),
    })
}

/// Required `score` + `justification` pair shared by rating objects.
fn read_scored(r: &ObjectReader<'_>) -> ValidationResult<(f64, String)> {
    let score = ["score", "puntuacion"];
    let justification = ["justification", "justificacion"];
    Ok((
        r.number(&score)?.require(&r.path_of(&score))?,
        r.string(&justification)?.require(&r.path_of(&justification))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> Value {
        json!({
            "product": {"name": "Granola Crunch", "brand": "Acme", "serving_size": "40 g"},
            "ingredients": ["oats", "honey", "almonds"],
            "allergens": ["nuts"],
            "additives": {"sweeteners": [], "colorants": ["E150d"]},
            "nutritional_information": {
                "per_100g": {"calories": 450, "protein": "12 g", "sodium": "350mg", "fiber": "n/a"},
                "per_serving": {"calories": "180 kcal", "total_fat": null}
            },
            "classification": {"processing_level": "NOVA 3", "risk_category": "moderate"},
            "general_rating": {"score": "6.5", "justification": "High sugar", "score_breakdown": {"base_points": 10}},
            "profile_ratings": {"diabetic": {"score": 3, "justification": "Sugar load"}},
            "recommendations": {"suggested_alternatives": ["plain oats"]},
            "executive_summary": "Moderately processed cereal.",
            "confidence_score": 0.82
        })
    }

    #[test]
    fn test_full_payload() {
        let report = AnalysisReport::from_provider_json(&full_payload()).unwrap();
        assert_eq!(report.product_name(), Some("Granola Crunch"));
        assert_eq!(report.ingredients.len(), 3);
        let per_100g = &report.nutritional_information["per_100g"];
        assert_eq!(per_100g.protein, Some(12.0));
        assert_eq!(per_100g.sodium, Some(350.0));
        assert_eq!(per_100g.fiber, None);
        assert_eq!(report.nutritional_information["per_serving"].calories, Some(180.0));
        let rating = report.general_rating.as_ref().unwrap();
        assert_eq!(rating.score, 6.5);
        assert!(rating.score_breakdown.is_some());
        assert_eq!(report.profile_ratings["diabetic"].score, 3.0);
        assert_eq!(report.confidence_score, 0.82);
    }

    #[test]
    fn test_spanish_keys() {
        let payload = json!({
            "producto": {"nombre": "Galletas"},
            "ingredientes": ["harina"],
            "calificacion_general": {"puntuacion": 4, "justificacion": "Ultraprocesado"},
            "resumen_ejecutivo": "Consumo ocasional."
        });
        let report = AnalysisReport::from_provider_json(&payload).unwrap();
        assert_eq!(report.product_name(), Some("Galletas"));
        assert_eq!(report.general_rating.unwrap().justification, "Ultraprocesado");
        assert_eq!(report.confidence_score, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_minimal_payload_defaults() {
        let report = AnalysisReport::from_provider_json(&json!({})).unwrap();
        assert!(report.product.is_none());
        assert!(report.ingredients.is_empty());
        assert_eq!(report.confidence_score, 0.5);
    }

    #[test]
    fn test_missing_required_rating_field() {
        let payload = json!({"general_rating": {"score": 5}});
        let err = AnalysisReport::from_provider_json(&payload).unwrap_err();
        assert_eq!(err.path, "general_rating.justification");
    }

    #[test]
    fn test_null_required_field_rejected() {
        let payload = json!({"general_rating": {"score": null, "justification": "x"}});
        let err = AnalysisReport::from_provider_json(&payload).unwrap_err();
        assert_eq!(err.path, "general_rating.score");
    }

    #[test]
    fn test_malformed_field_rejected() {
        let payload = json!({"ingredients": "oats, honey"});
        let err = AnalysisReport::from_provider_json(&payload).unwrap_err();
        assert_eq!(err.path, "ingredients");
        let converted: crate::Error = err.into();
        assert!(matches!(converted, crate::Error::Validation { .. }));
    }

    #[test]
    fn test_confidence_out_of_range() {
        let err = AnalysisReport::from_provider_json(&json!({"confidence_score": 1.5})).unwrap_err();
        assert_eq!(err.path, "confidence_score");
    }

    #[test]
    fn test_non_object_payload() {
        assert!(AnalysisReport::from_provider_json(&json!("text")).is_err());
    }

    #[test]
    fn test_serialized_form_reloads() {
        let report = AnalysisReport::from_provider_json(&full_payload()).unwrap();
        let stored = report.to_value().unwrap();
        assert_eq!(AnalysisReport::from_value(stored).unwrap(), report);
    }
}
