//! Query types understood by the router and external classifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a query is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Two or more drugs taken together
    DrugInteraction,
    /// Whether something must be avoided
    Contraindication,
    /// What a set of symptoms might mean
    SymptomInterpretation,
    /// How to treat or manage a condition
    TreatmentRecommendation,
    /// What a disease or condition is
    DiseaseInformation,
    /// Questions about datasets and their structure
    DataCatalog,
    /// Anything else
    General,
}

impl QueryType {
    /// All query types
    pub const ALL: [QueryType; 7] = [
        QueryType::DrugInteraction,
        QueryType::Contraindication,
        QueryType::SymptomInterpretation,
        QueryType::TreatmentRecommendation,
        QueryType::DiseaseInformation,
        QueryType::DataCatalog,
        QueryType::General,
    ];

    /// Stable name
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::DrugInteraction => "drug_interaction",
            QueryType::Contraindication => "contraindication",
            QueryType::SymptomInterpretation => "symptom_interpretation",
            QueryType::TreatmentRecommendation => "treatment_recommendation",
            QueryType::DiseaseInformation => "disease_information",
            QueryType::DataCatalog => "data_catalog",
            QueryType::General => "general",
        }
    }

    /// Parse a stable name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(s))
    }

    /// Safety-critical types never consult neural sources or the cache
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, QueryType::DrugInteraction | QueryType::Contraindication)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
