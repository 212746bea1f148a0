//! Query classification
//!
//! Maps free query text onto a [`QueryType`] using keyword heuristics, and
//! extracts the keyword terms used to filter each layer.

use strata_domain::QueryType;

// Checked in order; safety-critical types first.
const KEYWORDS: &[(QueryType, &[&str])] = &[
    (
        QueryType::DrugInteraction,
        &["interaction", "interact", "taken with", "take with", "together with", "combine", "mixing"],
    ),
    (
        QueryType::Contraindication,
        &["contraindicat", "should not take", "safe to take", "safe during", "avoid", "allergic"],
    ),
    (
        QueryType::SymptomInterpretation,
        &["symptom", "i feel", "i have", "pain", "ache", "fever", "dizzy", "nausea", "rash"],
    ),
    (
        QueryType::TreatmentRecommendation,
        &["treat", "therapy", "cure", "manage", "recommend", "medication for"],
    ),
    (
        QueryType::DiseaseInformation,
        &["what is", "what are", "disease", "disorder", "syndrome", "causes of", "define"],
    ),
    (
        QueryType::DataCatalog,
        &["dataset", "data set", "catalog", "table", "column", "schema", "list all"],
    ),
];

/// Classify query text by keyword
///
/// # Examples
///
/// ```
/// use strata_router::{classify_heuristic, QueryType};
///
/// assert_eq!(classify_heuristic("What is Diabetes?"), QueryType::DiseaseInformation);
/// assert_eq!(classify_heuristic("Can I take aspirin with warfarin? Any interaction?"), QueryType::DrugInteraction);
/// assert_eq!(classify_heuristic("hello"), QueryType::General);
/// ```
pub fn classify_heuristic(text: &str) -> QueryType {
    let normalised = normalise(text);
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| normalised.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(QueryType::General)
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "an", "and", "any", "are", "as", "at", "be", "between", "by", "can",
    "could", "do", "does", "for", "from", "how", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "of", "on", "or", "should", "tell", "than", "that", "the", "their", "there", "these",
    "this", "to", "was", "what", "when", "which", "who", "why", "will", "with", "would", "you",
];

/// Lowercase keyword terms with stopwords and single characters removed
///
/// Order is preserved and duplicates dropped.
///
/// ```
/// use strata_router::extract_terms;
///
/// assert_eq!(extract_terms("What is Diabetes?"), vec!["diabetes"]);
/// ```
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-').to_lowercase())
    {
        if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Lowercase and collapse runs of whitespace to single spaces
pub fn normalise(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_types() {
        let cases = [
            ("Does ibuprofen interact with lisinopril?", QueryType::DrugInteraction),
            ("Is it safe to take aspirin when pregnant?", QueryType::Contraindication),
            ("I have a headache and fever", QueryType::SymptomInterpretation),
            ("How do you treat hypertension?", QueryType::TreatmentRecommendation),
            ("What is Diabetes?", QueryType::DiseaseInformation),
            ("Which dataset has the admissions table?", QueryType::DataCatalog),
            ("Metformin", QueryType::General),
        ];
        for (text, expected) in cases {
            assert_eq!(classify_heuristic(text), expected, "{}", text);
        }
    }

    #[test]
    fn test_interaction_beats_disease_wording() {
        assert_eq!(
            classify_heuristic("What is the interaction between warfarin and aspirin?"),
            QueryType::DrugInteraction
        );
    }

    #[test]
    fn test_extract_terms() {
        assert_eq!(
            extract_terms("Does  Ibuprofen interact with ibuprofen and beta-blockers?"),
            vec!["ibuprofen", "interact", "beta-blockers"]
        );
        assert!(extract_terms("what is it?").is_empty());
    }

    #[test]
    fn test_normalise() {
        assert_eq!(normalise("  What   IS\tDiabetes? "), "what is diabetes?");
    }
}
