use serde::Serialize;
use storecast_table::align::SchemaDiff;

/// Feature columns of both sides after normalization and alignment.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    /// Indicator columns guaranteed on both sides by configuration
    pub required: Vec<String>,
    pub train_features: Vec<String>,
    pub test_features: Vec<String>,
    pub missing_in_test: Vec<String>,
    pub missing_in_train: Vec<String>,
}

impl SchemaReport {
    pub fn new(
        required: Vec<String>,
        train_features: Vec<String>,
        test_features: Vec<String>,
    ) -> Self {
        let SchemaDiff {
            missing_in_test,
            missing_in_train,
        } = SchemaDiff::between(&train_features, &test_features);
        Self {
            required,
            train_features,
            test_features,
            missing_in_test,
            missing_in_train,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.missing_in_test.is_empty() && self.missing_in_train.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let report = SchemaReport::new(vec![], names(&["a", "b"]), names(&["b", "a"]));
        assert!(report.is_aligned());
    }

    #[test]
    fn test_differences_listed() {
        let report = SchemaReport::new(vec![], names(&["a", "b"]), names(&["a", "c"]));
        assert!(!report.is_aligned());
        assert_eq!(report.missing_in_test, ["b"]);
        assert_eq!(report.missing_in_train, ["c"]);
    }
}
