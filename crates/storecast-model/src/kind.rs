use serde::{Deserialize, Serialize};

use crate::{
    BoxedRegressor, ModelFactory,
    forest::{ForestParams, RandomForestRegressor},
    linear::{LinearParams, LinearRegression},
};

/// Regression algorithm selection, as read from configuration.
///
/// ```json
/// { "kind": "forest", "trees": 100, "max_depth": 10 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelKind {
    Linear(LinearParams),
    Forest(ForestParams),
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Linear(LinearParams::default())
    }
}

impl ModelFactory for ModelKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::Forest(_) => "forest",
        }
    }

    fn create(&self) -> BoxedRegressor {
        match *self {
            Self::Linear(params) => Box::new(LinearRegression::new(params)),
            Self::Forest(params) => Box::new(RandomForestRegressor::new(params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let kind: ModelKind = serde_json::from_str(r#"{"kind": "forest", "trees": 7}"#).unwrap();
        assert_eq!(
            kind,
            ModelKind::Forest(ForestParams {
                trees: 7,
                ..ForestParams::default()
            })
        );
        assert_eq!(kind.name(), "forest");

        let kind: ModelKind = serde_json::from_str(r#"{"kind": "linear"}"#).unwrap();
        assert_eq!(kind, ModelKind::default());
        assert_eq!(kind.name(), "linear");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(serde_json::from_str::<ModelKind>(r#"{"kind": "xgboost"}"#).is_err());
    }

    #[test]
    fn test_created_models_are_independent() {
        let kind = ModelKind::default();
        let x = crate::Matrix::new(2, 1, vec![0.0, 1.0]).unwrap();
        let mut a = kind.create();
        let b = kind.create();
        a.fit(&x, &[0.0, 1.0]).unwrap();
        assert!(a.predict(&x).is_ok());
        assert!(b.predict(&x).is_err());
    }
}
