use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `doc_type` value shared by embeddings and cluster assignments for Reddit posts.
pub const DOC_TYPE_REDDIT_POST: &str = "reddit_post";

/// Closed set of brief categories the LLM may assign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    SpringRecipes,
    SpringKitchenStyling,
    RefrigeratorOrganization,
    VegetablePrepHandling,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::SpringRecipes,
        Category::SpringKitchenStyling,
        Category::RefrigeratorOrganization,
        Category::VegetablePrepHandling,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::SpringRecipes => "SPRING_RECIPES",
            Category::SpringKitchenStyling => "SPRING_KITCHEN_STYLING",
            Category::RefrigeratorOrganization => "REFRIGERATOR_ORGANIZATION",
            Category::VegetablePrepHandling => "VEGETABLE_PREP_HANDLING",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Trend label derived from the most recent monthly post counts of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendStatus {
    Emerging,
    Competitive,
    Saturated,
    Niche,
}

impl TrendStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TrendStatus::Emerging => "Emerging",
            TrendStatus::Competitive => "Competitive",
            TrendStatus::Saturated => "Saturated",
            TrendStatus::Niche => "Niche",
        }
    }
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stages a pipeline invocation executes; stored as `pipeline_runs.run_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Collect,
    IngestGsc,
    Analyze,
    Label,
    All,
}

impl RunMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Collect => "collect",
            RunMode::IngestGsc => "ingest_gsc",
            RunMode::Analyze => "analyze",
            RunMode::Label => "label",
            RunMode::All => "all",
        }
    }

    /// Whether the Reddit and SERP collectors run in this mode.
    #[must_use]
    pub fn collects(self) -> bool {
        matches!(self, RunMode::Collect | RunMode::All)
    }

    /// Whether preprocessing, embedding, clustering, keywords and timeseries run.
    #[must_use]
    pub fn analyzes(self) -> bool {
        matches!(self, RunMode::Analyze | RunMode::All)
    }

    /// Whether brief generation and scoring run.
    #[must_use]
    pub fn labels(self) -> bool {
        matches!(self, RunMode::Label | RunMode::All)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a `pipeline_runs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_its_wire_name() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn category_rejects_unknown_name() {
        assert!("INVALID_CATEGORY".parse::<Category>().is_err());
    }

    #[test]
    fn category_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Category::RefrigeratorOrganization).unwrap();
        assert_eq!(json, "\"REFRIGERATOR_ORGANIZATION\"");

        let err = serde_json::from_str::<Category>("\"INVALID_CATEGORY\"");
        assert!(err.is_err());
    }

    #[test]
    fn run_mode_stage_selection() {
        assert!(RunMode::All.collects() && RunMode::All.analyzes() && RunMode::All.labels());
        assert!(RunMode::Collect.collects() && !RunMode::Collect.analyzes());
        assert!(RunMode::Label.labels() && !RunMode::Label.analyzes());
        assert!(!RunMode::IngestGsc.collects());
        assert_eq!(RunMode::IngestGsc.as_str(), "ingest_gsc");
    }

    #[test]
    fn run_status_strings_match_schema_values() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Completed.as_str(), "completed");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
    }
}
