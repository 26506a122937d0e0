use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::domain::Category;
use crate::ConfigError;

/// Search keywords per brief category, as read from `topics.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicsFile {
    pub topics: BTreeMap<Category, Vec<String>>,
}

impl TopicsFile {
    /// Every keyword paired with its category, in category then file order.
    #[must_use]
    pub fn all_keywords(&self) -> Vec<(Category, &str)> {
        self.topics
            .iter()
            .flat_map(|(category, keywords)| {
                keywords.iter().map(move |k| (*category, k.as_str()))
            })
            .collect()
    }

    /// The first `per_category` keywords of every category.
    #[must_use]
    pub fn sample_keywords(&self, per_category: usize) -> Vec<(Category, &str)> {
        self.topics
            .iter()
            .flat_map(|(category, keywords)| {
                keywords
                    .iter()
                    .take(per_category)
                    .map(move |k| (*category, k.as_str()))
            })
            .collect()
    }
}

/// Load and validate the topic keyword file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_topics(path: &Path) -> Result<TopicsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TopicsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let topics_file: TopicsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::TopicsFileParse)?;

    validate_topics(&topics_file)?;

    Ok(topics_file)
}

fn validate_topics(topics_file: &TopicsFile) -> Result<(), ConfigError> {
    if topics_file.topics.is_empty() {
        return Err(ConfigError::Validation(
            "topics file must list at least one category".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (category, keywords) in &topics_file.topics {
        if keywords.is_empty() {
            return Err(ConfigError::Validation(format!(
                "category {category} has no keywords"
            )));
        }

        for keyword in keywords {
            if keyword.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "category {category} contains an empty keyword"
                )));
            }
            if !seen.insert(keyword.trim().to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate keyword: '{keyword}'"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write yaml");
        file
    }

    #[test]
    fn loads_valid_topics_file() {
        let file = write_yaml(
            "topics:\n  SPRING_RECIPES:\n    - spring recipes\n    - spring cooking\n  REFRIGERATOR_ORGANIZATION:\n    - fridge organization\n",
        );
        let topics = load_topics(file.path()).expect("should load");

        assert_eq!(topics.topics.len(), 2);
        assert_eq!(topics.all_keywords().len(), 3);
        assert_eq!(
            topics.sample_keywords(1),
            vec![
                (Category::SpringRecipes, "spring recipes"),
                (Category::RefrigeratorOrganization, "fridge organization"),
            ]
        );
    }

    #[test]
    fn unknown_category_is_a_parse_error() {
        let file = write_yaml("topics:\n  GARDENING:\n    - tomatoes\n");
        let result = load_topics(file.path());
        assert!(matches!(result, Err(ConfigError::TopicsFileParse(_))));
    }

    #[test]
    fn duplicate_keyword_across_categories_is_rejected() {
        let file = write_yaml(
            "topics:\n  SPRING_RECIPES:\n    - vegetable prep\n  VEGETABLE_PREP_HANDLING:\n    - Vegetable Prep\n",
        );
        let result = load_topics(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn empty_keyword_list_is_rejected() {
        let file = write_yaml("topics:\n  SPRING_RECIPES: []\n");
        assert!(matches!(
            load_topics(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let result = load_topics(Path::new("/nonexistent/topics.yaml"));
        match result {
            Err(ConfigError::TopicsFileIo { path, .. }) => {
                assert!(path.contains("topics.yaml"));
            }
            other => panic!("expected TopicsFileIo, got {other:?}"),
        }
    }

    #[test]
    fn bundled_topics_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/topics.yaml");
        let topics = load_topics(&path).expect("bundled topics.yaml should load");
        assert_eq!(topics.topics.len(), Category::ALL.len());
    }
}
