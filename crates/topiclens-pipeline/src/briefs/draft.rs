//! The structured answer expected from the LLM.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use topiclens_ai::ProviderError;
use topiclens_core::Category;

const MAX_TITLE_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WhyNow {
    pub reason: String,
    pub trend: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BriefDraft {
    pub category: Category,
    pub topic_title: String,
    pub primary_question: String,
    pub related_questions: Vec<String>,
    pub blog_angle: Option<String>,
    pub social_angle: Option<String>,
    pub why_now: Option<WhyNow>,
    pub evidence_summary: Option<String>,
}

impl BriefDraft {
    /// Parse and validate raw LLM output.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] if the JSON does not match the
    /// schema (an unknown category included) or a field is out of bounds.
    pub fn parse(raw: &str) -> Result<Self, ProviderError> {
        let draft: Self = serde_json::from_str(raw)
            .map_err(|e| ProviderError::Validation(format!("brief does not match schema: {e}")))?;
        draft.validate()?;
        Ok(draft)
    }

    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] for an empty or over-long title,
    /// or an empty primary question.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let title = self.topic_title.trim();
        if title.is_empty() {
            return Err(ProviderError::Validation("topic_title is empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ProviderError::Validation(format!(
                "topic_title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.primary_question.trim().is_empty() {
            return Err(ProviderError::Validation(
                "primary_question is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use topiclens_ai::StructuredOutput;

    use super::*;

    fn valid() -> serde_json::Value {
        json!({
            "category": "REFRIGERATOR_ORGANIZATION",
            "topic_title": "Keeping herbs fresh in the fridge",
            "primary_question": "How do I stop herbs wilting?",
            "related_questions": ["Should herbs go in water?"],
            "blog_angle": "A week-long herb storage test",
            "social_angle": null,
            "why_now": {"reason": "Spring herbs are in season", "trend": "rising"},
            "evidence_summary": null
        })
    }

    #[test]
    fn parses_valid_draft() {
        let draft = BriefDraft::parse(&valid().to_string()).unwrap();
        assert_eq!(draft.category, Category::RefrigeratorOrganization);
        assert_eq!(draft.related_questions.len(), 1);
        assert_eq!(draft.why_now.unwrap().trend.as_deref(), Some("rising"));
    }

    #[test]
    fn unknown_category_is_a_validation_error() {
        let mut value = valid();
        value["category"] = json!("INVALID_CATEGORY");
        let err = BriefDraft::parse(&value.to_string()).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn missing_related_questions_is_rejected() {
        let mut value = valid();
        value.as_object_mut().unwrap().remove("related_questions");
        let err = BriefDraft::parse(&value.to_string()).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn empty_related_questions_are_accepted() {
        let mut value = valid();
        value["related_questions"] = json!([]);
        let draft = BriefDraft::parse(&value.to_string()).unwrap();
        assert!(draft.related_questions.is_empty());
    }

    #[test]
    fn title_bounds_are_enforced() {
        let mut value = valid();
        value["topic_title"] = json!("   ");
        assert!(BriefDraft::parse(&value.to_string()).is_err());

        value["topic_title"] = json!("x".repeat(501));
        assert!(BriefDraft::parse(&value.to_string()).is_err());

        value["topic_title"] = json!("x".repeat(500));
        assert!(BriefDraft::parse(&value.to_string()).is_ok());
    }

    #[test]
    fn empty_primary_question_is_rejected() {
        let mut value = valid();
        value["primary_question"] = json!("");
        assert!(matches!(
            BriefDraft::parse(&value.to_string()),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn non_json_is_a_validation_error() {
        assert!(matches!(
            BriefDraft::parse("not json"),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn schema_lists_closed_category_set() {
        let schema = BriefDraft::openai_schema().to_string();
        for category in Category::ALL {
            assert!(schema.contains(category.as_str()));
        }
    }
}
