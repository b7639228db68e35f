//! Questionnaire templates and completed QuestionnaireResponse resources.
//!
//! The form widget owns the structure of both; the client only locates the template inside
//! whatever the server returned and fills in two references on the completed response.

use crate::{FhirError, FhirResult};
use serde_json::{json, Map, Value};

/// A Questionnaire resource ready to hand to the form widget.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionnaireTemplate {
    resource: Value,
}

impl QuestionnaireTemplate {
    /// Locate a Questionnaire in a fetched resource.
    ///
    /// Accepts a Questionnaire directly, or a search Bundle whose first Questionnaire entry is
    /// used. Returns `None` when neither is present.
    pub fn locate(fetched: &Value) -> Option<Self> {
        match fetched.get("resourceType").and_then(Value::as_str) {
            Some("Questionnaire") => Some(Self {
                resource: fetched.clone(),
            }),
            Some("Bundle") => fetched
                .get("entry")
                .and_then(Value::as_array)?
                .iter()
                .filter_map(|entry| entry.get("resource"))
                .find(|r| r.get("resourceType").and_then(Value::as_str) == Some("Questionnaire"))
                .map(|r| Self {
                    resource: r.clone(),
                }),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.resource.get("id").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.resource
            .get("title")
            .or_else(|| self.resource.get("name"))
            .and_then(Value::as_str)
    }

    /// `Questionnaire/{id}`, when the template carries an id.
    pub fn reference(&self) -> Option<String> {
        self.id().map(|id| format!("Questionnaire/{id}"))
    }

    pub fn as_value(&self) -> &Value {
        &self.resource
    }
}

/// A completed QuestionnaireResponse as produced by the form widget.
///
/// The content is opaque; construction only checks that it is a JSON object of the right
/// resource type.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionnaireResponse(Map<String, Value>);

impl QuestionnaireResponse {
    pub const RESOURCE_TYPE: &'static str = "QuestionnaireResponse";

    /// Wrap a widget-produced value.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] for non-objects and
    /// [`FhirError::UnexpectedResourceType`] when `resourceType` names another resource.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        let Value::Object(map) = value else {
            return Err(FhirError::InvalidInput(
                "QuestionnaireResponse must be a JSON object".into(),
            ));
        };

        match map.get("resourceType") {
            None => {}
            Some(Value::String(rt)) if rt == Self::RESOURCE_TYPE => {}
            Some(other) => {
                return Err(FhirError::UnexpectedResourceType {
                    expected: Self::RESOURCE_TYPE.into(),
                    actual: other.as_str().unwrap_or("<non-string>").to_string(),
                })
            }
        }

        Ok(Self(map))
    }

    /// Parse from JSON text, e.g. a file saved from the widget.
    pub fn parse(text: &str) -> FhirResult<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Set `questionnaire` unless the widget already filled it.
    pub fn set_questionnaire_if_absent(&mut self, reference: &str) {
        self.0
            .entry("questionnaire")
            .or_insert_with(|| Value::String(reference.to_string()));
    }

    /// Set `subject` to `Patient/{patient_id}` unless already present.
    pub fn set_subject_if_absent(&mut self, patient_id: &str) {
        self.0
            .entry("subject")
            .or_insert_with(|| json!({ "reference": format!("Patient/{patient_id}") }));
    }

    pub fn questionnaire(&self) -> Option<&str> {
        self.0.get("questionnaire").and_then(Value::as_str)
    }

    pub fn subject_reference(&self) -> Option<&str> {
        self.0
            .get("subject")
            .and_then(|s| s.get("reference"))
            .and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl serde::Serialize for QuestionnaireResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_questionnaire_in_search_bundle() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "OperationOutcome" } },
                { "resource": { "resourceType": "Questionnaire", "id": "q1", "title": "PHQ-2" } }
            ]
        });
        let template = QuestionnaireTemplate::locate(&bundle).expect("template");
        assert_eq!(template.id(), Some("q1"));
        assert_eq!(template.title(), Some("PHQ-2"));
        assert_eq!(template.reference().as_deref(), Some("Questionnaire/q1"));
    }

    #[test]
    fn empty_bundle_has_no_template() {
        let bundle = json!({ "resourceType": "Bundle", "total": 0 });
        assert!(QuestionnaireTemplate::locate(&bundle).is_none());
        assert!(QuestionnaireTemplate::locate(&json!({ "resourceType": "Patient" })).is_none());
    }

    #[test]
    fn response_accepts_missing_resource_type_and_rejects_others() {
        assert!(QuestionnaireResponse::from_value(json!({ "status": "completed" })).is_ok());
        assert!(matches!(
            QuestionnaireResponse::from_value(json!({ "resourceType": "Patient" })),
            Err(FhirError::UnexpectedResourceType { .. })
        ));
        assert!(matches!(
            QuestionnaireResponse::from_value(json!("text")),
            Err(FhirError::InvalidInput(_))
        ));
    }

    #[test]
    fn references_are_only_filled_when_absent() {
        let mut response = QuestionnaireResponse::from_value(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "completed",
            "questionnaire": "Questionnaire/from-widget"
        }))
        .unwrap();

        response.set_questionnaire_if_absent("Questionnaire/other");
        response.set_subject_if_absent("p1");

        assert_eq!(response.questionnaire(), Some("Questionnaire/from-widget"));
        assert_eq!(response.subject_reference(), Some("Patient/p1"));
    }

    #[test]
    fn serializes_content_unchanged() {
        let input = json!({
            "resourceType": "QuestionnaireResponse",
            "item": [{ "linkId": "1", "answer": [{ "valueBoolean": true }] }]
        });
        let response = QuestionnaireResponse::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&response).unwrap(), input);
    }
}
