//! Contract with the browser-side questionnaire form widget.
//!
//! The widget is third-party JavaScript. The client only needs three things from it: which
//! assets to load, how to mount a template into a container, and an expression that yields
//! the completed QuestionnaireResponse when the user asks for it.

use crate::SmartResult;
use fhir::QuestionnaireTemplate;

/// Stylesheets and scripts to include, in load order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormAssets {
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

pub trait FormRenderer: Send + Sync {
    fn assets(&self) -> FormAssets;

    /// JavaScript statement rendering `template` into the element with id `container_id`.
    fn mount_script(&self, template: &QuestionnaireTemplate, container_id: &str) -> SmartResult<String>;

    /// JavaScript expression evaluating to the completed QuestionnaireResponse object.
    fn extract_expression(&self) -> &'static str;
}

/// NLM LHC-Forms web component.
#[derive(Clone, Debug)]
pub struct LhcForms {
    base_url: String,
}

impl LhcForms {
    pub const DEFAULT_BASE_URL: &'static str =
        "https://lhcforms-static.nlm.nih.gov/lforms-versions/34.0.0";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for LhcForms {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

impl FormRenderer for LhcForms {
    fn assets(&self) -> FormAssets {
        let base = &self.base_url;
        FormAssets {
            stylesheets: vec![format!("{base}/webcomponent/styles.css")],
            scripts: vec![
                format!("{base}/webcomponent/assets/lib/zone.min.js"),
                format!("{base}/webcomponent/lhc-forms.js"),
                format!("{base}/fhir/R4/lformsFHIR.min.js"),
            ],
        }
    }

    fn mount_script(&self, template: &QuestionnaireTemplate, container_id: &str) -> SmartResult<String> {
        let template = script_safe_json(&serde_json::to_string(template.as_value())?);
        let container = script_safe_json(&serde_json::to_string(container_id)?);
        Ok(format!(
            "LForms.Util.addFormToPage({template}, {container});"
        ))
    }

    fn extract_expression(&self) -> &'static str {
        "LForms.Util.getFormFHIRData('QuestionnaireResponse', 'R4')"
    }
}

/// Escape JSON for inclusion inside an HTML `<script>` element.
///
/// `<` only occurs inside JSON strings, where `\u003c` is an equivalent escape, so
/// `</script>` in content cannot close the element.
fn script_safe_json(json: &str) -> String {
    json.replace('<', "\\u003c")
}
