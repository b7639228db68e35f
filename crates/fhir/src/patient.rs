//! Patient summary extracted from a FHIR Patient resource.
//!
//! The Patient resource itself stays opaque JSON; this module only pulls out the handful of
//! fields the view displays. Every field is optional and absent fields produce no line.
//!
//! Responsibilities:
//! - Define a lenient wire model (unknown keys are ignored, everything is optional)
//! - Read each displayed field on its own so one bad field does not hide the rest
//! - Produce labelled display lines in a fixed order

use crate::{FhirError, FhirResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Whether the patient is recorded as deceased.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VitalStatus {
    Alive,
    Dead,
}

impl VitalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalStatus::Alive => "Alive",
            VitalStatus::Dead => "Dead",
        }
    }
}

/// One telecom entry (`system - use value`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactLine {
    pub system: Option<String>,
    pub use_type: Option<String>,
    pub value: Option<String>,
}

impl ContactLine {
    /// Text form, e.g. `phone - home 608-555-5555`.
    pub fn display(&self) -> String {
        let detail = join_present(&[self.use_type.as_deref(), self.value.as_deref()], " ");
        match (&self.system, detail.is_empty()) {
            (Some(system), false) => format!("{system} - {detail}"),
            (Some(system), true) => system.clone(),
            (None, _) => detail,
        }
    }
}

/// One postal address entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressLine {
    pub use_type: Option<String>,
    pub lines: Vec<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub period_start: Option<String>,
}

impl AddressLine {
    /// Street lines joined with `,`, followed by the remaining components joined with `, `.
    pub fn location(&self) -> String {
        let street = if self.lines.is_empty() {
            None
        } else {
            Some(self.lines.join(","))
        };
        join_present(
            &[
                street.as_deref(),
                self.city.as_deref(),
                self.district.as_deref(),
                self.state.as_deref(),
                self.postal_code.as_deref(),
                self.country.as_deref(),
            ],
            ", ",
        )
    }

    /// Text form, e.g. `home - 123 Main St., Madison, Dane, WI, 53703, US From 2019-05-01`.
    pub fn display(&self) -> String {
        let mut out = match &self.use_type {
            Some(use_type) => format!("{use_type} - {}", self.location()),
            None => self.location(),
        };
        if let Some(start) = &self.period_start {
            out.push_str(" From ");
            out.push_str(start);
        }
        out
    }
}

/// A labelled line of the patient view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryLine {
    pub label: &'static str,
    pub value: String,
}

/// The displayable subset of a Patient resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub vital_status: Option<VitalStatus>,
    pub marital_status: Option<String>,
    pub telecom: Vec<ContactLine>,
    pub addresses: Vec<AddressLine>,
    pub language: Option<String>,
    pub general_practitioner: Option<String>,
    pub managing_organization: Option<String>,
    /// Paths of fields that were present but could not be read.
    pub skipped: Vec<String>,
}

impl PatientSummary {
    pub const NAME: &'static str = "Name";
    pub const BIRTH_DATE: &'static str = "Birth Date";
    pub const GENDER: &'static str = "Gender";
    pub const VITAL_STATUS: &'static str = "Vital Status";
    pub const MARITAL_STATUS: &'static str = "Marital Status";
    pub const TELECOM: &'static str = "Telecom";
    pub const ADDRESS: &'static str = "Address";
    pub const LANGUAGE: &'static str = "Language";
    pub const GENERAL_PRACTITIONER: &'static str = "General Practitioner";
    pub const MANAGING_ORGANIZATION: &'static str = "Managing Organization";

    /// Extract a summary from a Patient resource.
    ///
    /// Fields are read one at a time with `serde_path_to_error`. A field (or a single
    /// telecom/address entry) with the wrong JSON type is left out and its path, for example
    /// `telecom[0].value`, is recorded in [`PatientSummary::skipped`]; the remaining fields
    /// are still shown.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - `resource` is not a JSON object,
    /// - `resourceType` is present and is not `Patient`.
    pub fn from_resource(resource: &Value) -> FhirResult<Self> {
        let Value::Object(fields) = resource else {
            return Err(FhirError::InvalidInput(
                "Patient resource must be a JSON object".into(),
            ));
        };

        if let Some(resource_type) = fields.get("resourceType") {
            if resource_type.as_str() != Some("Patient") {
                return Err(FhirError::UnexpectedResourceType {
                    expected: "Patient".into(),
                    actual: resource_type
                        .as_str()
                        .unwrap_or("<non-string>")
                        .to_string(),
                });
            }
        }

        let mut reader = FieldReader {
            fields,
            skipped: Vec::new(),
        };

        let name = reader
            .list::<HumanNameWire>("name")
            .into_iter()
            .next()
            .and_then(|n| n.text);
        let language = reader
            .list::<CommunicationWire>("communication")
            .into_iter()
            .next()
            .and_then(|c| c.language)
            .and_then(|l| l.coding.into_iter().next())
            .and_then(|c| c.display);

        Ok(PatientSummary {
            id: reader.one("id"),
            name,
            birth_date: reader.one("birthDate"),
            gender: reader.one("gender"),
            vital_status: reader.one::<bool>("deceasedBoolean").map(|deceased| {
                if deceased {
                    VitalStatus::Dead
                } else {
                    VitalStatus::Alive
                }
            }),
            marital_status: reader
                .one::<CodeableConceptWire>("maritalStatus")
                .and_then(|m| m.text),
            telecom: reader
                .list::<ContactPointWire>("telecom")
                .into_iter()
                .map(|t| ContactLine {
                    system: t.system,
                    use_type: t.use_type,
                    value: t.value,
                })
                .collect(),
            addresses: reader
                .list::<AddressWire>("address")
                .into_iter()
                .map(|a| AddressLine {
                    use_type: a.use_type,
                    lines: a.line,
                    city: a.city,
                    district: a.district,
                    state: a.state,
                    postal_code: a.postal_code,
                    country: a.country,
                    period_start: a.period.and_then(|p| p.start),
                })
                .collect(),
            language,
            general_practitioner: reader
                .list::<ReferenceWire>("generalPractitioner")
                .into_iter()
                .next()
                .and_then(|r| r.display),
            managing_organization: reader
                .one::<ReferenceWire>("managingOrganization")
                .and_then(|r| r.display),
            skipped: reader.skipped,
        })
    }

    /// Labelled lines in display order. Telecom and address entries yield one line each.
    pub fn lines(&self) -> Vec<SummaryLine> {
        let mut lines = Vec::new();
        let mut push = |label: &'static str, value: Option<&str>| {
            if let Some(value) = value {
                lines.push(SummaryLine {
                    label,
                    value: value.to_string(),
                });
            }
        };

        push(Self::NAME, self.name.as_deref());
        push(Self::BIRTH_DATE, self.birth_date.as_deref());
        push(Self::GENDER, self.gender.as_deref());
        push(
            Self::VITAL_STATUS,
            self.vital_status.map(VitalStatus::as_str),
        );
        push(Self::MARITAL_STATUS, self.marital_status.as_deref());
        for contact in &self.telecom {
            push(Self::TELECOM, Some(&contact.display()));
        }
        for address in &self.addresses {
            push(Self::ADDRESS, Some(&address.display()));
        }
        push(Self::LANGUAGE, self.language.as_deref());
        push(
            Self::GENERAL_PRACTITIONER,
            self.general_practitioner.as_deref(),
        );
        push(
            Self::MANAGING_ORGANIZATION,
            self.managing_organization.as_deref(),
        );

        lines
    }
}

// ============================================================================
// Wire model
// ============================================================================

#[derive(Debug, Deserialize)]
struct HumanNameWire {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodeableConceptWire {
    #[serde(default)]
    coding: Vec<CodingWire>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodingWire {
    display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactPointWire {
    system: Option<String>,
    #[serde(rename = "use")]
    use_type: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressWire {
    #[serde(rename = "use")]
    use_type: Option<String>,
    #[serde(default)]
    line: Vec<String>,
    city: Option<String>,
    district: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    period: Option<PeriodWire>,
}

#[derive(Debug, Deserialize)]
struct PeriodWire {
    start: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommunicationWire {
    language: Option<CodeableConceptWire>,
}

#[derive(Debug, Deserialize)]
struct ReferenceWire {
    display: Option<String>,
}

/// Reads top-level Patient fields independently, recording the paths it had to skip.
struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    skipped: Vec<String>,
}

impl FieldReader<'_> {
    fn one<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => self.decode(value, key.to_string()),
        }
    }

    /// An array field. Mistyped entries are skipped one by one.
    fn list<T: DeserializeOwned>(&mut self, key: &str) -> Vec<T> {
        let fields = self.fields;
        match fields.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.decode(item, format!("{key}[{i}]")))
                .collect(),
            Some(_) => {
                self.skipped.push(key.to_string());
                Vec::new()
            }
        }
    }

    fn decode<T: DeserializeOwned>(&mut self, value: &Value, at: String) -> Option<T> {
        match serde_path_to_error::deserialize::<_, T>(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                let inner = err.path().to_string();
                let path = if inner.is_empty() || inner == "." {
                    at
                } else {
                    format!("{at}.{inner}")
                };
                self.skipped.push(path);
                None
            }
        }
    }
}

fn join_present(parts: &[Option<&str>], sep: &str) -> String {
    parts
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(sep)
}
