//! Server-rendered HTML pages.
//!
//! Rendering is a pure function of the session snapshot: optional patient fields that are
//! absent produce no line.

use fhir::{PatientSummary, QuestionnaireTemplate};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde_json::Value;
use smart_core::{FormRenderer, Panel, Session};

const FORM_CONTAINER_ID: &str = "formContainer";

fn layout(title: &str, head: Markup, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                (head)
            }
            body {
                div class="container" { (body) }
            }
        }
    }
}

fn card(title: &str, content: Markup) -> Markup {
    html! {
        div class="card" {
            div class="card-header" { h2 { (title) } }
            div class="card-body" { (content) }
        }
    }
}

fn raw_json(value: Option<&Value>) -> Markup {
    match value.map(serde_json::to_string_pretty) {
        Some(Ok(text)) => html! { pre { (text) } },
        Some(Err(e)) => {
            tracing::warn!("could not pretty-print resource: {e}");
            html! { p { "Resource could not be displayed." } }
        }
        None => html! { p class="empty" { "Not available." } },
    }
}

pub fn sign_in_page() -> Markup {
    layout(
        "Sign In",
        html! {},
        html! {
            div class="login-box" {
                h1 { "Sign In" }
                a class="btn btn-info" href="/sign-in" { "Sign in with EPIC" }
            }
        },
    )
}

pub fn awaiting_token_page() -> Markup {
    layout(
        "Smart on FHIR - Patient Info",
        html! {},
        html! {
            h1 { "Smart on FHIR - Patient Info" }
            p { "Sign-in could not be completed. No patient data is available." }
            (logout_button())
            a href="/sign-in" { "Try again" }
        },
    )
}

fn panel_nav(current: Panel) -> Markup {
    html! {
        nav class="panels" {
            @for panel in [Panel::Summary, Panel::Profile, Panel::Questionnaire] {
                form method="post" action="/view" class="inline" {
                    input type="hidden" name="panel" value=(panel.as_str());
                    @if panel == current {
                        button class="btn btn-info active" type="submit" disabled { (panel_title(panel)) }
                    } @else {
                        button class="btn btn-info" type="submit" { (panel_title(panel)) }
                    }
                }
            }
        }
    }
}

fn panel_title(panel: Panel) -> &'static str {
    match panel {
        Panel::Summary => "Summary",
        Panel::Profile => "Profile",
        Panel::Questionnaire => "Questionnaire",
    }
}

fn logout_button() -> Markup {
    html! {
        form method="post" action="/logout" class="inline" {
            button class="btn btn-secondary" type="submit" { "Sign out" }
        }
    }
}

/// Labelled patient lines. The patient id comes from the session, not the resource.
pub fn patient_summary(patient_id: Option<&str>, patient: Option<&Value>) -> Markup {
    let summary = patient.and_then(|value| match PatientSummary::from_resource(value) {
        Ok(summary) => {
            if !summary.skipped.is_empty() {
                tracing::warn!("unreadable Patient fields: {}", summary.skipped.join(", "));
            }
            Some(summary)
        }
        Err(e) => {
            tracing::warn!("could not read Patient resource: {e}");
            None
        }
    });

    html! {
        dl class="patient" {
            @if let Some(id) = patient_id {
                dt { "Patient Id" } dd { (id) }
            }
            @if let Some(summary) = &summary {
                @for line in summary.lines() {
                    dt { (line.label) } dd { (line.value) }
                }
            }
        }
    }
}

pub fn patient_page(session: &Session, panel: Panel, renderer: &dyn FormRenderer) -> Markup {
    let resources = &session.resources;
    let template = resources
        .questionnaire
        .as_ref()
        .and_then(QuestionnaireTemplate::locate);
    let head = match panel {
        Panel::Questionnaire => form_assets(renderer),
        _ => html! {},
    };

    layout(
        "Smart on FHIR - Patient Info",
        head,
        html! {
            h1 { "Smart on FHIR - Patient Info" }
            (panel_nav(panel))
            (logout_button())
            hr;
            @match panel {
                Panel::Summary => {
                    (card("Patient", patient_summary(
                        session.patient_id.as_ref().map(|id| id.as_str()),
                        resources.patient.as_ref(),
                    )))
                }
                Panel::Profile => {
                    (card("Patient", raw_json(resources.patient.as_ref())))
                    (card("Questionnaire", raw_json(resources.questionnaire.as_ref())))
                    (card("CarePlan", raw_json(resources.care_plan.as_ref())))
                }
                Panel::Questionnaire => {
                    (card("Questionnaire", questionnaire_form(template.as_ref(), renderer)))
                }
            }
        },
    )
}

pub fn questionnaire_page(template: Option<&QuestionnaireTemplate>, renderer: &dyn FormRenderer) -> Markup {
    let title = template
        .and_then(QuestionnaireTemplate::title)
        .unwrap_or("Questionnaire");
    layout(
        title,
        form_assets(renderer),
        html! {
            h1 { (title) }
            a href="/" { "Back" }
            (questionnaire_form(template, renderer))
        },
    )
}

fn form_assets(renderer: &dyn FormRenderer) -> Markup {
    let assets = renderer.assets();
    html! {
        @for href in &assets.stylesheets {
            link href=(href) media="screen" rel="stylesheet";
        }
        @for src in &assets.scripts {
            script src=(src) {}
        }
    }
}

/// The widget container, its mount call and the submit button.
fn questionnaire_form(template: Option<&QuestionnaireTemplate>, renderer: &dyn FormRenderer) -> Markup {
    let Some(template) = template else {
        return html! { p class="empty" { "No questionnaire available." } };
    };

    let mount = match renderer.mount_script(template, FORM_CONTAINER_ID) {
        Ok(script) => script,
        Err(e) => {
            tracing::warn!("could not render questionnaire: {e}");
            return html! { p { "Questionnaire could not be displayed." } };
        }
    };

    html! {
        div id=(FORM_CONTAINER_ID) {}
        br;
        button id="submitForm" class="btn btn-submit" type="button" { "Submit QuestionnaireResponse" }
        script { (PreEscaped(mount)) }
        script { (PreEscaped(submit_script(renderer.extract_expression()))) }
    }
}

fn submit_script(extract: &str) -> String {
    format!(
        "document.getElementById('submitForm').addEventListener('click', async () => {{\n\
         \x20 try {{\n\
         \x20   const qr = {extract};\n\
         \x20   const res = await fetch('/questionnaire-response', {{\n\
         \x20     method: 'POST',\n\
         \x20     headers: {{ 'Content-Type': 'application/json' }},\n\
         \x20     body: JSON.stringify(qr)\n\
         \x20   }});\n\
         \x20   const out = await res.json();\n\
         \x20   alert(out.message);\n\
         \x20 }} catch (e) {{\n\
         \x20   console.error(e);\n\
         \x20   alert('Failed to submit form.');\n\
         \x20 }}\n\
         }});"
    )
}
