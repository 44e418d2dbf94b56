//! Token substitution for subject and body templates.

use crate::models::Lead;

/// Replace all known `{{token}}` placeholders with lead fields.
///
/// Missing lead fields substitute as empty strings, except `{{company}}`
/// which falls back to "your company". Unknown tokens pass through intact.
pub fn substitute(template: &str, lead: &Lead, public_base_url: &str) -> String {
    let name = lead.name.as_deref().unwrap_or("");
    let (first_name, last_name) = split_name(name);

    template
        .replace("{{leadName}}", name)
        .replace("{{fullName}}", lead.full_name.as_deref().unwrap_or(""))
        .replace("{{firstName}}", first_name)
        .replace("{{lastName}}", last_name)
        .replace(
            "{{company}}",
            lead.company.as_deref().unwrap_or("your company"),
        )
        .replace("{{linkedinUrl}}", lead.linkedin_url.as_deref().unwrap_or(""))
        .replace("{{industry}}", lead.industry.as_deref().unwrap_or(""))
        .replace("{{unsubscribe}}", &unsubscribe_anchor(lead, public_base_url))
}

/// Split a display name into (first word, rest).
fn split_name(name: &str) -> (&str, &str) {
    match name.split_once(' ') {
        Some((first, rest)) => (first, rest),
        None => (name, ""),
    }
}

/// Build the anchor embedded wherever `{{unsubscribe}}` appears. The link
/// token falls back to the lead ID when no dedicated token was issued.
fn unsubscribe_anchor(lead: &Lead, public_base_url: &str) -> String {
    let token = lead
        .unsubscribe_token
        .clone()
        .unwrap_or_else(|| lead.id.to_string());
    format!(
        r#"<a href="{public_base_url}/unsubscribe?token={token}" style="color: #666; font-size: 12px;">Unsubscribe</a>"#
    )
}
