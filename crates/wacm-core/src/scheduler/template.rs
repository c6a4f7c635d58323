//! Template rendering against contact variables

use crate::whatsapp::{ComponentParameters, Language, MediaObject, Parameter, TemplatePayload};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use wacm_common::types::Variables;
use wacm_storage::models::{Contact, HeaderFormat, Template};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template header requires {0:?} media but the campaign has no media id")]
    MissingMedia(HeaderFormat),
}

/// Placeholder names in order of first appearance
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(text) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Substitute `{{key}}` with its variable. Unknown keys stay as written.
pub fn render_text(text: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// The contact's variables plus `name` and `phone` when not set explicitly
pub fn contact_variables(contact: &Contact) -> Variables {
    let mut vars = contact.variables.clone();
    vars.entry("name".to_string())
        .or_insert_with(|| contact.name.clone());
    vars.entry("phone".to_string())
        .or_insert_with(|| contact.phone.clone());
    vars
}

fn text_parameters(text: &str, variables: &Variables) -> Vec<Parameter> {
    placeholders(text)
        .into_iter()
        .map(|name| Parameter::Text {
            text: variables
                .get(&name)
                .cloned()
                .unwrap_or_else(|| format!("{{{{{}}}}}", name)),
        })
        .collect()
}

/// Build the provider payload for `template` addressed to `contact`
pub fn build_template_payload(
    template: &Template,
    contact: &Contact,
    media_id: Option<&str>,
) -> Result<TemplatePayload, RenderError> {
    let variables = contact_variables(contact);
    let mut components = Vec::new();

    if let Some((format, text)) = template.header() {
        let parameters = if format.is_media() {
            let media = MediaObject::by_id(media_id.ok_or(RenderError::MissingMedia(format))?);
            vec![match format {
                HeaderFormat::Image => Parameter::Image { image: media },
                HeaderFormat::Video => Parameter::Video { video: media },
                _ => Parameter::Document { document: media },
            }]
        } else {
            text.map(|t| text_parameters(t, &variables))
                .unwrap_or_default()
        };

        if !parameters.is_empty() {
            components.push(ComponentParameters {
                component_type: "header".to_string(),
                parameters,
            });
        }
    }

    if let Some(body) = template.body() {
        let parameters = text_parameters(body, &variables);
        if !parameters.is_empty() {
            components.push(ComponentParameters {
                component_type: "body".to_string(),
                parameters,
            });
        }
    }

    Ok(TemplatePayload {
        name: template.external_name.clone(),
        language: Language {
            code: template.language.clone(),
        },
        components,
    })
}

/// Rendered body text, stored as message content
pub fn preview(template: &Template, contact: &Contact) -> Option<String> {
    template
        .body()
        .map(|body| render_text(body, &contact_variables(contact)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use uuid::Uuid;
    use wacm_storage::models::TemplateComponent;

    fn contact(vars: &[(&str, &str)]) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            name: "Ana Souza".into(),
            phone: "5511999990000".into(),
            tags: vec![],
            groups: vec![],
            variables: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn template(components: Vec<TemplateComponent>) -> Template {
        Template {
            id: Uuid::new_v4(),
            external_name: "spring_promo".into(),
            name: "Spring promo".into(),
            category: "MARKETING".into(),
            language: "pt_BR".into(),
            components,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_known_variable() {
        let vars: Variables = HashMap::from([("name".to_string(), "Ana".to_string())]);
        assert_eq!(render_text("Hi {{name}}!", &vars), "Hi Ana!");
    }

    #[test]
    fn test_render_keeps_unknown_placeholder() {
        assert_eq!(render_text("Hi {{name}}!", &Variables::new()), "Hi {{name}}!");
    }

    #[test]
    fn test_placeholders_in_first_appearance_order() {
        assert_eq!(
            placeholders("{{ b }} and {{a}} then {{b}}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_payload_fills_body_parameters() {
        let t = template(vec![TemplateComponent::Body {
            text: "Hi {{name}}, code {{coupon}} ends {{until}}".into(),
        }]);
        let payload = build_template_payload(&t, &contact(&[("coupon", "SPRING10")]), None).unwrap();

        assert_eq!(payload.name, "spring_promo");
        assert_eq!(payload.language.code, "pt_BR");
        assert_eq!(
            payload.components[0].parameters,
            vec![
                Parameter::Text {
                    text: "Ana Souza".into()
                },
                Parameter::Text {
                    text: "SPRING10".into()
                },
                Parameter::Text {
                    text: "{{until}}".into()
                },
            ]
        );
    }

    #[test]
    fn test_media_header_requires_media_id() {
        let t = template(vec![
            TemplateComponent::Header {
                format: HeaderFormat::Image,
                text: None,
            },
            TemplateComponent::Body {
                text: "Hello".into(),
            },
        ]);

        assert_eq!(
            build_template_payload(&t, &contact(&[]), None),
            Err(RenderError::MissingMedia(HeaderFormat::Image))
        );

        let payload = build_template_payload(&t, &contact(&[]), Some("media-9")).unwrap();
        assert_eq!(payload.components.len(), 1);
        assert_eq!(payload.components[0].component_type, "header");
    }

    #[test]
    fn test_preview_renders_body() {
        let t = template(vec![TemplateComponent::Body {
            text: "Hi {{name}}!".into(),
        }]);
        assert_eq!(
            preview(&t, &contact(&[("name", "Ana")])).as_deref(),
            Some("Hi Ana!")
        );
    }
}
