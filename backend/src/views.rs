use maud::{html, Markup, DOCTYPE};
use std::collections::BTreeMap;

use crate::features::{FeatureKind, FeatureSchema, FeatureSpec};

/// Optional form field naming the host who owns the listing.
pub const HOST_FIELD: &str = "host_name";

pub enum Notice<'a> {
    Info(&'a str),
    Error(&'a str),
}

/// The listing form, pre-filled from `values` when a submission is echoed back.
pub fn listing_page(
    schema: &FeatureSchema,
    values: &BTreeMap<String, String>,
    notice: Option<Notice<'_>>,
) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "Airbnb Price Finder" }
            }
            body {
                h1 { "Add a Listing" }
                @match notice {
                    Some(Notice::Info(text)) => {
                        p class="message" { (text) }
                    }
                    Some(Notice::Error(text)) => {
                        p class="error" role="alert" { (text) }
                    }
                    None => {}
                }
                form method="post" action="/add_listing" {
                    label {
                        "Host name "
                        input type="text" name=(HOST_FIELD) value=[values.get(HOST_FIELD)];
                    }
                    @for spec in schema.iter() {
                        (field(spec, values.get(&spec.name).map(String::as_str)))
                    }
                    button type="submit" { "Save listing" }
                    button type="submit" formaction="/predict" { "Suggest a price" }
                }
            }
        }
    }
}

fn field(spec: &FeatureSpec, current: Option<&str>) -> Markup {
    html! {
        div class="field" {
            label for=(spec.name) { (spec.label) }
            @match &spec.kind {
                FeatureKind::Choice { options } => {
                    select id=(spec.name) name=(spec.name) {
                        @for choice in options {
                            option value=(choice) selected[current == Some(choice.as_str())] { (choice) }
                        }
                    }
                }
                FeatureKind::Number { min, max, step } => {
                    input type="number" id=(spec.name) name=(spec.name)
                        min=(min) max=(max) step=(step) value=[current] required;
                }
                FeatureKind::Boolean => {
                    select id=(spec.name) name=(spec.name) {
                        option value="true" selected[current == Some("true")] { "Yes" }
                        option value="false" selected[current == Some("false")] { "No" }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::load_schema;

    #[test]
    fn renders_every_feature() {
        let schema = load_schema().unwrap();
        let page = listing_page(&schema, &BTreeMap::new(), None).into_string();
        for spec in schema.iter() {
            assert!(page.contains(&format!("name=\"{}\"", spec.name)), "{}", spec.name);
            assert!(page.contains(&spec.label));
        }
        assert!(page.contains("max=\"16\""));
        assert!(page.contains("step=\"0.5\""));
    }

    #[test]
    fn echoes_submitted_values() {
        let schema = load_schema().unwrap();
        let mut values = BTreeMap::new();
        values.insert("accommodates".to_string(), "4".to_string());
        values.insert("city".to_string(), "SF".to_string());
        let page = listing_page(&schema, &values, Some(Notice::Info("Saved listing #1")))
            .into_string();
        assert!(page.contains("value=\"4\""));
        assert!(page.contains("<option value=\"SF\" selected>SF</option>"));
        assert!(page.contains("Saved listing #1"));
    }

    #[test]
    fn escapes_echoed_text() {
        let schema = load_schema().unwrap();
        let mut values = BTreeMap::new();
        values.insert(HOST_FIELD.to_string(), "<script>".to_string());
        let page = listing_page(&schema, &values, Some(Notice::Error("bad <input>")))
            .into_string();
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
