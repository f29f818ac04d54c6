// Message Renderer Port
// Template rules belong to the back office; PlaceholderRenderer covers the basic fields

use crate::domain::Item;
use crate::error::{AppError, Result};

/// Renders the message text for one item (destination-independent)
pub trait MessageRenderer: Send + Sync {
    fn render(&self, template: &str, item: &Item) -> Result<String>;
}

/// Substitutes `{name}`, `{code}`, `{price}` and `{variant.<key>}`
///
/// Unknown placeholders are left untouched.
pub struct PlaceholderRenderer;

impl MessageRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, item: &Item) -> Result<String> {
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };

            let key = &after[..end];
            match lookup(item, key) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        if out.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "template rendered an empty message for item {}",
                item.id
            )));
        }
        Ok(out)
    }
}

fn lookup(item: &Item, key: &str) -> Option<String> {
    match key {
        "name" => Some(item.name.clone()),
        "code" => Some(item.code.clone()),
        "price" => Some(format!("{:.2}", item.price)),
        _ => key
            .strip_prefix("variant.")
            .and_then(|variant| item.variants.get(variant).cloned()),
    }
}
