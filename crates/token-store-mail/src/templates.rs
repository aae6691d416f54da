use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

use crate::MailError;

/// Layout every content template extends.
pub const LAYOUT_TEMPLATE: &str = "emaillayout.txt";

/// Single-part message built from [`StandardFields`].
pub const PLAIN_TEMPLATE: &str = "emailplain.txt";

/// Fields of a standard plain-text e-mail.
#[derive(Debug, Clone, Serialize)]
pub struct StandardFields {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Parsed e-mail templates.
///
/// Loading fails if any template does not parse or the layout/plain templates
/// are missing, so misconfiguration shows up at startup.
pub struct MailTemplates {
    tera: Tera,
}

impl MailTemplates {
    /// Load every `*.txt` template below `dir`.
    pub fn load(dir: &Path) -> Result<Self, MailError> {
        let pattern = dir.join("**").join("*.txt");
        let pattern = pattern.to_str().ok_or_else(|| {
            MailError::Template(format!("non UTF-8 template path {}", dir.display()))
        })?;

        let tera = Tera::new(pattern).map_err(MailError::from_tera)?;
        Self::checked(tera)
    }

    /// Build from in-memory `(name, source)` pairs.
    pub fn from_raw(templates: &[(&str, &str)]) -> Result<Self, MailError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates.to_vec())
            .map_err(MailError::from_tera)?;
        Self::checked(tera)
    }

    fn checked(mut tera: Tera) -> Result<Self, MailError> {
        // Headers and bodies are plain text; HTML escaping would corrupt them.
        tera.autoescape_on(vec![]);

        let names: Vec<&str> = tera.get_template_names().collect();
        for required in [LAYOUT_TEMPLATE, PLAIN_TEMPLATE] {
            if !names.contains(&required) {
                return Err(MailError::Template(format!(
                    "required template {required} not found"
                )));
            }
        }

        Ok(Self { tera })
    }

    /// Render the named template with `data` as its context.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<Vec<u8>, MailError> {
        let context = Context::from_serialize(data).map_err(MailError::from_tera)?;
        let rendered = self
            .tera
            .render(name, &context)
            .map_err(MailError::from_tera)?;
        Ok(rendered.into_bytes())
    }

    pub fn render_plain(&self, fields: &StandardFields) -> Result<Vec<u8>, MailError> {
        self.render(PLAIN_TEMPLATE, fields)
    }
}
