use crate::CrawlerError;
use lazy_regex::regex;

/// A message body with `{{ name }}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    body: &'static str,
}

/// Used for the start and finish messages.
pub const DEFAULT_TEMPLATE: Template = Template::new(
    "telegram-default",
    include_str!("../../templates/telegram-default.txt"),
);

pub const PERIODIC_TEMPLATE: Template = Template::new(
    "telegram-periodic",
    include_str!("../../templates/telegram-periodic.txt"),
);

impl Template {
    pub const fn new(name: &'static str, body: &'static str) -> Self {
        Self { name, body }
    }

    /// Substitutes every placeholder; one without a value is an error.
    /// Trailing blank lines are dropped.
    pub fn render(&self, vars: &[(&str, String)]) -> Result<String, CrawlerError> {
        let mut out = String::with_capacity(self.body.len());
        let mut last = 0;
        for caps in regex!(r"\{\{\s*([A-Za-z_]+)\s*\}\}").captures_iter(self.body) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = vars
                .iter()
                .find(|(key, _)| *key == name.as_str())
                .map(|(_, value)| value)
                .ok_or_else(|| CrawlerError::TemplateError {
                    template: self.name.to_string(),
                    variable: name.as_str().to_string(),
                })?;
            out.push_str(&self.body[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&self.body[last..]);

        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render() {
        let template = Template::new("greeting", "Hi {{name}}, {{ count }} new {{ name }}\n\n");
        let text = template
            .render(&[("name", "Ash".to_string()), ("count", "3".to_string())])
            .unwrap();
        assert_eq!(text, "Hi Ash, 3 new Ash");
    }

    #[test]
    fn test_render_unknown_variable() {
        let err = Template::new("greeting", "Hi {{ name }}")
            .render(&[])
            .unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::TemplateError { ref template, ref variable }
                if template == "greeting" && variable == "name"
        ));
    }

    #[test]
    fn test_bundled_templates_names() {
        assert_eq!(DEFAULT_TEMPLATE.name, "telegram-default");
        assert_eq!(PERIODIC_TEMPLATE.name, "telegram-periodic");
    }
}
