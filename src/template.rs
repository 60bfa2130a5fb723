//! SMS body rendering and phone number normalization.
//!
//! Templates use a closed set of placeholders: `{name}`, `{survey}`, `{link}`
//! and `{date}`. Anything else in braces is copied through unchanged.

use chrono::NaiveDate;

pub const DEFAULT_TEMPLATE: &str = "Hi {name}, please complete your {survey}: {link}";

const DATE_FORMAT: &str = "%B %d, %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Name,
    Survey,
    Link,
    Date,
}

impl Placeholder {
    pub const ALL: [Placeholder; 4] = [
        Placeholder::Name,
        Placeholder::Survey,
        Placeholder::Link,
        Placeholder::Date,
    ];

    /// Placeholders honored in operator-supplied custom messages.
    pub const CUSTOM: [Placeholder; 2] = [Placeholder::Name, Placeholder::Link];

    fn token(self) -> &'static str {
        match self {
            Placeholder::Name => "{name}",
            Placeholder::Survey => "{survey}",
            Placeholder::Link => "{link}",
            Placeholder::Date => "{date}",
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    pub name: &'a str,
    pub survey: &'a str,
    pub link: &'a str,
    pub date: NaiveDate,
}

impl MessageContext<'_> {
    fn value(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::Name => self.name.to_string(),
            Placeholder::Survey => self.survey.to_string(),
            Placeholder::Link => self.link.to_string(),
            Placeholder::Date => self.date.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Substitutes every occurrence of the `allowed` tokens in a single
/// left-to-right pass. Other braces are copied through, and substituted
/// values are never re-scanned.
pub fn render(template: &str, ctx: &MessageContext<'_>, allowed: &[Placeholder]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        rest = &rest[open..];
        match allowed.iter().find(|p| rest.starts_with(p.token())) {
            Some(placeholder) => {
                output.push_str(&ctx.value(*placeholder));
                rest = &rest[placeholder.token().len()..];
            }
            None => {
                output.push('{');
                rest = &rest[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

/// Renders a survey message from its template, or the default body when the
/// template is unset, empty or whitespace only.
pub fn render_message(template: Option<&str>, ctx: &MessageContext<'_>) -> String {
    match template.filter(|t| !t.trim().is_empty()) {
        Some(template) => render(template, ctx, &Placeholder::ALL),
        None => render(DEFAULT_TEMPLATE, ctx, &Placeholder::ALL),
    }
}

pub fn render_custom(message: &str, ctx: &MessageContext<'_>) -> String {
    render(message, ctx, &Placeholder::CUSTOM)
}

/// Normalizes a phone number to a dialable `+<digits>` form.
///
/// Ten digits are treated as a North American number. The result is not
/// validated beyond that.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        format!("+1{digits}")
    } else {
        format!("+{digits}")
    }
}
