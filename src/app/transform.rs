use crate::app::models::InputFile;
use std::borrow::Cow;

/// Turns the raw content of one input into its contribution to the combo.
///
/// `None` content means the file does not exist and is handled like an empty
/// file. Returns `None` when the input is skipped entirely.
pub fn contribution(content: Option<&str>, rule: &InputFile) -> Option<String> {
    let mut text = content.unwrap_or_default();

    if text.is_empty() {
        if rule.skip_if_empty {
            return None;
        }
        text = rule.empty_text.as_str();
    }

    let text = if !rule.replace_search.is_empty() && !rule.replace_with.is_empty() {
        Cow::Owned(text.replace(&rule.replace_search, &rule.replace_with))
    } else {
        Cow::Borrowed(text)
    };

    Some(format!("{}{}{}", rule.prefix, text, rule.suffix))
}
