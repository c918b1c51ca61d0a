use crate::app::models::{FileCombo, InputFile};
use crate::app::transform;

/// Builds the full output text of `combo`.
///
/// `provider` returns the raw content of an input (`None` when the file is
/// missing). An `Err` from the provider aborts composition and is returned
/// unchanged.
pub fn compose<E, P>(combo: &FileCombo, mut provider: P) -> Result<String, E>
where
    P: FnMut(&InputFile) -> Result<Option<String>, E>,
{
    let mut combined = String::new();

    for input in &combo.input_files {
        let raw = provider(input)?;
        let Some(part) = transform::contribution(raw.as_deref(), input) else {
            continue;
        };

        if !combined.is_empty() {
            combined.push_str(&combo.separator);
        }
        combined.push_str(&part);
    }

    if combined.is_empty() {
        return Ok(combo.empty_text.clone());
    }

    let mut out = String::with_capacity(combo.prefix.len() + combined.len() + combo.suffix.len());
    out.push_str(&combo.prefix);
    out.push_str(&combined);
    out.push_str(&combo.suffix);
    Ok(out)
}
