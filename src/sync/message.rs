use crate::domain::SaveContext;

pub const AUTO_TEMPLATE: &str = "auto";
const FALLBACK_SUBJECT: &str = "Update data";

/// Builds the commit subject for a batch of saves. Any template other than
/// `auto` is used verbatim.
pub fn commit_message(contexts: &[SaveContext], template: &str) -> String {
    let template = template.trim();
    if !template.is_empty() && !template.eq_ignore_ascii_case(AUTO_TEMPLATE) {
        return template.to_string();
    }

    let Some(first) = contexts.first() else {
        return FALLBACK_SUBJECT.to_string();
    };

    if contexts.len() == 1 {
        if first.name.is_empty() {
            return format!("{} {}", first.op.verb(), first.item);
        }
        return format!("{} {}: {}", first.op.verb(), first.item, first.name);
    }

    let uniform = contexts
        .iter()
        .all(|context| context.op == first.op && context.item == first.item);
    if uniform {
        format!("{} {} {}s", first.op.verb(), contexts.len(), first.item)
    } else {
        format!("Update: {} changes", contexts.len())
    }
}
