//! Backup file name resolution.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::{Error, Result};

/// Resolve a backup file name from a template.
///
/// `{PROJECT_NAME}` and `{TIME}` are substituted; any other `{...}`
/// placeholder is rejected. Slashes in the project name and spaces in the
/// rendered time are flattened so the result stays a single path component.
pub fn resolve(
    template: &str,
    project_name: &str,
    when: DateTime<Local>,
    time_format: &str,
) -> Result<String> {
    let placeholder = Regex::new(r"\{([^{}]*)\}").expect("placeholder regex is valid");
    for capture in placeholder.captures_iter(template) {
        let name = &capture[1];
        if name != "PROJECT_NAME" && name != "TIME" {
            return Err(Error::Template {
                template: template.to_string(),
                reason: format!("unknown placeholder {{{name}}}"),
            });
        }
    }

    let items: Vec<Item> = StrftimeItems::new(time_format).collect();
    if items.contains(&Item::Error) {
        return Err(Error::Template {
            template: template.to_string(),
            reason: format!("invalid time format '{time_format}'"),
        });
    }
    let time = when
        .format_with_items(items.into_iter())
        .to_string()
        .replace(' ', "_");

    Ok(template
        .replace("{PROJECT_NAME}", &project_name.replace('/', "-"))
        .replace("{TIME}", &time))
}
