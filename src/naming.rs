//! Human-readable name prefixes for styled components
//!
//! The structural hash alone says nothing about where a style came from; a
//! display name built from the source file and the binding the template is
//! assigned to is prepended by callers for debugging.

use std::path::Path;

/// Name of the file's "block": its stem, or the directory for `index` files
pub fn block_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem == "index" {
        let dir = path.parent()?.file_name()?.to_str()?;
        return Some(dir.to_string());
    }
    Some(stem.to_string())
}

fn prefix_leading_digit(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("x{}", name)
    } else {
        name.to_string()
    }
}

/// Display name for a component defined in `file`
///
/// - no file: the component name
/// - block name equal to the component name: the component name
/// - otherwise `block__component`, or just the block when the component is
///   anonymous; a block starting with a digit gets an `x` in front
pub fn display_name(file: Option<&Path>, component: Option<&str>) -> Option<String> {
    let Some(file) = file else {
        return component.map(str::to_string);
    };
    let Some(block) = block_name(file) else {
        return component.map(str::to_string);
    };
    if Some(block.as_str()) == component {
        return Some(block);
    }

    let block = prefix_leading_digit(&block);
    Some(match component {
        Some(component) => format!("{}__{}", block, component),
        None => block,
    })
}
