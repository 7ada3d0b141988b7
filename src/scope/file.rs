//! Path-derived sub-fields of file values: `${input.name}`, `${input.parent}`
//! and `${input.extension}`.

use crate::error::{Error, Result};
use crate::value::Value;

pub const NAME: &str = "name";
pub const PARENT: &str = "parent";
pub const EXTENSION: &str = "extension";

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Basename up to its first `.`.
pub fn name(path: &str) -> &str {
    let (_, base) = split_parent(path);
    match base.find('.') {
        Some(i) => &base[..i],
        None => base,
    }
}

/// Directory prefix including the trailing `/`, empty without one.
pub fn parent(path: &str) -> &str {
    split_parent(path).0
}

/// Everything after the first `.` of the basename.
pub fn extension(path: &str) -> &str {
    let (_, base) = split_parent(path);
    match base.find('.') {
        Some(i) => &base[i + 1..],
        None => "",
    }
}

/// Applies each field in `fields` to `value`, element-wise over lists.
pub fn derive(value: Value, fields: &[String], reference: &str) -> Result<Value> {
    fields
        .iter()
        .try_fold(value, |v, field| derive_one(v, field, reference))
}

fn derive_one(value: Value, field: &str, reference: &str) -> Result<Value> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| derive_one(item, field, reference))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        scalar => {
            let path = scalar.render();
            let derived = match field {
                NAME => name(&path),
                PARENT => parent(&path),
                EXTENSION => extension(&path),
                other => {
                    return Err(Error::UnknownFileField {
                        reference: reference.to_string(),
                        field: other.to_string(),
                    });
                }
            };
            Ok(Value::Str(derived.to_string()))
        }
    }
}

/// Inserts `suffix` between name and extension: `out.txt` becomes `out.<suffix>.txt`.
pub fn with_suffix(path: &str, suffix: &str) -> String {
    let ext = extension(path);
    if ext.is_empty() {
        format!("{}.{}", path, suffix)
    } else {
        format!("{}{}.{}.{}", parent(path), name(path), suffix, ext)
    }
}

/// Prefixes a relative path with `dir`.
pub fn in_directory(dir: &str, path: &str) -> String {
    if path.starts_with('/') || dir.is_empty() {
        path.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, path)
    } else {
        format!("{}/{}", dir, path)
    }
}
