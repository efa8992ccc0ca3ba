//! Row patching
//!
//! Updates are shallow: top-level columns of the patch overwrite the stored
//! row, nested values are replaced as a whole, and a `null` column deletes
//! the column. The `id` column is never patched.

use serde_json::{Map, Value};

use crate::error::Error;

pub fn shallow_merge(target: &mut Value, patch: &Value) -> Result<(), Error> {
	let Value::Object(patch_obj) = patch else {
		return Err(Error::InvalidRow("patch must be a JSON object".into()));
	};
	let Some(target_obj) = target.as_object_mut() else {
		return Err(Error::InvalidRow("stored row is not a JSON object".into()));
	};
	merge_columns(target_obj, patch_obj);
	Ok(())
}

fn merge_columns(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
	for (column, value) in patch {
		if column == "id" {
			continue;
		}
		match value {
			Value::Null => {
				target.remove(column);
			}
			_ => {
				target.insert(column.clone(), value.clone());
			}
		}
	}
}


// vim: ts=4
