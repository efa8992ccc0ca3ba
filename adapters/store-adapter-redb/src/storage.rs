use neighborly_types::store_adapter::{QueryFilter, SortField, Table};
use serde_json::Value;
use std::cmp::Ordering;

/// Row storage table, keyed by `<table>/<id>`, values are JSON rows
pub const TABLE_ROWS: redb::TableDefinition<&str, &str> = redb::TableDefinition::new("rows");

pub fn row_key(table: Table, id: &str) -> String {
	format!("{}/{}", table.as_str(), id)
}

pub fn table_prefix(table: Table) -> String {
	format!("{}/", table.as_str())
}

/// Check if a row matches a filter
pub fn matches_filter(row: &Value, filter: &QueryFilter) -> bool {
	for (column, expected) in &filter.equals {
		match row.get(column) {
			Some(actual) if actual == expected => {}
			_ => return false,
		}
	}

	// Missing columns are inherently "not equal"
	for (column, excluded) in &filter.not_equals {
		if row.get(column) == Some(excluded) {
			return false;
		}
	}

	for (column, allowed) in &filter.in_array {
		match row.get(column) {
			Some(actual) if allowed.contains(actual) => {}
			_ => return false,
		}
	}

	true
}

/// Compare two JSON values for sorting
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	match (a, b) {
		(None, None) => Ordering::Equal,
		(None, Some(_)) => Ordering::Less,
		(Some(_), None) => Ordering::Greater,
		(Some(Value::Number(a)), Some(Value::Number(b))) => {
			a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
		}
		(Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
		(Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
		(Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
	}
}

/// Sort rows by the given fields, earlier fields take precedence.
/// The sort is stable so ties keep their key order.
pub fn sort_rows(rows: &mut [Value], sort: &[SortField]) {
	rows.sort_by(|a, b| {
		for field in sort {
			let ord = compare_values(a.get(&field.field), b.get(&field.field));
			let ord = if field.ascending { ord } else { ord.reverse() };
			if ord != Ordering::Equal {
				return ord;
			}
		}
		Ordering::Equal
	});
}


// vim: ts=4
