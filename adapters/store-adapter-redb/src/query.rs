use crate::error::{Error, from_redb_error};
use crate::storage;
use neighborly_types::store_adapter::{QueryOptions, Table};
use redb::ReadableDatabase;
use serde_json::Value;

/// Execute a query by scanning the rows of one table
pub fn execute_query(
	db: &redb::Database,
	table: Table,
	opts: &QueryOptions,
) -> Result<Vec<Value>, Error> {
	let tx = db.begin_read().map_err(from_redb_error)?;
	let rows = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;

	let prefix = storage::table_prefix(table);
	let mut results = Vec::new();
	let range = rows.range(prefix.as_str()..).map_err(from_redb_error)?;

	for item in range {
		let (key, value) = item.map_err(from_redb_error)?;
		if !key.value().starts_with(&prefix) {
			break;
		}

		let row: Value = serde_json::from_str(value.value())?;
		if let Some(ref filter) = opts.filter {
			if !storage::matches_filter(&row, filter) {
				continue;
			}
		}
		results.push(row);
	}

	if let Some(ref sort) = opts.sort {
		storage::sort_rows(&mut results, sort);
	}
	if let Some(limit) = opts.limit {
		results.truncate(limit as usize);
	}

	Ok(results)
}

/// Read a single row
pub fn read_row(db: &redb::Database, table: Table, id: &str) -> Result<Option<Value>, Error> {
	let tx = db.begin_read().map_err(from_redb_error)?;
	let rows = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;

	match rows.get(storage::row_key(table, id).as_str()).map_err(from_redb_error)? {
		Some(v) => Ok(Some(serde_json::from_str(v.value())?)),
		None => Ok(None),
	}
}

// vim: ts=4
