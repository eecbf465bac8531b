use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::MergeSuffixes;
use crate::error::{IntakeError, JoinSide, KeyError, TypeConflict};
use crate::table::{CellValue, Column, ColumnType, Table};

/// Row-wise union of tables from one source.
///
/// The result carries every column seen, in first-appearance order; a table without a
/// column contributes nulls for it. The same column declared with two incompatible
/// non-empty types fails the whole call.
pub fn consolidate_source<'a, I>(tables: I) -> Result<Table, IntakeError>
where
    I: IntoIterator<Item = &'a Table>,
{
    let tables: Vec<&Table> = tables.into_iter().collect();

    let mut schema: Vec<(&str, ColumnType)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut conflicts: Vec<TypeConflict> = Vec::new();

    for table in &tables {
        for column in table.columns() {
            let name = column.name();
            match positions.get(name) {
                None => {
                    positions.insert(name, schema.len());
                    schema.push((name, column.column_type()));
                }
                Some(&index) => {
                    let declared = schema[index].1;
                    match declared.merge(column.column_type()) {
                        Some(merged) => schema[index].1 = merged,
                        None => {
                            if !conflicts.iter().any(|c| c.column == name) {
                                conflicts.push(TypeConflict {
                                    column: name.to_string(),
                                    first: declared,
                                    second: column.column_type(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(IntakeError::SchemaConflict { conflicts });
    }

    let total_rows: usize = tables.iter().map(|t| t.row_count()).sum();
    let columns = schema
        .iter()
        .map(|(name, _)| {
            let mut cells = Vec::with_capacity(total_rows);
            for table in &tables {
                match table.column(name) {
                    Some(column) => cells.extend_from_slice(column.cells()),
                    None => cells.extend(std::iter::repeat_n(CellValue::Null, table.row_count())),
                }
            }
            Column::new(*name, cells)
        })
        .collect();

    debug!(
        tables = tables.len(),
        rows = total_rows,
        columns = schema.len(),
        "consolidated source"
    );
    Ok(Table::from_columns_unchecked(columns))
}

/// Where an output column of an alignment takes its values from
enum ColumnOrigin {
    Key { left: usize, right: usize },
    Left(usize),
    Right(usize),
}

/// Full outer join of two tables on `key_columns`.
///
/// Every left row and every right row appears at least once. Rows with equal keys merge,
/// `n` left and `m` right rows sharing a key give `n * m` rows. Left rows come first in
/// their original order, each followed by its matches, then the unmatched right rows.
/// A key containing a null never matches.
pub fn align_sources<S: AsRef<str>>(
    left: &Table,
    right: &Table,
    key_columns: &[S],
    suffixes: &MergeSuffixes,
) -> Result<Table, IntakeError> {
    let mut keys: Vec<&str> = Vec::new();
    for key in key_columns {
        if !keys.contains(&key.as_ref()) {
            keys.push(key.as_ref());
        }
    }
    if keys.is_empty() {
        return Err(KeyError::Empty.into());
    }
    check_keys_present(left, &keys, JoinSide::Left)?;
    check_keys_present(right, &keys, JoinSide::Right)?;

    let key_conflicts: Vec<TypeConflict> = keys
        .iter()
        .filter_map(|key| {
            let first = left.column(key)?.column_type();
            let second = right.column(key)?.column_type();
            (!first.is_compatible_with(second)).then(|| TypeConflict {
                column: key.to_string(),
                first,
                second,
            })
        })
        .collect();
    if !key_conflicts.is_empty() {
        return Err(IntakeError::SchemaConflict {
            conflicts: key_conflicts,
        });
    }

    let (names, origins) = output_layout(left, right, &keys, suffixes);
    check_suffix_collisions(&names)?;

    let left_keys: Vec<usize> = keys.iter().filter_map(|k| left.column_index(k)).collect();
    let right_keys: Vec<usize> = keys.iter().filter_map(|k| right.column_index(k)).collect();

    let mut right_index: HashMap<Vec<&CellValue>, Vec<usize>> = HashMap::new();
    for row in 0..right.row_count() {
        if let Some(key) = key_values(right, &right_keys, row) {
            right_index.entry(key).or_default().push(row);
        }
    }

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    let mut right_matched = vec![false; right.row_count()];
    for row in 0..left.row_count() {
        let matches = key_values(left, &left_keys, row).and_then(|key| right_index.get(&key));
        match matches {
            Some(matches) => {
                for &right_row in matches {
                    right_matched[right_row] = true;
                    pairs.push((Some(row), Some(right_row)));
                }
            }
            None => pairs.push((Some(row), None)),
        }
    }
    pairs.extend(
        right_matched
            .iter()
            .enumerate()
            .filter(|(_, matched)| !**matched)
            .map(|(row, _)| (None, Some(row))),
    );

    let columns = names
        .into_iter()
        .zip(&origins)
        .map(|(name, origin)| {
            let cells = pairs
                .iter()
                .map(|&(left_row, right_row)| pick_cell(left, right, origin, left_row, right_row))
                .collect();
            Column::new(name, cells)
        })
        .collect();

    debug!(
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        rows = pairs.len(),
        "aligned tables"
    );
    Table::from_columns(columns)
}

fn check_keys_present(table: &Table, keys: &[&str], side: JoinSide) -> Result<(), IntakeError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|key| table.column(key).is_none())
        .map(|key| key.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(KeyError::Missing {
            side,
            columns: missing,
        }
        .into())
    }
}

/// A suffixed name may land on a column that already carries it, e.g. `Note_x` next to `Note`
fn check_suffix_collisions(names: &[String]) -> Result<(), IntakeError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(names.len());
    let mut collisions: Vec<String> = Vec::new();
    for name in names {
        if !seen.insert(name.as_str()) && !collisions.contains(name) {
            collisions.push(name.clone());
        }
    }
    if collisions.is_empty() {
        Ok(())
    } else {
        Err(KeyError::SuffixCollision {
            columns: collisions,
        }
        .into())
    }
}

/// Key cells of one row, `None` when any of them is null
fn key_values<'a>(table: &'a Table, key_indexes: &[usize], row: usize) -> Option<Vec<&'a CellValue>> {
    key_indexes
        .iter()
        .map(|&index| {
            let cell = &table.columns()[index].cells()[row];
            (!cell.is_null()).then_some(cell)
        })
        .collect()
}

/// Output column names and origins: left columns in order, then right non-key columns.
/// Non-key names present on both sides get the configured suffixes.
fn output_layout(
    left: &Table,
    right: &Table,
    keys: &[&str],
    suffixes: &MergeSuffixes,
) -> (Vec<String>, Vec<ColumnOrigin>) {
    let is_key = |name: &str| keys.contains(&name);
    let mut names = Vec::new();
    let mut origins = Vec::new();

    for (index, column) in left.columns().iter().enumerate() {
        let name = column.name();
        if is_key(name) {
            let right_index = right.column_index(name).unwrap_or_default();
            names.push(name.to_string());
            origins.push(ColumnOrigin::Key {
                left: index,
                right: right_index,
            });
        } else if right.column(name).is_some() {
            names.push(format!("{name}{}", suffixes.left));
            origins.push(ColumnOrigin::Left(index));
        } else {
            names.push(name.to_string());
            origins.push(ColumnOrigin::Left(index));
        }
    }

    for (index, column) in right.columns().iter().enumerate() {
        let name = column.name();
        if is_key(name) {
            continue;
        }
        if left.column(name).is_some() {
            names.push(format!("{name}{}", suffixes.right));
        } else {
            names.push(name.to_string());
        }
        origins.push(ColumnOrigin::Right(index));
    }

    (names, origins)
}

fn pick_cell(
    left: &Table,
    right: &Table,
    origin: &ColumnOrigin,
    left_row: Option<usize>,
    right_row: Option<usize>,
) -> CellValue {
    let left_cell = |index: usize| left_row.map(|row| left.columns()[index].cells()[row].clone());
    let right_cell = |index: usize| right_row.map(|row| right.columns()[index].cells()[row].clone());

    let value = match *origin {
        ColumnOrigin::Key {
            left: left_index,
            right: right_index,
        } => left_cell(left_index).or_else(|| right_cell(right_index)),
        ColumnOrigin::Left(index) => left_cell(index),
        ColumnOrigin::Right(index) => right_cell(index),
    };
    value.unwrap_or(CellValue::Null)
}
