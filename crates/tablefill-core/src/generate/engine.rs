use std::collections::HashMap;

use indexmap::IndexMap;
use rand::Rng;

use crate::generate::plan::{ColumnPlan, TablePlan};
use crate::generate::providers::{generate_value, sample_value};
use crate::generate::value::Value;

/// One generated row, keyed by column name in catalog order.
///
/// An `IndexMap` (not `HashMap`) so that encoders can rely on column order
/// matching the plan.
pub type GeneratedRow = IndexMap<String, Value>;

/// Generate one row from a plan.
///
/// Columns with a sample pool draw from it; all others are synthesized from
/// their type family. Linked pools (the columns of one composite foreign key)
/// share a single draw, so the row carries a tuple that exists in the
/// referenced table.
pub fn generate_row(plan: &TablePlan, rng: &mut impl Rng) -> GeneratedRow {
    let mut row = IndexMap::with_capacity(plan.columns.len());
    let mut picks: HashMap<&str, usize> = HashMap::new();
    for column in &plan.columns {
        let value = match &column.sample_pool {
            Some(pool) => {
                let index = match pool.link() {
                    Some(link) => *picks.entry(link).or_insert_with(|| pool.pick(rng)),
                    None => pool.pick(rng),
                };
                match pool.get(index) {
                    Some(raw) => sample_value(raw, &column.family),
                    None => native_value(column, rng),
                }
            }
            None => native_value(column, rng),
        };
        row.insert(column.column_name.clone(), value);
    }
    row
}

fn native_value(column: &ColumnPlan, rng: &mut impl Rng) -> Value {
    generate_value(&column.family, rng)
}
