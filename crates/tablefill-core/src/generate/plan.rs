use serde::Serialize;

use crate::resolve::DependencyMap;
use crate::sample::{SamplePool, SampleSet};
use crate::schema::types::{ColumnDescriptor, TableRef, TypeFamily};

/// Generation plan for a whole table, built once per fill.
///
/// Holds exactly one `ColumnPlan` per column, in catalog order. Nothing in it
/// changes after `build`; generation only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table: TableRef,
    pub columns: Vec<ColumnPlan>,
}

/// Generation plan for a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub column_name: String,
    pub declared_type: String,
    pub family: TypeFamily,
    pub source: ColumnSource,
    /// Values to draw from instead of synthesizing. Takes priority over the
    /// type family whenever present.
    pub sample_pool: Option<SamplePool>,
}

/// Where a column's values come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnSource {
    /// References a column of another (non-empty) table.
    ForeignKey {
        referenced_table: TableRef,
        referenced_column: String,
    },
    /// Generated from the column's own declared type.
    Native,
}

impl TablePlan {
    /// Combine catalog columns, resolved dependencies and collected samples.
    ///
    /// Pure: the same inputs always yield the same plan. A column present in
    /// `dependencies` is planned as a foreign key regardless of its type.
    pub fn build(
        table: &TableRef,
        columns: &[ColumnDescriptor],
        dependencies: &DependencyMap,
        samples: &SampleSet,
    ) -> Self {
        let columns = columns
            .iter()
            .map(|column| {
                let source = match dependencies.get(&column.name) {
                    Some(dep) => ColumnSource::ForeignKey {
                        referenced_table: dep.referenced_table.clone(),
                        referenced_column: dep.referenced_column.clone(),
                    },
                    None => ColumnSource::Native,
                };
                ColumnPlan {
                    column_name: column.name.clone(),
                    declared_type: column.declared_type.clone(),
                    family: column.family(),
                    source,
                    sample_pool: samples.get(&column.name).cloned(),
                }
            })
            .collect();

        Self {
            table: table.clone(),
            columns,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns whose values would be the unsupported marker.
    pub fn unsupported_columns(&self) -> Vec<&ColumnPlan> {
        self.columns.iter().filter(|c| c.is_unsupported()).collect()
    }

    /// Names of the columns that are actually written by a load, in order.
    pub fn load_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_unsupported())
            .map(|c| c.column_name.clone())
            .collect()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_foreign_key()).count()
    }

    pub fn sampled_count(&self) -> usize {
        self.columns.iter().filter(|c| c.sample_pool.is_some()).count()
    }
}

impl ColumnPlan {
    pub fn is_foreign_key(&self) -> bool {
        matches!(self.source, ColumnSource::ForeignKey { .. })
    }

    /// No sample pool and no generation policy for the type.
    pub fn is_unsupported(&self) -> bool {
        self.sample_pool.is_none() && !self.family.is_supported()
    }

    /// Short description for logs and the inspect command.
    pub fn strategy(&self) -> String {
        match (&self.source, &self.sample_pool) {
            (ColumnSource::ForeignKey { referenced_table, referenced_column }, Some(pool)) => {
                format!(
                    "fk {}.{} ({} sampled)",
                    referenced_table,
                    referenced_column,
                    pool.len()
                )
            }
            (ColumnSource::ForeignKey { referenced_table, referenced_column }, None) => {
                format!("fk {}.{} (random {})", referenced_table, referenced_column, self.family)
            }
            (ColumnSource::Native, Some(pool)) => format!("sampled ({})", pool.len()),
            (ColumnSource::Native, None) => format!("random {}", self.family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Dependency;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "integer"),
            ColumnDescriptor::new("user_id", "integer"),
            ColumnDescriptor::new("status", "text"),
            ColumnDescriptor::new("span", "interval"),
        ]
    }

    fn dependencies() -> DependencyMap {
        let mut deps = DependencyMap::new();
        deps.insert(
            "user_id".to_string(),
            Dependency {
                constraint: "orders_user_id_fkey".to_string(),
                referenced_table: TableRef::new("public", "users"),
                referenced_column: "id".to_string(),
            },
        );
        deps
    }

    #[test]
    fn test_one_plan_per_column_in_order() {
        let table = TableRef::new("public", "orders");
        let plan = TablePlan::build(&table, &columns(), &dependencies(), &SampleSet::new());

        assert_eq!(plan.column_count(), 4);
        let names: Vec<_> = plan.columns.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, ["id", "user_id", "status", "span"]);
    }

    #[test]
    fn test_foreign_key_takes_priority_over_type() {
        let table = TableRef::new("public", "orders");
        let plan = TablePlan::build(&table, &columns(), &dependencies(), &SampleSet::new());

        let user_id = &plan.columns[1];
        assert!(user_id.is_foreign_key());
        assert_eq!(user_id.family, TypeFamily::Integer);
        assert_eq!(plan.foreign_key_count(), 1);
    }

    #[test]
    fn test_samples_attach_to_columns() {
        let table = TableRef::new("public", "orders");
        let mut samples = SampleSet::new();
        samples.insert(
            "user_id".to_string(),
            SamplePool::new(vec!["1".to_string(), "2".to_string()]).unwrap(),
        );
        samples.insert(
            "status".to_string(),
            SamplePool::new(vec!["paid".to_string()]).unwrap(),
        );
        let plan = TablePlan::build(&table, &columns(), &dependencies(), &samples);

        assert_eq!(plan.sampled_count(), 2);
        assert!(plan.columns[0].sample_pool.is_none());
        assert_eq!(plan.columns[2].strategy(), "sampled (1)");
    }

    #[test]
    fn test_unsupported_columns_are_left_out_of_loads() {
        let table = TableRef::new("public", "orders");
        let plan = TablePlan::build(&table, &columns(), &dependencies(), &SampleSet::new());

        let unsupported = plan.unsupported_columns();
        assert_eq!(unsupported.len(), 1);
        assert_eq!(unsupported[0].column_name, "span");
        assert_eq!(plan.load_columns(), ["id", "user_id", "status"]);
    }

    #[test]
    fn test_sampled_unsupported_type_is_loadable() {
        let table = TableRef::new("public", "orders");
        let mut samples = SampleSet::new();
        samples.insert(
            "span".to_string(),
            SamplePool::new(vec!["1 day".to_string()]).unwrap(),
        );
        let plan = TablePlan::build(&table, &columns(), &dependencies(), &samples);
        assert!(plan.unsupported_columns().is_empty());
        assert_eq!(plan.load_columns().len(), 4);
    }

    #[test]
    fn test_build_is_deterministic() {
        let table = TableRef::new("public", "orders");
        let mut samples = SampleSet::new();
        samples.insert(
            "status".to_string(),
            SamplePool::new(vec!["paid".to_string(), "open".to_string()]).unwrap(),
        );
        let a = TablePlan::build(&table, &columns(), &dependencies(), &samples);
        let b = TablePlan::build(&table, &columns(), &dependencies(), &samples);
        assert_eq!(a, b);
    }
}
