use serde::{Deserialize, Serialize};

use crate::schema::{Schema, Table};

/// Summary of the reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    /// Distinct-table edges between declared tables.
    pub edges: usize,
}

/// Direct dependencies of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDependencies {
    pub table: String,
    pub depends_on: Vec<String>,
}

/// Report for dependency ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub summary: GraphSummary,
    pub order: Vec<String>,
    pub dependencies: Vec<TableDependencies>,
    pub cycles: Vec<Vec<String>>,
}

/// Build a deterministic dependency report for a schema.
pub fn build_dependency_report(schema: &Schema) -> DependencyReport {
    let dependencies: Vec<TableDependencies> = schema
        .ordered_tables()
        .into_iter()
        .map(|table| TableDependencies {
            table: table.name.clone(),
            depends_on: schema.depends_on(&table.name),
        })
        .collect();
    let edges = dependencies.iter().map(|deps| deps.depends_on.len()).sum();

    DependencyReport {
        summary: GraphSummary {
            nodes: schema.tables().len(),
            edges,
        },
        order: schema.insert_order().to_vec(),
        dependencies,
        cycles: schema.cycles().to_vec(),
    }
}

/// Table positions in insert order, plus every multi-table cycle found.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Ordering {
    pub order: Vec<usize>,
    pub cycles: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Depth-first ordering over `tables` in declaration order.
///
/// Dependencies are visited in first-seen order before the table itself is
/// appended, so every resolvable reference precedes its dependent. A
/// dependency already on the DFS stack closes a cycle; it is recorded and
/// not re-entered, so ordering always completes. `resolve` maps a target
/// name to its position; unresolved targets are skipped.
pub(crate) fn order_tables(
    tables: &[Table],
    resolve: impl Fn(&str) -> Option<usize>,
) -> Ordering {
    let edges: Vec<Vec<usize>> = tables
        .iter()
        .enumerate()
        .map(|(idx, table)| {
            table
                .depends_on()
                .iter()
                .filter_map(|target| resolve(target.as_str()))
                .filter(|&target| target != idx)
                .collect()
        })
        .collect();

    let mut walk = Walk {
        edges: &edges,
        marks: vec![Mark::Unvisited; tables.len()],
        stack: Vec::new(),
        ordering: Ordering::default(),
    };
    for idx in 0..tables.len() {
        walk.visit(idx);
    }
    walk.ordering
}

struct Walk<'a> {
    edges: &'a [Vec<usize>],
    marks: Vec<Mark>,
    stack: Vec<usize>,
    ordering: Ordering,
}

impl Walk<'_> {
    fn visit(&mut self, idx: usize) {
        match self.marks[idx] {
            Mark::Done => return,
            Mark::Active => {
                if let Some(start) = self.stack.iter().position(|&node| node == idx) {
                    let cycle = self.stack[start..].to_vec();
                    self.record_cycle(cycle);
                }
                return;
            }
            Mark::Unvisited => {}
        }

        self.marks[idx] = Mark::Active;
        self.stack.push(idx);
        let edges = self.edges;
        for &target in &edges[idx] {
            self.visit(target);
        }
        self.stack.pop();
        self.marks[idx] = Mark::Done;
        self.ordering.order.push(idx);
    }

    /// Cycles are rotated to start at their earliest-declared table and
    /// recorded once.
    fn record_cycle(&mut self, mut cycle: Vec<usize>) {
        let first = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, table)| **table)
            .map(|(pos, _)| pos)
            .unwrap_or(0);
        cycle.rotate_left(first);
        if !self.ordering.cycles.contains(&cycle) {
            self.ordering.cycles.push(cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|item| item == name)
            .expect("table in order")
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let schema = Schema::parse(
            "CREATE TABLE orders (id SERIAL PRIMARY KEY, user_id INT REFERENCES users(id), product_id INT REFERENCES products(id));
             CREATE TABLE users (id SERIAL PRIMARY KEY);
             CREATE TABLE products (id SERIAL PRIMARY KEY, vendor_id INT REFERENCES users(id));",
        );
        let report = schema.dependency_report();
        assert_eq!(report.order, vec!["users", "products", "orders"]);
        assert_eq!(report.summary, GraphSummary { nodes: 3, edges: 3 });
        assert!(report.cycles.is_empty());
        assert!(schema.ensure_acyclic().is_ok());
    }

    #[test]
    fn self_reference_does_not_move_the_table() {
        let schema = Schema::parse(
            "CREATE TABLE employees (id INT PRIMARY KEY, manager_id INT REFERENCES employees(id));
             CREATE TABLE badges (id INT PRIMARY KEY);",
        );
        assert_eq!(schema.insert_order(), ["employees", "badges"]);
        assert!(schema.cycles().is_empty());
        assert_eq!(schema.dependency_report().summary.edges, 0);
    }

    #[test]
    fn cycles_are_reported_and_ordering_completes() {
        let text = "CREATE TABLE standalone (id INT PRIMARY KEY);
             CREATE TABLE a (id INT PRIMARY KEY, b_id INT REFERENCES b(id));
             CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));";
        let schema = Schema::parse(text);

        assert_eq!(schema.insert_order(), ["standalone", "b", "a"]);
        assert_eq!(schema.cycles(), [vec!["a".to_string(), "b".to_string()]]);
        assert!(schema.ensure_acyclic().is_err());

        let again = Schema::parse(text);
        assert_eq!(again.insert_order(), schema.insert_order());
        assert_eq!(position(again.insert_order(), "standalone"), 0);
    }

    #[test]
    fn cycle_is_recorded_once_from_any_entry_point() {
        let schema = Schema::parse(
            "CREATE TABLE x (id INT, z_id INT REFERENCES z(id));
             CREATE TABLE y (id INT, x_id INT REFERENCES x(id));
             CREATE TABLE z (id INT, y_id INT REFERENCES y(id));
             CREATE TABLE w (id INT, y_id INT REFERENCES y(id));",
        );
        assert_eq!(schema.cycles().len(), 1);
        assert_eq!(schema.cycles()[0][0], "x");
        assert_eq!(schema.insert_order().len(), 4);
        assert!(position(schema.insert_order(), "y") < position(schema.insert_order(), "w"));
    }

    #[test]
    fn dangling_targets_are_not_edges() {
        let schema = Schema::parse("CREATE TABLE t (id INT, ghost_id INT REFERENCES ghosts(id));");
        let report = schema.dependency_report();
        assert_eq!(report.order, vec!["t"]);
        assert_eq!(report.summary.edges, 0);
        assert!(report.dependencies[0].depends_on.is_empty());
    }
}
