//! Tabular driver: turns path evaluation into a row stream.
//!
//! A plan is a tree of path scans composed by nesting (outer-join
//! semantics: a nested plan with no matching rows still contributes one row
//! with NULL columns) and sibling joins (union semantics: the left row
//! stream is exhausted before the right one starts). Plan state lives in an
//! arena indexed by node id; a column table maps every output column to the
//! plan node that owns it.

use tracing::trace;

use crate::ast::JsonPath;
use crate::engine::evaluator::execute_path_root;
use crate::engine::runtime::{Error, ErrorCode, EvalOptions};
use crate::jsonb::{Jsonb, JsonbValue};

/// Output column definition.
#[derive(Debug, Clone)]
pub enum TableColumn {
    /// 1-based row counter of the owning scan.
    Ordinal,
    /// Path evaluated against the owning scan's current row; the first
    /// resulting item becomes the column value, an empty result is NULL.
    Path(JsonPath),
}

/// Plan tree handed to [`JsonTable::new`].
#[derive(Debug, Clone)]
pub enum TablePlan {
    PathScan {
        /// Path producing this scan's row pattern.
        path: JsonPath,
        /// Column numbers owned by this scan.
        columns: std::ops::Range<usize>,
        /// Raise row-pattern errors instead of yielding an empty pattern.
        error_on_error: bool,
        /// Nested plan re-evaluated against every row of this scan.
        child: Option<Box<TablePlan>>,
    },
    SiblingJoin {
        left: Box<TablePlan>,
        right: Box<TablePlan>,
    },
}

#[derive(Debug)]
struct ScanState {
    path: JsonPath,
    error_on_error: bool,
    found: Vec<JsonbValue>,
    next_index: usize,
    current: Option<JsonbValue>,
    ordinal: i64,
    nested: Option<usize>,
    parent: Option<usize>,
}

#[derive(Debug)]
enum PlanState {
    Scan(ScanState),
    Join { left: usize, right: usize },
}

/// Executable table scan over one input document at a time.
pub struct JsonTable {
    nodes: Vec<PlanState>,
    root: usize,
    columns: Vec<TableColumn>,
    col_states: Vec<usize>,
    args: Vec<(String, JsonbValue)>,
    opts: EvalOptions,
}

impl JsonTable {
    pub fn new(
        plan: TablePlan,
        columns: Vec<TableColumn>,
        args: Vec<(String, JsonbValue)>,
        opts: EvalOptions,
    ) -> Result<JsonTable, Error> {
        let mut nodes = Vec::new();
        let mut col_states = vec![usize::MAX; columns.len()];
        let root = init_plan(plan, None, &mut nodes, &mut col_states)?;
        if !matches!(nodes[root], PlanState::Scan(_)) {
            return Err(Error::internal("the root table plan must be a path scan"));
        }
        if let Some(missing) = col_states.iter().position(|s| *s == usize::MAX) {
            return Err(Error::internal(format!(
                "table column {missing} is not owned by any path scan"
            )));
        }
        Ok(JsonTable {
            nodes,
            root,
            columns,
            col_states,
            args,
            opts,
        })
    }

    /// Install the input document and evaluate the root row pattern.
    pub fn set_document(&mut self, doc: &Jsonb) -> Result<(), Error> {
        let value = doc.root_value();
        self.set_document_value(&value)
    }

    /// Variant of [`Self::set_document`] taking an already-extracted value.
    pub fn set_document_value(&mut self, value: &JsonbValue) -> Result<(), Error> {
        self.reset_row_pattern(self.root, value)
    }

    /// Advance to the next output row. Returns `false` when the plan is
    /// exhausted.
    pub fn fetch_row(&mut self) -> Result<bool, Error> {
        let more = self.plan_next_row(self.root)?;
        trace!(more, "table row fetch");
        Ok(more)
    }

    /// Value of column `colnum` for the current row; `None` is SQL NULL.
    pub fn get_value(&self, colnum: usize) -> Result<Option<JsonbValue>, Error> {
        let state_idx = *self
            .col_states
            .get(colnum)
            .ok_or_else(|| Error::internal(format!("no such table column {colnum}")))?;
        let scan = match &self.nodes[state_idx] {
            PlanState::Scan(s) => s,
            PlanState::Join { .. } => {
                return Err(Error::internal("table column owned by a join node"));
            }
        };
        let row = match &scan.current {
            Some(row) => row,
            None => return Ok(None),
        };
        match &self.columns[colnum] {
            TableColumn::Ordinal => Ok(Some(JsonbValue::Numeric(scan.ordinal.into()))),
            TableColumn::Path(path) => {
                let opts = self.opts.clone().with_silent(true);
                let (_, found) = execute_path_root(row, path, &self.args, &opts, true)?;
                Ok(found.head().cloned())
            }
        }
    }

    // -- row fetch protocol ----------------------------------------------

    fn plan_next_row(&mut self, idx: usize) -> Result<bool, Error> {
        match &self.nodes[idx] {
            PlanState::Scan(_) => self.scan_next_row(idx),
            PlanState::Join { left, right } => {
                let (left, right) = (*left, *right);
                // Union: drain the left sibling, then the right one.
                if self.plan_next_row(left)? {
                    Ok(true)
                } else {
                    self.plan_next_row(right)
                }
            }
        }
    }

    fn scan_next_row(&mut self, idx: usize) -> Result<bool, Error> {
        let (has_current, nested) = {
            let scan = self.scan(idx);
            (scan.current.is_some(), scan.nested)
        };

        // An active row joins against any remaining nested rows first.
        if has_current {
            if let Some(nested) = nested {
                if self.plan_next_row(nested)? {
                    return Ok(true);
                }
            }
        }

        {
            let scan = self.scan_mut(idx);
            if scan.next_index >= scan.found.len() {
                scan.current = None;
                return Ok(false);
            }
            let value = scan.found[scan.next_index].clone();
            scan.next_index += 1;
            scan.current = Some(value);
            scan.ordinal += 1;
        }

        if let Some(nested) = nested {
            // Re-evaluate the nested row pattern against the new parent row
            // and prime its first row. An empty nested pattern is still a
            // valid joined row: its columns read as NULL.
            self.reset_nested(nested)?;
            let _ = self.plan_next_row(nested)?;
        }

        Ok(true)
    }

    fn reset_nested(&mut self, idx: usize) -> Result<(), Error> {
        match &self.nodes[idx] {
            PlanState::Scan(scan) => {
                let parent = scan.parent.ok_or_else(|| {
                    Error::internal("nested path scan without a parent plan")
                })?;
                let parent_row = match &self.nodes[parent] {
                    PlanState::Scan(p) => p.current.clone(),
                    PlanState::Join { .. } => {
                        return Err(Error::internal("parent of a nested plan must be a scan"));
                    }
                };
                if let Some(row) = parent_row {
                    self.reset_row_pattern(idx, &row)?;
                }
                Ok(())
            }
            PlanState::Join { left, right } => {
                let (left, right) = (*left, *right);
                self.reset_nested(left)?;
                self.reset_nested(right)
            }
        }
    }

    fn reset_row_pattern(&mut self, idx: usize, item: &JsonbValue) -> Result<(), Error> {
        let (path, error_on_error) = {
            let scan = self.scan(idx);
            (scan.path.clone(), scan.error_on_error)
        };
        let opts = self.opts.clone().with_silent(!error_on_error);
        let (status, list) = execute_path_root(item, &path, &self.args, &opts, true)?;
        let scan = self.scan_mut(idx);
        scan.found = if status.is_error() {
            Vec::new()
        } else {
            list.into_vec()
        };
        scan.next_index = 0;
        scan.current = None;
        scan.ordinal = 0;
        Ok(())
    }

    fn scan(&self, idx: usize) -> &ScanState {
        match &self.nodes[idx] {
            PlanState::Scan(s) => s,
            PlanState::Join { .. } => unreachable!("scan state expected"),
        }
    }

    fn scan_mut(&mut self, idx: usize) -> &mut ScanState {
        match &mut self.nodes[idx] {
            PlanState::Scan(s) => s,
            PlanState::Join { .. } => unreachable!("scan state expected"),
        }
    }
}

fn init_plan(
    plan: TablePlan,
    parent: Option<usize>,
    nodes: &mut Vec<PlanState>,
    col_states: &mut [usize],
) -> Result<usize, Error> {
    match plan {
        TablePlan::PathScan {
            path,
            columns,
            error_on_error,
            child,
        } => {
            let idx = nodes.len();
            nodes.push(PlanState::Scan(ScanState {
                path,
                error_on_error,
                found: Vec::new(),
                next_index: 0,
                current: None,
                ordinal: 0,
                nested: None,
                parent,
            }));
            for col in columns {
                let slot = col_states.get_mut(col).ok_or_else(|| {
                    Error::new(
                        ErrorCode::Internal,
                        format!("path scan owns column {col} beyond the column list"),
                    )
                })?;
                *slot = idx;
            }
            if let Some(child) = child {
                let nested = init_plan(*child, Some(idx), nodes, col_states)?;
                match &mut nodes[idx] {
                    PlanState::Scan(s) => s.nested = Some(nested),
                    PlanState::Join { .. } => unreachable!("scan state expected"),
                }
            }
            Ok(idx)
        }
        TablePlan::SiblingJoin { left, right } => {
            let idx = nodes.len();
            nodes.push(PlanState::Join { left: 0, right: 0 });
            let l = init_plan(*left, parent, nodes, col_states)?;
            let r = init_plan(*right, parent, nodes, col_states)?;
            nodes[idx] = PlanState::Join { left: l, right: r };
            Ok(idx)
        }
    }
}
