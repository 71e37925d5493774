use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::Executor;

/// Emits a fixed list of rows. The usual child of insert plans and the
/// workhorse of executor tests.
pub struct ValuesExecutor {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            rows,
            cursor: 0,
        }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let tuple = Tuple::new(self.rows[self.cursor].clone(), &self.schema);
        self.cursor += 1;
        Ok(Some((tuple, Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
