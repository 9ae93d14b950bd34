use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use common::Result;
use std::sync::Arc;

/// Appends a unique Int64 id column to every batch. Ids are batch-local
/// row counters offset by the batch index, so they increase monotonically
/// across the whole row set without being contiguous. Unique within one
/// write, not stable across runs.
pub fn attach_row_ids(batches: &[RecordBatch], column: &str) -> Result<Vec<RecordBatch>> {
    let mut out = Vec::with_capacity(batches.len());

    for (batch_index, batch) in batches.iter().enumerate() {
        let ids: Int64Array = (0..batch.num_rows() as i64)
            .map(|row| ((batch_index as i64) << 33) + row)
            .collect::<Vec<i64>>()
            .into();

        let mut fields: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.push(Field::new(column, DataType::Int64, false));

        let mut columns = batch.columns().to_vec();
        columns.push(Arc::new(ids));

        out.push(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?);
    }

    Ok(out)
}
