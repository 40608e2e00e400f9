use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Date64Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use memmap2::Mmap;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use field_profiler_common::{FieldProfilerError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::record::{DeclaredKind, FieldSpec, RawValue, Record, RecordIter, RecordSource};

const BATCH_SIZE: usize = 8192;

/// A Parquet file exposed as a record source. Record ids are row indices.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    path: PathBuf,
    bytes: Bytes,
    fields: Vec<FieldSpec>,
    row_count: u64,
}

impl ParquetSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        // memory-map the file; the reader works over an owned copy
        let mmap: Mmap = unsafe { Mmap::map(&file)? };
        let bytes = Bytes::copy_from_slice(&mmap);
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())?;
        let fields = builder
            .schema()
            .fields()
            .iter()
            .map(|f| FieldSpec::new(f.name().clone(), declared_kind(f.data_type())))
            .collect::<Vec<_>>();
        let row_count = builder.metadata().file_metadata().num_rows().max(0) as u64;
        debug!(path = %path.display(), fields = fields.len(), rows = row_count, "opened parquet source");
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            fields,
            row_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Declared kind implied by the stored column type.
pub fn declared_kind(dt: &DataType) -> DeclaredKind {
    match dt {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => DeclaredKind::Numeric,
        DataType::Utf8 | DataType::LargeUtf8 => DeclaredKind::Text,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => DeclaredKind::Date,
        _ => DeclaredKind::Unknown,
    }
}

impl RecordSource for ParquetSource {
    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn record_count_hint(&self) -> Option<u64> {
        Some(self.row_count)
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(self.bytes.clone())?
            .with_batch_size(BATCH_SIZE)
            .build()?;
        Ok(Box::new(Rows {
            reader,
            batch: None,
            row: 0,
            next_id: 0,
        }))
    }
}

struct Rows {
    reader: ParquetRecordBatchReader,
    batch: Option<RecordBatch>,
    row: usize,
    next_id: u64,
}

impl Iterator for Rows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.batch {
                if self.row < batch.num_rows() {
                    let values = batch.columns().iter().map(|c| cell_value(c, self.row)).collect();
                    let record = Record::new(self.next_id, values);
                    self.row += 1;
                    self.next_id += 1;
                    return Some(Ok(record));
                }
            }
            match self.reader.next()? {
                Ok(batch) => {
                    self.batch = Some(batch);
                    self.row = 0;
                }
                Err(e) => return Some(Err(FieldProfilerError::Arrow(e))),
            }
        }
    }
}

macro_rules! cell {
    ($col:expr, $row:expr, $arr:ty, $wrap:expr) => {
        $col.as_any().downcast_ref::<$arr>().map(|a| $wrap(a.value($row)))
    };
}

fn cell_value(col: &ArrayRef, row: usize) -> RawValue {
    if col.is_null(row) {
        return RawValue::Null;
    }
    let native = match col.data_type() {
        DataType::Boolean => cell!(col, row, BooleanArray, RawValue::Bool),
        DataType::Int8 => cell!(col, row, Int8Array, |v: i8| RawValue::Int(v.into())),
        DataType::Int16 => cell!(col, row, Int16Array, |v: i16| RawValue::Int(v.into())),
        DataType::Int32 => cell!(col, row, Int32Array, |v: i32| RawValue::Int(v.into())),
        DataType::Int64 => cell!(col, row, Int64Array, RawValue::Int),
        DataType::UInt8 => cell!(col, row, UInt8Array, |v: u8| RawValue::Int(v.into())),
        DataType::UInt16 => cell!(col, row, UInt16Array, |v: u16| RawValue::Int(v.into())),
        DataType::UInt32 => cell!(col, row, UInt32Array, |v: u32| RawValue::Int(v.into())),
        DataType::UInt64 => cell!(col, row, UInt64Array, |v: u64| match i64::try_from(v) {
            Ok(i) => RawValue::Int(i),
            Err(_) => RawValue::Float(v as f64),
        }),
        DataType::Float32 => cell!(col, row, Float32Array, |v: f32| RawValue::Float(v.into())),
        DataType::Float64 => cell!(col, row, Float64Array, RawValue::Float),
        DataType::Utf8 => cell!(col, row, StringArray, |v: &str| RawValue::Text(v.to_owned())),
        DataType::LargeUtf8 => {
            cell!(col, row, LargeStringArray, |v: &str| RawValue::Text(v.to_owned()))
        }
        DataType::Date32 => col
            .as_any()
            .downcast_ref::<Date32Array>()
            .and_then(|a| a.value_as_date(row))
            .map(RawValue::Date),
        DataType::Date64 => col
            .as_any()
            .downcast_ref::<Date64Array>()
            .and_then(|a| a.value_as_datetime(row))
            .map(RawValue::DateTime),
        DataType::Timestamp(unit, _) => timestamp(col, row, unit).map(RawValue::DateTime),
        _ => None,
    };
    // decimals, nested and other types fall back to their display form
    native.unwrap_or_else(|| display_value(col, row))
}

fn timestamp(col: &ArrayRef, row: usize, unit: &TimeUnit) -> Option<chrono::NaiveDateTime> {
    let any = col.as_any();
    match unit {
        TimeUnit::Second => any.downcast_ref::<TimestampSecondArray>()?.value_as_datetime(row),
        TimeUnit::Millisecond => any.downcast_ref::<TimestampMillisecondArray>()?.value_as_datetime(row),
        TimeUnit::Microsecond => any.downcast_ref::<TimestampMicrosecondArray>()?.value_as_datetime(row),
        TimeUnit::Nanosecond => any.downcast_ref::<TimestampNanosecondArray>()?.value_as_datetime(row),
    }
}

fn display_value(col: &ArrayRef, row: usize) -> RawValue {
    match ArrayFormatter::try_new(col.as_ref(), &FormatOptions::default()) {
        Ok(f) => RawValue::Text(f.value(row).to_string()),
        Err(e) => {
            debug!(error = %e, "unformattable cell read as null");
            RawValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Decimal128Array;
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    fn write(batch: RecordBatch) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut w = ArrowWriter::try_new(tmp.reopen().unwrap(), batch.schema(), None).unwrap();
        w.write(&batch).unwrap();
        w.close().unwrap();
        tmp
    }

    #[test]
    fn reads_rows_with_hints() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("age", DataType::Int32, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("born", DataType::Date32, true),
            Field::new("ok", DataType::Boolean, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(10), None])),
                Arc::new(StringArray::from(vec![Some("Bob"), Some("")])),
                Arc::new(Date32Array::from(vec![Some(19723), None])),
                Arc::new(BooleanArray::from(vec![Some(true), Some(false)])),
            ],
        )
        .unwrap();
        let tmp = write(batch);
        let src = ParquetSource::open(tmp.path()).unwrap();
        let kinds: Vec<_> = src.fields().iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![DeclaredKind::Numeric, DeclaredKind::Text, DeclaredKind::Date, DeclaredKind::Unknown]
        );
        assert_eq!(src.record_count_hint(), Some(2));
        let rows: Vec<Record> = src.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values[0], RawValue::Int(10));
        assert_eq!(rows[0].values[1], RawValue::Text("Bob".into()));
        assert_eq!(
            rows[0].values[2],
            RawValue::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(rows[1].values[0], RawValue::Null);
        assert_eq!(rows[1].id.0, 1);
        // records() can be called again
        assert_eq!(src.records().unwrap().count(), 2);
    }

    #[test]
    fn decimals_read_as_display_text() {
        let schema = Arc::new(Schema::new(vec![Field::new("price", DataType::Decimal128(10, 2), true)]));
        let arr = Decimal128Array::from(vec![Some(1250_i128)])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let batch = RecordBatch::try_new(schema, vec![Arc::new(arr)]).unwrap();
        let tmp = write(batch);
        let src = ParquetSource::open(tmp.path()).unwrap();
        assert_eq!(src.fields()[0].kind, DeclaredKind::Numeric);
        let row = src.records().unwrap().next().unwrap().unwrap();
        assert_eq!(row.values[0], RawValue::Text("12.50".into()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ParquetSource::open(Path::new("/no/such/file.parquet")).unwrap_err();
        assert!(matches!(err, FieldProfilerError::Io(_)));
    }
}
