mod excel_schema;

pub use excel_schema::{
    expected_headers, Column, ColumnMap, COLUMN_COUNT, NON_RETURN_MARKERS, RETURN_MARKER,
    SCHEMA_LEN,
};
