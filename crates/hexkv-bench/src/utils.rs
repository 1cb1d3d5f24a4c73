//! Benchmark utilities and helpers.

use hexkv_common::types::RowId;
use hexkv_engine::{ColumnSchema, ColumnType, IndexSchema, IndexValue, Row, TableSchema};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates random string data for benchmarks.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Schema used by the handler benchmarks: `id`, `name`, `age`, with an index
/// on `age`.
pub fn user_schema() -> TableSchema {
    TableSchema::new()
        .with_column("id", ColumnSchema::new(ColumnType::Long).not_null())
        .with_column("name", ColumnSchema::new(ColumnType::String))
        .with_column("age", ColumnSchema::new(ColumnType::Long))
        .with_index("by_age", IndexSchema::new(["age"]))
}

/// Generates serialized user rows without identities.
pub fn generate_user_rows(count: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count as i64)
        .filter_map(|i| {
            let name = random_string(&mut rng, 12);
            let age: i64 = rng.gen_range(18..80);
            Row::new(RowId::NIL)
                .with_record("id", (i + 1).to_be_bytes().to_vec())
                .with_record("name", name.into_bytes())
                .with_record("age", age.to_be_bytes().to_vec())
                .serialize()
                .ok()
        })
        .collect()
}

/// Generates random index value tuples mixing every value kind.
pub fn generate_index_values(count: usize) -> Vec<Vec<IndexValue>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let text_len = rng.gen_range(0..24);
            let mut text: Vec<u8> = (0..text_len).map(|_| rng.gen()).collect();
            // Keep some embedded zeros in play for the escaping path.
            if !text.is_empty() && rng.gen_bool(0.3) {
                text[0] = 0x00;
            }
            vec![
                if rng.gen_bool(0.1) {
                    IndexValue::Null
                } else {
                    IndexValue::Long(rng.gen())
                },
                IndexValue::Double(rng.gen_range(-1e6..1e6)),
                IndexValue::Bytes(text),
            ]
        })
        .collect()
}

/// Generates random row identities.
pub fn generate_row_ids(count: usize) -> Vec<RowId> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count).map(|_| RowId::from_bytes(rng.gen())).collect()
}
