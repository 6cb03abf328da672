use criterion::{criterion_group, criterion_main, Criterion};
use arrayscan::{
    AttributeInfo, ColumnHandle, Datatype, DimensionInfo, MemoryArray, NativeValue, RecordCursor,
    RelationalType, ScanConfig, TupleDomain,
};
use arrayscan_mem::FixedMemory;

fn make_array(rows: usize, tile: usize) -> MemoryArray {
    let mut builder = MemoryArray::builder()
        .dimension(DimensionInfo::new("row", Datatype::Int64))
        .attribute(AttributeInfo::new("value", Datatype::Float64))
        .attribute(AttributeInfo::new("label", Datatype::StringUtf8).var_len().nullable())
        .tile_extent(tile);
    for i in 0..rows {
        let label = (i % 7 != 0).then(|| NativeValue::Bytes(format!("label-{}", i % 100).into_bytes()));
        builder = builder.cell(
            vec![NativeValue::Int64(i as i64)],
            vec![Some(NativeValue::Float64((i % 10) as f64)), label],
        );
    }
    builder.build().unwrap()
}

fn columns() -> Vec<ColumnHandle> {
    vec![
        ColumnHandle::dimension("row", RelationalType::BigInt),
        ColumnHandle::attribute("value", RelationalType::Double),
        ColumnHandle::attribute("label", RelationalType::Varchar),
    ]
}

fn scan(array: &MemoryArray, config: &ScanConfig) -> usize {
    let mut cursor = RecordCursor::new(array.open_query(), &columns(), &TupleDomain::all(), config)
        .unwrap()
        .with_memory_probe(Box::new(FixedMemory(1 << 40)));
    let mut bytes = 0;
    while cursor.advance_next_position().unwrap() {
        let _ = cursor.get_long(0).unwrap();
        let _ = cursor.get_double(1).unwrap();
        if !cursor.is_null(2).unwrap() {
            bytes += cursor.get_slice(2).unwrap().len();
        }
    }
    bytes
}

fn bench_full_scan(c: &mut Criterion) {
    let array = make_array(16 * 1024, 256);
    let config = ScanConfig::default();
    c.bench_function("full_scan", |b| b.iter(|| scan(&array, &config)));
}

fn bench_scan_with_growth(c: &mut Criterion) {
    let array = make_array(16 * 1024, 256);
    let config = ScanConfig {
        read_buffer_size: 512,
        ..ScanConfig::default()
    };
    c.bench_function("scan_with_growth", |b| b.iter(|| scan(&array, &config)));
}

criterion_group!(benches, bench_full_scan, bench_scan_with_growth);
criterion_main!(benches);
