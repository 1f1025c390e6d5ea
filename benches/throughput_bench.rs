use chunktar::io_stream::{ChunkReader, ChunkWriter, DEFAULT_BLOCK_SIZE};
use chunktar::index;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;

fn encode(files: usize, data: &[u8], block: u16) -> Vec<u8> {
    let mut writer = ChunkWriter::new(Vec::with_capacity(files * (data.len() + 64)));
    for i in 0..files {
        writer.write_entry(&format!("file_{i}.bin"), data, block).unwrap();
    }
    writer.finish().unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];

    c.bench_function("encode_1mb_default_block", |b| {
        b.iter(|| encode(1, black_box(&data), DEFAULT_BLOCK_SIZE))
    });
    c.bench_function("encode_1mb_512b_block", |b| {
        b.iter(|| encode(1, black_box(&data), 512))
    });
}

fn bench_decode(c: &mut Criterion) {
    let container = encode(10, &vec![0xFFu8; 100 * 1024], DEFAULT_BLOCK_SIZE);

    c.bench_function("decode_10x100kb", |b| {
        b.iter(|| {
            let mut reader = ChunkReader::new(Cursor::new(black_box(&container)));
            let mut total = 0usize;
            while let Some(chunk) = reader.next_chunk().unwrap() {
                total += chunk.body().len();
            }
            total
        })
    });
    c.bench_function("index_scan_10x100kb", |b| {
        b.iter(|| index::scan(Cursor::new(black_box(&container))).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
